//! Known bridge / mixer address lists.
//!
//! Sources are synchronous loaders; the classifier caches what they
//! return. The built-in lists cover the canonical Ethereum bridges and
//! the Tornado Cash ETH pools; a JSON file can replace them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::GraphConfig;

/// Bridge and mixer address sets. Members are stored lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownAddressSets {
    bridges: HashSet<String>,
    mixers: HashSet<String>,
}

impl KnownAddressSets {
    pub fn new<B, M, S>(bridges: B, mixers: M) -> Self
    where
        B: IntoIterator<Item = S>,
        M: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            bridges: normalise(bridges),
            mixers: normalise(mixers),
        }
    }

    /// Case-insensitive bridge membership.
    pub fn is_bridge(&self, address: &str) -> bool {
        !address.is_empty() && self.bridges.contains(&address.to_lowercase())
    }

    /// Case-insensitive mixer membership.
    pub fn is_mixer(&self, address: &str) -> bool {
        !address.is_empty() && self.mixers.contains(&address.to_lowercase())
    }

    pub fn bridge_count(&self) -> usize {
        self.bridges.len()
    }

    pub fn mixer_count(&self) -> usize {
        self.mixers.len()
    }
}

fn normalise<I, S>(items: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Loader for bridge / mixer sets. Must be side-effect free so that
/// concurrent first loads converge on the same value.
pub trait KnownAddressSource: Send + Sync {
    fn load(&self) -> Result<KnownAddressSets>;

    /// Short name for logging.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// Built-in lists
// ---------------------------------------------------------------------------

const BUILTIN_BRIDGES: &[&str] = &[
    // Wormhole token bridge
    "0x3ee18b2214aff97000d974cf647e7c347e8fa585",
    // Polygon PoS ERC20 predicate
    "0x40ec5b33f54e0e8a33a975908c5ba1c14e5bbbdf",
    // Polygon PoS ether predicate
    "0x8484ef722627bf18ca5ae6bcf031c23e6e922b30",
    // Arbitrum One bridge
    "0x8315177ab297ba92a06054ce80a67ed4dbd7ed3a",
    // Arbitrum delayed inbox
    "0x4dbd4fc535ac27206064b68ffcf827b0a60bab3f",
    // Optimism L1 standard bridge
    "0x99c9fc46f92e8a1c0dec1b1747d010903e884be1",
];

const BUILTIN_MIXERS: &[&str] = &[
    // Tornado Cash 0.1 / 1 / 10 / 100 ETH pools
    "0x12d66f87a04a9e220743712ce6d9bb1b5616b8fc",
    "0x47ce0c6ed5b0ce3d3a51fdb1c52dc66a7c3c2936",
    "0x910cbd523d972eb0a6f4cae4618ad62622b39dbf",
    "0xa160cdab225685da1d56aa342ad8841c3b53f291",
    // Tornado Cash router
    "0xd90e2f925da726b50c4ed8d0fb90ad053324f31b",
];

/// In-process lists, optionally extended by the caller.
#[derive(Debug, Clone, Default)]
pub struct StaticAddressSource {
    extra_bridges: Vec<String>,
    extra_mixers: Vec<String>,
    builtin: bool,
}

impl StaticAddressSource {
    /// The built-in lists.
    pub fn builtin() -> Self {
        Self {
            builtin: true,
            ..Default::default()
        }
    }

    /// Only the given addresses, no built-ins.
    pub fn from_lists(bridges: &[&str], mixers: &[&str]) -> Self {
        Self {
            extra_bridges: bridges.iter().map(|s| s.to_string()).collect(),
            extra_mixers: mixers.iter().map(|s| s.to_string()).collect(),
            builtin: false,
        }
    }
}

impl KnownAddressSource for StaticAddressSource {
    fn load(&self) -> Result<KnownAddressSets> {
        let builtin_bridges: &[&str] = if self.builtin { BUILTIN_BRIDGES } else { &[] };
        let builtin_mixers: &[&str] = if self.builtin { BUILTIN_MIXERS } else { &[] };

        let bridges = builtin_bridges
            .iter()
            .map(|s| s.to_string())
            .chain(self.extra_bridges.iter().cloned());
        let mixers = builtin_mixers
            .iter()
            .map(|s| s.to_string())
            .chain(self.extra_mixers.iter().cloned());

        Ok(KnownAddressSets::new(bridges.collect::<Vec<_>>(), mixers.collect::<Vec<_>>()))
    }

    fn describe(&self) -> String {
        if self.builtin {
            "builtin".to_string()
        } else {
            "static".to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// File-backed lists
// ---------------------------------------------------------------------------

/// On-disk format: `{ "bridges": [...], "mixers": [...] }`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct KnownAddressFile {
    #[serde(default)]
    pub bridges: Vec<String>,
    #[serde(default)]
    pub mixers: Vec<String>,
}

/// Reads bridge / mixer lists from a JSON file on every `load`.
#[derive(Debug, Clone)]
pub struct FileAddressSource {
    path: PathBuf,
}

impl FileAddressSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Write a list file (used by tooling and tests).
    pub fn save(&self, file: &KnownAddressFile) -> Result<()> {
        let json = serde_json::to_string_pretty(file)
            .context("Failed to serialise known-address lists")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        debug!(path = %self.path.display(), "Known-address lists saved");
        Ok(())
    }
}

impl KnownAddressSource for FileAddressSource {
    fn load(&self) -> Result<KnownAddressSets> {
        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let file: KnownAddressFile = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;

        info!(
            path = %self.path.display(),
            bridges = file.bridges.len(),
            mixers = file.mixers.len(),
            "Known-address lists loaded from disk"
        );

        Ok(KnownAddressSets::new(file.bridges, file.mixers))
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// The source named by `graph.known_addresses_path`, or the built-in
/// lists when no path is configured.
pub fn source_from_config(cfg: &GraphConfig) -> Arc<dyn KnownAddressSource> {
    match cfg.known_addresses_path.as_deref().map(str::trim) {
        Some(path) if !path.is_empty() => Arc::new(FileAddressSource::new(path)),
        _ => Arc::new(StaticAddressSource::builtin()),
    }
}
