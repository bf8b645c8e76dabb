//! Edge classification.
//!
//! Every edge gets exactly one type, by fixed priority:
//! bridge > mixer > dex > transfer. Matching is case-insensitive.

use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use super::known::{KnownAddressSets, KnownAddressSource};
use crate::types::EdgeType;

/// Substrings marking an address (or labelled endpoint) as a DEX.
const DEX_KEYWORDS: &[&str] = &[
    "uniswap",
    "sushiswap",
    "pancakeswap",
    "curve",
    "balancer",
    "1inch",
    "paraswap",
    "kyberswap",
    "router",
    "raydium",
    "jupiter",
    "orca",
    "sunswap",
];

/// Pure classification against a known-address snapshot.
pub fn classify_with(sets: &KnownAddressSets, from_address: &str, to_address: &str) -> EdgeType {
    let from = from_address.trim().to_lowercase();
    let to = to_address.trim().to_lowercase();

    if sets.is_bridge(&from) || sets.is_bridge(&to) {
        EdgeType::Bridge
    } else if sets.is_mixer(&from) || sets.is_mixer(&to) {
        EdgeType::Mixer
    } else if is_dex(&from) || is_dex(&to) {
        EdgeType::Dex
    } else {
        EdgeType::Transfer
    }
}

fn is_dex(lowered: &str) -> bool {
    !lowered.is_empty() && DEX_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

/// Lazily loaded, process-lifetime cache of the bridge / mixer sets.
///
/// The first `classify` loads from the source; later calls reuse the
/// snapshot until `refresh` or `invalidate`. A failed load is not
/// cached, so the next call retries.
pub struct KnownAddressCache {
    source: Arc<dyn KnownAddressSource>,
    sets: RwLock<Option<Arc<KnownAddressSets>>>,
}

impl KnownAddressCache {
    pub fn new(source: Arc<dyn KnownAddressSource>) -> Self {
        Self {
            source,
            sets: RwLock::new(None),
        }
    }

    /// Current snapshot, loading on first use. Falls back to empty sets
    /// (everything classifies by keyword only) when the source fails.
    pub fn snapshot(&self) -> Arc<KnownAddressSets> {
        if let Some(sets) = self.read_cached() {
            return sets;
        }

        match self.source.load() {
            Ok(loaded) => {
                let mut guard = self.sets.write().unwrap_or_else(|e| e.into_inner());
                // A concurrent loader may have won; keep its value.
                let sets = guard.get_or_insert_with(|| Arc::new(loaded)).clone();
                debug!(
                    source = %self.source.describe(),
                    bridges = sets.bridge_count(),
                    mixers = sets.mixer_count(),
                    "Known-address sets cached"
                );
                sets
            }
            Err(e) => {
                warn!(
                    source = %self.source.describe(),
                    error = %e,
                    "Known-address load failed, classifying without lists"
                );
                Arc::new(KnownAddressSets::default())
            }
        }
    }

    fn read_cached(&self) -> Option<Arc<KnownAddressSets>> {
        self.sets.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Reload from the source now. On failure the previous snapshot stays.
    pub fn refresh(&self) -> anyhow::Result<()> {
        let loaded = Arc::new(self.source.load()?);
        *self.sets.write().unwrap_or_else(|e| e.into_inner()) = Some(loaded);
        Ok(())
    }

    /// Drop the snapshot; the next use reloads.
    pub fn invalidate(&self) {
        *self.sets.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.read_cached().is_some()
    }

    /// Classify one edge by its endpoints.
    pub fn classify(&self, from_address: &str, to_address: &str) -> EdgeType {
        classify_with(&self.snapshot(), from_address, to_address)
    }
}
