//! Collector manager.
//!
//! Owns one collector per configured chain and exposes uniform lifecycle
//! and monitoring operations. Aggregate calls (`get_all_status`,
//! `get_network_stats`) probe every chain concurrently and isolate
//! failures: a chain that errors, panics, or times out yields an
//! `{"error": ...}` entry and never affects its siblings.

use anyhow::Result;
use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{build_collector, Collector, CollectorStatus, NetworkStats};
use crate::config::{ChainConfig, CollectorsConfig};
use crate::types::{Chain, ComplianceError};

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Status of one chain, or the reason it could not be obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusEntry {
    Status(CollectorStatus),
    Error { error: String },
}

impl StatusEntry {
    pub fn is_running(&self) -> bool {
        matches!(self, StatusEntry::Status(s) if s.connected)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            StatusEntry::Error { error } => Some(error),
            StatusEntry::Status(_) => None,
        }
    }
}

/// Network stats of one chain, or the reason they could not be obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatsEntry {
    Stats(NetworkStats),
    Error { error: String },
}

impl StatsEntry {
    pub fn error(&self) -> Option<&str> {
        match self {
            StatsEntry::Error { error } => Some(error),
            StatsEntry::Stats(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSummary {
    pub total_collectors: usize,
    pub running_collectors: usize,
}

/// `{manager: {...}, collectors: {chain: status|error}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerStatus {
    pub manager: ManagerSummary,
    pub collectors: BTreeMap<Chain, StatusEntry>,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// A configured chain: its collector (if construction succeeded) and the
/// most recent connection failure.
struct CollectorSlot {
    collector: Option<Arc<dyn Collector>>,
    init_error: Option<String>,
    last_error: RwLock<Option<String>>,
}

pub struct CollectorManager {
    slots: BTreeMap<Chain, CollectorSlot>,
    probe_timeout: Duration,
}

impl CollectorManager {
    /// Build a collector for every enabled chain in `cfg`. Does not connect.
    ///
    /// Fails only on invalid configuration (unknown or duplicated chain).
    /// Individual construction failures are recorded against that chain.
    pub fn initialize(cfg: &CollectorsConfig) -> Result<Self, ComplianceError> {
        Self::initialize_with(cfg, build_collector)
    }

    /// As `initialize`, with a caller-supplied collector factory.
    pub fn initialize_with<F>(cfg: &CollectorsConfig, factory: F) -> Result<Self, ComplianceError>
    where
        F: Fn(Chain, &ChainConfig) -> Result<Arc<dyn Collector>>,
    {
        let mut slots = BTreeMap::new();

        for (name, chain_cfg) in &cfg.chains {
            let chain: Chain = name.parse()?;

            if slots.contains_key(&chain) {
                return Err(ComplianceError::Validation(format!(
                    "chain {chain} configured more than once (as {name:?})"
                )));
            }

            if !chain_cfg.enabled {
                debug!(chain = %chain, "Collector disabled in config");
                continue;
            }

            let slot = match factory(chain, chain_cfg) {
                Ok(collector) => CollectorSlot {
                    collector: Some(collector),
                    init_error: None,
                    last_error: RwLock::new(None),
                },
                Err(e) => {
                    warn!(chain = %chain, error = %e, "Collector construction failed");
                    CollectorSlot {
                        collector: None,
                        init_error: Some(format!("{e:#}")),
                        last_error: RwLock::new(None),
                    }
                }
            };
            slots.insert(chain, slot);
        }

        info!(
            total = slots.len(),
            chains = ?slots.keys().collect::<Vec<_>>(),
            "Collector manager initialised"
        );

        Ok(Self {
            slots,
            probe_timeout: cfg.probe_timeout(),
        })
    }

    /// Configured chains in stable order.
    pub fn chains(&self) -> Vec<Chain> {
        self.slots.keys().copied().collect()
    }

    fn collector(&self, chain: Chain) -> Option<&Arc<dyn Collector>> {
        self.slots.get(&chain).and_then(|s| s.collector.as_ref())
    }

    /// Attempt the RPC handshake. Returns `false` on any failure.
    pub async fn connect(&self, chain: Chain) -> bool {
        let Some(slot) = self.slots.get(&chain) else {
            warn!(chain = %chain, "Connect requested for unconfigured chain");
            return false;
        };
        let Some(collector) = slot.collector.as_ref() else {
            warn!(
                chain = %chain,
                error = slot.init_error.as_deref().unwrap_or_default(),
                "Cannot connect: collector failed to initialise"
            );
            return false;
        };

        match guarded(self.probe_timeout, collector.connect()).await {
            Ok(()) => {
                *slot.last_error.write().await = None;
                true
            }
            Err(message) => {
                warn!(chain = %chain, error = %message, "Collector connect failed");
                collector.disconnect().await;
                *slot.last_error.write().await = Some(message);
                false
            }
        }
    }

    /// Connect every configured chain concurrently.
    pub async fn connect_all(&self) -> BTreeMap<Chain, bool> {
        let chains = self.chains();
        let results = join_all(chains.iter().map(|chain| self.connect(*chain))).await;
        chains.into_iter().zip(results).collect()
    }

    /// Release a chain's session. Safe on unconnected or unknown chains.
    pub async fn disconnect(&self, chain: Chain) {
        if let Some(collector) = self.collector(chain) {
            collector.disconnect().await;
        }
    }

    pub async fn disconnect_all(&self) {
        join_all(self.chains().into_iter().map(|chain| self.disconnect(chain))).await;
        info!("All collectors disconnected");
    }

    /// Current chain head. Requires a prior successful `connect`.
    pub async fn get_latest_block_number(&self, chain: Chain) -> Result<u64, ComplianceError> {
        let collector = self.collector(chain).ok_or(ComplianceError::NotConnected(chain))?;
        collector
            .get_latest_block_number()
            .await
            .map_err(|e| match e.downcast::<ComplianceError>() {
                Ok(typed) => typed,
                Err(other) => ComplianceError::Collector {
                    chain,
                    message: format!("{other:#}"),
                },
            })
    }

    /// Status of every configured chain plus running/total counters.
    pub async fn get_all_status(&self) -> ManagerStatus {
        let probes = self.slots.iter().map(|(chain, slot)| async move {
            (*chain, self.probe_status(slot).await)
        });
        let collectors: BTreeMap<Chain, StatusEntry> = join_all(probes).await.into_iter().collect();

        let running = collectors.values().filter(|e| e.is_running()).count();
        ManagerStatus {
            manager: ManagerSummary {
                total_collectors: self.slots.len(),
                running_collectors: running,
            },
            collectors,
        }
    }

    async fn probe_status(&self, slot: &CollectorSlot) -> StatusEntry {
        let Some(collector) = slot.collector.as_ref() else {
            return StatusEntry::Error {
                error: slot.init_error.clone().unwrap_or_default(),
            };
        };

        match guarded(self.probe_timeout, collector.status()).await {
            Ok(status) if status.connected => StatusEntry::Status(status),
            Ok(status) => match slot.last_error.read().await.clone() {
                Some(error) => StatusEntry::Error { error },
                None => StatusEntry::Status(status),
            },
            Err(error) => {
                warn!(chain = %collector.chain(), error = %error, "Status probe failed");
                StatusEntry::Error { error }
            }
        }
    }

    /// Live network stats of every configured chain.
    pub async fn get_network_stats(&self) -> BTreeMap<Chain, StatsEntry> {
        let probes = self.slots.iter().map(|(chain, slot)| async move {
            (*chain, self.probe_stats(*chain, slot).await)
        });
        join_all(probes).await.into_iter().collect()
    }

    async fn probe_stats(&self, chain: Chain, slot: &CollectorSlot) -> StatsEntry {
        let Some(collector) = slot.collector.as_ref() else {
            return StatsEntry::Error {
                error: slot.init_error.clone().unwrap_or_default(),
            };
        };

        match guarded(self.probe_timeout, collector.status()).await {
            Ok(status) if status.connected => {}
            Ok(_) => {
                return StatsEntry::Error {
                    error: ComplianceError::NotConnected(chain).to_string(),
                }
            }
            Err(error) => return StatsEntry::Error { error },
        }

        match guarded(self.probe_timeout, collector.get_network_stats()).await {
            Ok(stats) => StatsEntry::Stats(stats),
            Err(error) => {
                warn!(chain = %chain, error = %error, "Network stats probe failed");
                StatsEntry::Error { error }
            }
        }
    }
}

/// Run a collector call under a timeout, folding errors, timeouts and
/// panics into a message.
async fn guarded<T, F>(timeout: Duration, fut: F) -> Result<T, String>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, AssertUnwindSafe(fut).catch_unwind()).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(e))) => Err(format!("{e:#}")),
        Ok(Err(_)) => Err("collector panicked".to_string()),
        Err(_) => Err(format!("timed out after {}s", timeout.as_secs_f64())),
    }
}
