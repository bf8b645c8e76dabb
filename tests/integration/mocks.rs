//! In-memory collaborators for integration testing.
//!
//! Deterministic stand-ins for the graph database, the sanctions / label
//! services, chain collectors and the detector engines. All state is
//! in-memory and controllable from test code.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;

use chainwatch::collectors::{Collector, CollectorState, CollectorStatus, NetworkStats};
use chainwatch::engine::{AnalysisTarget, CrossChainCorrelator, CrossChainFlag, MixerDetector, MixerVerdict, PatternDetector};
use chainwatch::graph::{AddressRecord, EntityEnricher, GraphStore, TransferRecord};
use chainwatch::types::{Chain, ComplianceError, Direction, PatternMatch, SanctionsStatus};

// ---------------------------------------------------------------------------
// Graph store
// ---------------------------------------------------------------------------

/// Transfers and address records for one chain.
#[derive(Default)]
pub struct MemoryGraphStore {
    transfers: Vec<TransferRecord>,
    records: HashMap<String, AddressRecord>,
    /// Neighbour queries for these (lowercase) addresses fail.
    failing: Mutex<HashSet<String>>,
    /// Address record lookups fail.
    records_down: AtomicBool,
    neighbor_calls: AtomicUsize,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transfer(mut self, from: &str, to: &str, tx_hash: &str, value: f64) -> Self {
        self.transfers.push(TransferRecord {
            from_address: from.to_string(),
            to_address: to.to_string(),
            tx_hash: tx_hash.to_string(),
            value,
            timestamp: None,
        });
        self
    }

    pub fn record(mut self, address: &str, balance: f64, tx_count: u64, risk_score: Option<f64>) -> Self {
        self.records.insert(
            address.to_lowercase(),
            AddressRecord {
                address: address.to_string(),
                balance: Some(balance),
                tx_count: Some(tx_count),
                risk_score,
                ..Default::default()
            },
        );
        self
    }

    /// A chain of `len` transfers: `0xn0 -> 0xn1 -> ... -> 0xn{len}`.
    pub fn path(len: usize) -> Self {
        (0..len).fold(Self::new(), |store, i| {
            store.transfer(&format!("0xn{i}"), &format!("0xn{}", i + 1), &format!("0xtx{i}"), 1.0)
        })
    }

    /// A hub with `spokes` outgoing transfers.
    pub fn star(hub: &str, spokes: usize) -> Self {
        (0..spokes).fold(Self::new(), |store, i| {
            store.transfer(hub, &format!("0xspoke{i}"), &format!("0xstar{i}"), i as f64)
        })
    }

    pub fn fail_neighbors_of(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_lowercase());
    }

    pub fn fail_records(self) -> Self {
        self.records_down.store(true, Ordering::SeqCst);
        self
    }

    pub fn neighbor_calls(&self) -> usize {
        self.neighbor_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn neighbors(
        &self,
        address: &str,
        _chain: Chain,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<TransferRecord>> {
        self.neighbor_calls.fetch_add(1, Ordering::SeqCst);
        let key = address.to_lowercase();
        if self.failing.lock().unwrap().contains(&key) {
            bail!("graph database timeout for {address}");
        }

        Ok(self
            .transfers
            .iter()
            .filter(|t| {
                let outgoing = t.from_address.to_lowercase() == key;
                let incoming = t.to_address.to_lowercase() == key;
                match direction {
                    Direction::Out => outgoing,
                    Direction::In => incoming,
                    Direction::Both => outgoing || incoming,
                }
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn transaction(&self, tx_hash: &str, _chain: Chain) -> Result<Vec<TransferRecord>> {
        Ok(self
            .transfers
            .iter()
            .filter(|t| t.tx_hash.eq_ignore_ascii_case(tx_hash))
            .cloned()
            .collect())
    }

    async fn address(&self, address: &str, _chain: Chain) -> Result<Option<AddressRecord>> {
        if self.records_down.load(Ordering::SeqCst) {
            bail!("graph database unreachable");
        }
        Ok(self.records.get(&address.to_lowercase()).cloned())
    }
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryEnricher {
    sanctioned: HashSet<String>,
    labels: HashMap<String, Vec<String>>,
    broken: bool,
}

impl MemoryEnricher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sanction(mut self, address: &str) -> Self {
        self.sanctioned.insert(address.to_lowercase());
        self
    }

    pub fn label(mut self, address: &str, label: &str) -> Self {
        self.labels
            .entry(address.to_lowercase())
            .or_default()
            .push(label.to_string());
        self
    }

    /// Every lookup fails.
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl EntityEnricher for MemoryEnricher {
    async fn sanctions_status(&self, address: &str, _chain: Chain) -> Result<Option<SanctionsStatus>> {
        if self.broken {
            bail!("sanctions service unavailable");
        }
        Ok(Some(if self.sanctioned.contains(&address.to_lowercase()) {
            SanctionsStatus::Sanctioned
        } else {
            SanctionsStatus::Clear
        }))
    }

    async fn labels(&self, address: &str, _chain: Chain) -> Result<Vec<String>> {
        if self.broken {
            bail!("label service unavailable");
        }
        Ok(self
            .labels
            .get(&address.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

pub struct MockCollector {
    chain: Chain,
    fail_connect: bool,
    state: RwLock<CollectorState>,
}

impl MockCollector {
    pub fn new(chain: Chain, fail_connect: bool) -> Self {
        Self {
            chain,
            fail_connect,
            state: RwLock::new(CollectorState::new(chain.default_stablecoins())),
        }
    }
}

#[async_trait]
impl Collector for MockCollector {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn connect(&self) -> Result<()> {
        if self.fail_connect {
            bail!("rpc endpoint refused connection");
        }
        self.state.write().await.mark_connected(1_000);
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.write().await.mark_disconnected();
    }

    async fn get_latest_block_number(&self) -> Result<u64> {
        if !self.state.read().await.is_connected() {
            return Err(ComplianceError::NotConnected(self.chain).into());
        }
        Ok(1_001)
    }

    async fn get_network_stats(&self) -> Result<NetworkStats> {
        Ok(NetworkStats {
            latest_block: 1_001,
            peer_count: Some(8),
            ..Default::default()
        })
    }

    async fn status(&self) -> Result<CollectorStatus> {
        Ok(self.state.read().await.snapshot(self.chain))
    }
}

// ---------------------------------------------------------------------------
// Detectors
// ---------------------------------------------------------------------------

/// Pattern detector returning fixed matches, or failing.
pub struct FixedPatterns(pub Option<Vec<PatternMatch>>);

#[async_trait]
impl PatternDetector for FixedPatterns {
    async fn detect(&self, _target: &AnalysisTarget, _chain: Chain) -> Result<Vec<PatternMatch>> {
        self.0.clone().ok_or_else(|| anyhow!("pattern engine crashed"))
    }
}

pub struct FixedMixer(pub Option<MixerVerdict>);

#[async_trait]
impl MixerDetector for FixedMixer {
    async fn detect(&self, _target: &AnalysisTarget, _chain: Chain) -> Result<MixerVerdict> {
        self.0.clone().ok_or_else(|| anyhow!("mixer engine crashed"))
    }
}

pub struct FixedCrossChain(pub Option<Vec<CrossChainFlag>>);

#[async_trait]
impl CrossChainCorrelator for FixedCrossChain {
    async fn correlate(&self, _target: &AnalysisTarget, _chain: Chain) -> Result<Vec<CrossChainFlag>> {
        self.0.clone().ok_or_else(|| anyhow!("correlator crashed"))
    }
}
