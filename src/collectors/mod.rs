//! Per-chain collectors.
//!
//! Defines the `Collector` trait and one implementation per RPC family:
//! - EVM (Ethereum, Polygon, BSC, Arbitrum): JSON-RPC `eth_*`
//! - Bitcoin Core: JSON-RPC with basic auth
//! - Solana: JSON-RPC
//! - Tron: TronGrid HTTP API
//!
//! `build_collector` maps the closed `Chain` set onto those families.

pub mod bitcoin;
pub mod evm;
pub mod manager;
pub mod rpc;
pub mod solana;
pub mod tron;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::ChainConfig;
use crate::types::{Chain, ChainFamily};

// ---------------------------------------------------------------------------
// Lifecycle state
// ---------------------------------------------------------------------------

/// Collector lifecycle: `Uninitialized → Connected ⇄ Disconnected`.
/// A connected collector reports itself as `"ready"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorPhase {
    Uninitialized,
    #[serde(rename = "ready")]
    Connected,
    Disconnected,
}

/// Mutable connection state owned by exactly one collector.
#[derive(Debug, Clone)]
pub struct CollectorState {
    pub phase: CollectorPhase,
    pub last_block: Option<u64>,
    pub stablecoins: BTreeMap<String, String>,
}

impl CollectorState {
    pub fn new(stablecoins: BTreeMap<String, String>) -> Self {
        Self {
            phase: CollectorPhase::Uninitialized,
            last_block: None,
            stablecoins,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.phase == CollectorPhase::Connected
    }

    pub fn mark_connected(&mut self, block: u64) {
        self.phase = CollectorPhase::Connected;
        self.last_block = Some(block);
    }

    /// Drop to `Disconnected`; a never-connected collector stays
    /// `Uninitialized`.
    pub fn mark_disconnected(&mut self) {
        if self.phase == CollectorPhase::Connected {
            self.phase = CollectorPhase::Disconnected;
        }
    }

    pub fn snapshot(&self, chain: Chain) -> CollectorStatus {
        CollectorStatus {
            chain,
            status: self.phase,
            connected: self.is_connected(),
            last_block: self.last_block,
            stablecoin_contracts: self.stablecoins.clone(),
        }
    }
}

/// Shared handle used by collector implementations.
pub type SharedState = Arc<RwLock<CollectorState>>;

/// Stablecoin map for a chain, honouring a config override.
pub fn stablecoins_for(chain: Chain, cfg: &ChainConfig) -> BTreeMap<String, String> {
    cfg.stablecoins
        .clone()
        .unwrap_or_else(|| chain.default_stablecoins())
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Point-in-time view of one collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorStatus {
    pub chain: Chain,
    pub status: CollectorPhase,
    pub connected: bool,
    pub last_block: Option<u64>,
    pub stablecoin_contracts: BTreeMap<String, String>,
}

/// Chain-level network statistics from a live RPC probe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkStats {
    pub latest_block: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    /// Fee estimate in the chain's natural unit (`fee_unit`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_estimate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syncing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_version: Option<String>,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Uniform lifecycle and probe surface over chain-specific RPC quirks.
#[async_trait]
pub trait Collector: Send + Sync {
    /// The chain this collector serves.
    fn chain(&self) -> Chain;

    /// Perform the RPC handshake. Idempotent: connecting an already
    /// connected collector re-validates the endpoint and succeeds.
    async fn connect(&self) -> Result<()>;

    /// Release the session. Safe on an unconnected collector.
    async fn disconnect(&self);

    /// Current chain head. Errors if the collector is not connected.
    async fn get_latest_block_number(&self) -> Result<u64>;

    /// Live network statistics.
    async fn get_network_stats(&self) -> Result<NetworkStats>;

    /// Local state snapshot (no RPC round-trip for well-behaved impls).
    async fn status(&self) -> Result<CollectorStatus>;
}

/// Construct the collector for `chain` from its config.
pub fn build_collector(chain: Chain, cfg: &ChainConfig) -> Result<Arc<dyn Collector>> {
    let collector: Arc<dyn Collector> = match chain.family() {
        ChainFamily::Evm => Arc::new(evm::EvmCollector::new(chain, cfg)?),
        ChainFamily::Bitcoin => Arc::new(bitcoin::BitcoinCollector::new(cfg)?),
        ChainFamily::Solana => Arc::new(solana::SolanaCollector::new(cfg)?),
        ChainFamily::Tron => Arc::new(tron::TronCollector::new(cfg)?),
    };
    Ok(collector)
}

/// Reject RPC URLs that can never work before building an HTTP client.
pub(crate) fn check_rpc_url(chain: Chain, url: &str) -> Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        anyhow::bail!("{chain} RPC url must be http(s): {url:?}");
    }
    Ok(())
}
