//! Solana collector.
//!
//! Block numbers are reported as slots, which is what transaction
//! records reference on Solana.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::rpc::{JsonRpcClient, RpcNodeError};
use super::{
    check_rpc_url, stablecoins_for, Collector, CollectorState, CollectorStatus, NetworkStats,
    SharedState,
};
use crate::config::ChainConfig;
use crate::types::{Chain, ComplianceError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpochInfo {
    epoch: u64,
    absolute_slot: u64,
    #[serde(default)]
    block_height: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "solana-core")]
    solana_core: String,
}

pub struct SolanaCollector {
    rpc: JsonRpcClient,
    state: SharedState,
}

impl SolanaCollector {
    pub fn new(cfg: &ChainConfig) -> Result<Self> {
        check_rpc_url(Chain::Solana, &cfg.rpc_url)?;
        Ok(Self {
            rpc: JsonRpcClient::new(&cfg.rpc_url, cfg.timeout())?,
            state: Arc::new(RwLock::new(CollectorState::new(stablecoins_for(
                Chain::Solana,
                cfg,
            )))),
        })
    }

    async fn slot(&self) -> Result<u64> {
        self.rpc.call("getSlot", json!([{"commitment": "finalized"}])).await
    }
}

#[async_trait]
impl Collector for SolanaCollector {
    fn chain(&self) -> Chain {
        Chain::Solana
    }

    async fn connect(&self) -> Result<()> {
        let health: String = self.rpc.call("getHealth", json!([])).await?;
        if health != "ok" {
            bail!("Solana node unhealthy: {health}");
        }
        let slot = self.slot().await?;
        self.state.write().await.mark_connected(slot);
        info!(slot, "Solana collector connected");
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.write().await.mark_disconnected();
        debug!("Solana collector disconnected");
    }

    async fn get_latest_block_number(&self) -> Result<u64> {
        if !self.state.read().await.is_connected() {
            return Err(ComplianceError::NotConnected(Chain::Solana).into());
        }
        let slot = self.slot().await?;
        self.state.write().await.last_block = Some(slot);
        Ok(slot)
    }

    async fn get_network_stats(&self) -> Result<NetworkStats> {
        let epoch: EpochInfo = self.rpc.call("getEpochInfo", json!([])).await?;

        let version = self
            .rpc
            .call::<VersionInfo>("getVersion", json!([]))
            .await
            .ok()
            .map(|v| v.solana_core);

        let health = self.rpc.call::<String>("getHealth", json!([])).await;
        let syncing = syncing_from_health(&health);
        if let Err(e) = &health {
            debug!(error = %e, syncing = ?syncing, "getHealth did not report ok");
        }

        debug!(epoch = epoch.epoch, block_height = ?epoch.block_height, "Solana epoch info");

        Ok(NetworkStats {
            latest_block: epoch.absolute_slot,
            chain_id: Some(format!("epoch-{}", epoch.epoch)),
            fee_estimate: None,
            fee_unit: None,
            peer_count: None,
            syncing,
            node_version: version,
        })
    }

    async fn status(&self) -> Result<CollectorStatus> {
        Ok(self.state.read().await.snapshot(Chain::Solana))
    }
}

/// `getHealth` answers `"ok"`, or a JSON-RPC error when the node is
/// behind. Any other failure says nothing about sync state.
fn syncing_from_health(health: &Result<String>) -> Option<bool> {
    match health {
        Ok(status) => Some(status != "ok"),
        Err(e) if e.downcast_ref::<RpcNodeError>().is_some() => Some(true),
        Err(_) => None,
    }
}
