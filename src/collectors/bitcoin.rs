//! Bitcoin Core collector.
//!
//! Uses the node's JSON-RPC interface with optional basic auth.
//! `estimatesmartfee` reports BTC/kvB; it is converted to sat/vB.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::rpc::JsonRpcClient;
use super::{
    check_rpc_url, stablecoins_for, Collector, CollectorState, CollectorStatus, NetworkStats,
    SharedState,
};
use crate::config::ChainConfig;
use crate::types::{Chain, ComplianceError};

/// Confirmation target for fee estimation (blocks).
const FEE_TARGET_BLOCKS: u32 = 6;

/// BTC/kvB → sat/vB.
const SAT_PER_VB_PER_BTC_PER_KVB: f64 = 100_000.0;

#[derive(Debug, Deserialize)]
struct BlockchainInfo {
    chain: String,
    blocks: u64,
    #[serde(default)]
    initialblockdownload: bool,
}

#[derive(Debug, Deserialize)]
struct NetworkInfo {
    #[serde(default)]
    connections: Option<u64>,
    #[serde(default)]
    subversion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SmartFee {
    #[serde(default)]
    feerate: Option<f64>,
}

pub struct BitcoinCollector {
    rpc: JsonRpcClient,
    state: SharedState,
}

impl BitcoinCollector {
    pub fn new(cfg: &ChainConfig) -> Result<Self> {
        check_rpc_url(Chain::Bitcoin, &cfg.rpc_url)?;
        let rpc = JsonRpcClient::new(&cfg.rpc_url, cfg.timeout())?
            .with_basic_auth(cfg.rpc_credentials());
        Ok(Self {
            rpc,
            state: Arc::new(RwLock::new(CollectorState::new(stablecoins_for(
                Chain::Bitcoin,
                cfg,
            )))),
        })
    }
}

#[async_trait]
impl Collector for BitcoinCollector {
    fn chain(&self) -> Chain {
        Chain::Bitcoin
    }

    async fn connect(&self) -> Result<()> {
        let info: BlockchainInfo = self.rpc.call("getblockchaininfo", json!([])).await?;
        self.state.write().await.mark_connected(info.blocks);
        info!(network = %info.chain, block = info.blocks, "Bitcoin collector connected");
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.write().await.mark_disconnected();
        debug!("Bitcoin collector disconnected");
    }

    async fn get_latest_block_number(&self) -> Result<u64> {
        if !self.state.read().await.is_connected() {
            return Err(ComplianceError::NotConnected(Chain::Bitcoin).into());
        }
        let block: u64 = self.rpc.call("getblockcount", json!([])).await?;
        self.state.write().await.last_block = Some(block);
        Ok(block)
    }

    async fn get_network_stats(&self) -> Result<NetworkStats> {
        let info: BlockchainInfo = self.rpc.call("getblockchaininfo", json!([])).await?;

        let network = self
            .rpc
            .call::<NetworkInfo>("getnetworkinfo", json!([]))
            .await
            .ok();

        let fee = self
            .rpc
            .call::<SmartFee>("estimatesmartfee", json!([FEE_TARGET_BLOCKS]))
            .await
            .ok()
            .and_then(|f| f.feerate)
            .map(|btc_per_kvb| btc_per_kvb * SAT_PER_VB_PER_BTC_PER_KVB);

        Ok(NetworkStats {
            latest_block: info.blocks,
            chain_id: Some(info.chain),
            fee_estimate: fee,
            fee_unit: fee.map(|_| "sat/vB".to_string()),
            peer_count: network.as_ref().and_then(|n| n.connections),
            syncing: Some(info.initialblockdownload),
            node_version: network.and_then(|n| n.subversion),
        })
    }

    async fn status(&self) -> Result<CollectorStatus> {
        Ok(self.state.read().await.snapshot(Chain::Bitcoin))
    }
}
