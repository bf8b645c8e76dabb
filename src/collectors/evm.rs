//! EVM collector (Ethereum, Polygon, BSC, Arbitrum).
//!
//! Speaks standard Ethereum JSON-RPC. `net_peerCount` and `eth_syncing`
//! are optional on many hosted providers, so their failures only leave
//! the corresponding stat empty.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::rpc::{parse_hex_f64, parse_hex_u64, JsonRpcClient};
use super::{
    check_rpc_url, stablecoins_for, Collector, CollectorState, CollectorStatus, NetworkStats,
    SharedState,
};
use crate::config::ChainConfig;
use crate::types::{Chain, ComplianceError};

const WEI_PER_GWEI: f64 = 1e9;

/// `eth_gasPrice` result in gwei; `None` if the quantity is malformed.
fn gas_price_gwei(raw: &str) -> Option<f64> {
    parse_hex_f64(raw).ok().map(|wei| wei / WEI_PER_GWEI)
}

pub struct EvmCollector {
    chain: Chain,
    rpc: JsonRpcClient,
    state: SharedState,
}

impl EvmCollector {
    pub fn new(chain: Chain, cfg: &ChainConfig) -> Result<Self> {
        check_rpc_url(chain, &cfg.rpc_url)?;
        Ok(Self {
            chain,
            rpc: JsonRpcClient::new(&cfg.rpc_url, cfg.timeout())?,
            state: Arc::new(RwLock::new(CollectorState::new(stablecoins_for(chain, cfg)))),
        })
    }

    async fn block_number(&self) -> Result<u64> {
        let raw: String = self.rpc.call("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&raw)
    }
}

#[async_trait]
impl Collector for EvmCollector {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn connect(&self) -> Result<()> {
        let chain_id: String = self.rpc.call("eth_chainId", json!([])).await?;
        let block = self.block_number().await?;
        self.state.write().await.mark_connected(block);
        info!(chain = %self.chain, chain_id = %chain_id, block, "EVM collector connected");
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.write().await.mark_disconnected();
        debug!(chain = %self.chain, "EVM collector disconnected");
    }

    async fn get_latest_block_number(&self) -> Result<u64> {
        if !self.state.read().await.is_connected() {
            return Err(ComplianceError::NotConnected(self.chain).into());
        }
        let block = self.block_number().await?;
        self.state.write().await.last_block = Some(block);
        Ok(block)
    }

    async fn get_network_stats(&self) -> Result<NetworkStats> {
        let latest_block = self.block_number().await?;
        let chain_id: String = self.rpc.call("eth_chainId", json!([])).await?;

        let gas_price = match self.rpc.call::<String>("eth_gasPrice", json!([])).await {
            Ok(raw) => {
                let gwei = gas_price_gwei(&raw);
                if gwei.is_none() {
                    debug!(chain = %self.chain, raw = %raw, "Malformed eth_gasPrice result");
                }
                gwei
            }
            Err(e) => {
                debug!(chain = %self.chain, error = %e, "eth_gasPrice unavailable");
                None
            }
        };

        let peer_count = self
            .rpc
            .call::<String>("net_peerCount", json!([]))
            .await
            .ok()
            .and_then(|raw| parse_hex_u64(&raw).ok());

        // `false` when in sync, an object with progress fields otherwise.
        let syncing = self
            .rpc
            .call::<Value>("eth_syncing", json!([]))
            .await
            .ok()
            .map(|v| !matches!(v, Value::Bool(false)));

        let node_version = self
            .rpc
            .call::<String>("web3_clientVersion", json!([]))
            .await
            .ok();

        Ok(NetworkStats {
            latest_block,
            chain_id: Some(parse_hex_u64(&chain_id)?.to_string()),
            fee_estimate: gas_price,
            fee_unit: gas_price.map(|_| "gwei".to_string()),
            peer_count,
            syncing,
            node_version,
        })
    }

    async fn status(&self) -> Result<CollectorStatus> {
        Ok(self.state.read().await.snapshot(self.chain))
    }
}
