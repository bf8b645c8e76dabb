//! Tron collector.
//!
//! Talks to a TronGrid-compatible HTTP API (`/wallet/*`). An API key,
//! when configured, is sent as `TRON-PRO-API-KEY`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{
    check_rpc_url, stablecoins_for, Collector, CollectorState, CollectorStatus, NetworkStats,
    SharedState,
};
use crate::config::ChainConfig;
use crate::types::{Chain, ComplianceError};

const API_KEY_HEADER: &str = "TRON-PRO-API-KEY";

#[derive(Debug, Deserialize)]
struct NowBlock {
    block_header: BlockHeader,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    raw_data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawData {
    #[serde(default)]
    number: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeInfo {
    #[serde(default)]
    active_connect_count: Option<u64>,
    #[serde(default)]
    config_node_info: Option<ConfigNodeInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigNodeInfo {
    #[serde(default)]
    code_version: Option<String>,
}

pub struct TronCollector {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
    state: SharedState,
}

impl TronCollector {
    pub fn new(cfg: &ChainConfig) -> Result<Self> {
        check_rpc_url(Chain::Tron, &cfg.rpc_url)?;
        let http = Client::builder()
            .timeout(cfg.timeout())
            .user_agent("CHAINWATCH/0.1.0")
            .build()
            .context("Failed to build Tron HTTP client")?;

        Ok(Self {
            http,
            base_url: cfg.rpc_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key(),
            state: Arc::new(RwLock::new(CollectorState::new(stablecoins_for(
                Chain::Tron,
                cfg,
            )))),
        })
    }

    async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "Tron API call");

        let mut req = self.http.post(&url).json(&serde_json::json!({}));
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key.expose_secret());
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("Tron API request {path} failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Tron API error {status}: {body}");
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse Tron response for {path}"))
    }

    async fn head_block(&self) -> Result<u64> {
        let block: NowBlock = self.post("/wallet/getnowblock").await?;
        Ok(block.block_header.raw_data.number)
    }
}

#[async_trait]
impl Collector for TronCollector {
    fn chain(&self) -> Chain {
        Chain::Tron
    }

    async fn connect(&self) -> Result<()> {
        let block = self.head_block().await?;
        self.state.write().await.mark_connected(block);
        info!(block, "Tron collector connected");
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.write().await.mark_disconnected();
        debug!("Tron collector disconnected");
    }

    async fn get_latest_block_number(&self) -> Result<u64> {
        if !self.state.read().await.is_connected() {
            return Err(ComplianceError::NotConnected(Chain::Tron).into());
        }
        let block = self.head_block().await?;
        self.state.write().await.last_block = Some(block);
        Ok(block)
    }

    async fn get_network_stats(&self) -> Result<NetworkStats> {
        let latest_block = self.head_block().await?;
        let node = self.post::<NodeInfo>("/wallet/getnodeinfo").await.ok();

        Ok(NetworkStats {
            latest_block,
            chain_id: Some("mainnet".to_string()),
            fee_estimate: None,
            fee_unit: None,
            peer_count: node.as_ref().and_then(|n| n.active_connect_count),
            syncing: None,
            node_version: node
                .and_then(|n| n.config_node_info)
                .and_then(|c| c.code_version),
        })
    }

    async fn status(&self) -> Result<CollectorStatus> {
        Ok(self.state.read().await.snapshot(Chain::Tron))
    }
}
