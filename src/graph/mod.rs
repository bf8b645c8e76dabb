//! Transaction graph engine.
//!
//! Defines the `GraphStore` and `EntityEnricher` seams to the external
//! graph database and label / sanctions services, and the engine that
//! projects bounded, classified node/edge views from them.

pub mod classifier;
pub mod engine;
pub mod known;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Chain, Direction, SanctionsStatus};

pub use engine::{AddressSummary, ClusterType, GraphEngine, SearchType};

/// One value transfer as stored in the graph database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub from_address: String,
    pub to_address: String,
    pub tx_hash: String,
    pub value: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Aggregate per-address metadata held by the graph database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub address: String,
    #[serde(default)]
    pub balance: Option<f64>,
    #[serde(default)]
    pub tx_count: Option<u64>,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    /// Last persisted risk score, if the address was analysed before.
    #[serde(default)]
    pub risk_score: Option<f64>,
}

/// Read access to the transaction graph database.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Transfers adjacent to `address` in the given direction, at most `limit`.
    async fn neighbors(
        &self,
        address: &str,
        chain: Chain,
        direction: Direction,
        limit: usize,
    ) -> Result<Vec<TransferRecord>>;

    /// All transfers recorded under one transaction hash.
    async fn transaction(&self, tx_hash: &str, chain: Chain) -> Result<Vec<TransferRecord>>;

    /// Aggregate metadata for one address, `None` if unknown.
    async fn address(&self, address: &str, chain: Chain) -> Result<Option<AddressRecord>>;
}

/// Sanctions and entity-attribution lookups.
#[async_trait]
pub trait EntityEnricher: Send + Sync {
    /// `None` when the screening service has no opinion.
    async fn sanctions_status(&self, address: &str, chain: Chain) -> Result<Option<SanctionsStatus>>;

    /// Entity labels (exchange, service, ...) attributed to the address.
    async fn labels(&self, address: &str, chain: Chain) -> Result<Vec<String>>;
}

/// Enricher for deployments without label or sanctions services.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnrichment;

#[async_trait]
impl EntityEnricher for NoEnrichment {
    async fn sanctions_status(&self, _address: &str, _chain: Chain) -> Result<Option<SanctionsStatus>> {
        Ok(None)
    }

    async fn labels(&self, _address: &str, _chain: Chain) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
