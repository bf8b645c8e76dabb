//! Shared types for the CHAINWATCH core.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that collector, graph, scoring,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// Hard cap on graph expansion depth (hops from the seed).
pub const MAX_DEPTH: u32 = 5;

/// Hard cap on the number of nodes in any graph projection.
pub const MAX_GRAPH_NODES: usize = 500;

/// Default expansion depth when a request does not specify one.
pub const DEFAULT_DEPTH: u32 = 2;

/// Default node limit when a request does not specify one.
pub const DEFAULT_NODE_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// A supported ledger. The set is closed: anything else is a
/// configuration or validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Bitcoin,
    Ethereum,
    Polygon,
    Bsc,
    Arbitrum,
    Solana,
    Tron,
}

/// RPC dialect family. One collector implementation exists per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Bitcoin,
    Solana,
    Tron,
}

impl Chain {
    /// All supported chains (useful for iteration).
    pub const ALL: &'static [Chain] = &[
        Chain::Bitcoin,
        Chain::Ethereum,
        Chain::Polygon,
        Chain::Bsc,
        Chain::Arbitrum,
        Chain::Solana,
        Chain::Tron,
    ];

    pub fn family(&self) -> ChainFamily {
        match self {
            Chain::Bitcoin => ChainFamily::Bitcoin,
            Chain::Ethereum | Chain::Polygon | Chain::Bsc | Chain::Arbitrum => ChainFamily::Evm,
            Chain::Solana => ChainFamily::Solana,
            Chain::Tron => ChainFamily::Tron,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "bitcoin",
            Chain::Ethereum => "ethereum",
            Chain::Polygon => "polygon",
            Chain::Bsc => "bsc",
            Chain::Arbitrum => "arbitrum",
            Chain::Solana => "solana",
            Chain::Tron => "tron",
        }
    }

    /// Well-known stablecoin contracts per chain (symbol → contract).
    /// Bitcoin has none.
    pub fn default_stablecoins(&self) -> BTreeMap<String, String> {
        let pairs: &[(&str, &str)] = match self {
            Chain::Bitcoin => &[],
            Chain::Ethereum => &[
                ("USDT", "0xdac17f958d2ee523a2206206994597c13d831ec7"),
                ("USDC", "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
            ],
            Chain::Polygon => &[
                ("USDT", "0xc2132d05d31c914a87c6611c10748aeb04b58e8f"),
                ("USDC", "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359"),
            ],
            Chain::Bsc => &[
                ("USDT", "0x55d398326f99059ff775485246999027b3197955"),
                ("USDC", "0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d"),
            ],
            Chain::Arbitrum => &[
                ("USDT", "0xfd086bc7cd5c481dcc9c85ebe478a1c0b69fcbb9"),
                ("USDC", "0xaf88d065e77c8cc2239327c5edb3a432268e5831"),
            ],
            Chain::Solana => &[
                ("USDT", "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB"),
                ("USDC", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
            ],
            Chain::Tron => &[
                ("USDT", "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"),
                ("USDC", "TEkxiTehnzSmSe2XqrBj4w32RUN966rdz8"),
            ],
        };
        pairs
            .iter()
            .map(|(sym, addr)| (sym.to_string(), addr.to_string()))
            .collect()
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a chain identifier (case-insensitive, common ticker aliases accepted).
impl std::str::FromStr for Chain {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bitcoin" | "btc" => Ok(Chain::Bitcoin),
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "polygon" | "matic" => Ok(Chain::Polygon),
            "bsc" | "bnb" | "binance-smart-chain" => Ok(Chain::Bsc),
            "arbitrum" | "arb" => Ok(Chain::Arbitrum),
            "solana" | "sol" => Ok(Chain::Solana),
            "tron" | "trx" => Ok(Chain::Tron),
            _ => Err(ComplianceError::UnknownChain(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Graph primitives
// ---------------------------------------------------------------------------

/// Traversal direction relative to the seed address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    #[default]
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Both => "both",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in" | "incoming" => Ok(Direction::In),
            "out" | "outgoing" => Ok(Direction::Out),
            "both" | "all" => Ok(Direction::Both),
            _ => Err(ComplianceError::Validation(format!("invalid direction: {s}"))),
        }
    }
}

/// Economic role of a graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    Transfer,
    Bridge,
    Mixer,
    Dex,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Transfer => "transfer",
            EdgeType::Bridge => "bridge",
            EdgeType::Mixer => "mixer",
            EdgeType::Dex => "dex",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a sanctions-list lookup for one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SanctionsStatus {
    Clear,
    Sanctioned,
}

/// A node in a graph projection. Materialised per request, never persisted.
///
/// Enrichment-derived fields are optional: a failed lookup omits the
/// field rather than failing the projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub address: String,
    pub chain: Chain,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanctions_status: Option<SanctionsStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl GraphNode {
    /// A bare node with no metadata attached yet.
    pub fn bare(address: &str, chain: Chain) -> Self {
        Self {
            address: address.to_string(),
            chain,
            labels: Vec::new(),
            risk_score: None,
            sanctions_status: None,
            balance: None,
            tx_count: None,
            first_seen: None,
            last_seen: None,
        }
    }

    pub fn is_sanctioned(&self) -> bool {
        self.sanctions_status == Some(SanctionsStatus::Sanctioned)
    }
}

/// A classified value transfer between two addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from_address: String,
    pub to_address: String,
    pub chain: Chain,
    pub tx_hash: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub edge_type: EdgeType,
}

/// Descriptive metadata for a graph projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMetadata {
    /// Seed address, transaction hash, or comma-joined seed set.
    pub seed: String,
    pub chain: Chain,
    /// Operation-specific qualifier (direction, query type, cluster type).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
    /// Deepest hop actually reached.
    pub depth: u32,
    pub node_count: usize,
    pub edge_count: usize,
    /// Node limit was hit; more neighbours exist than were returned.
    pub truncated: bool,
    /// At least one store query failed; the projection is incomplete.
    pub partial: bool,
    pub edge_type_counts: BTreeMap<EdgeType, usize>,
    pub generated_at: DateTime<Utc>,
}

/// The `{nodes, edges, metadata, success}` envelope every graph
/// operation returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphResponse {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub metadata: GraphMetadata,
    pub success: bool,
}

impl GraphResponse {
    pub fn node(&self, address: &str) -> Option<&GraphNode> {
        let needle = address.to_lowercase();
        self.nodes.iter().find(|n| n.address.to_lowercase() == needle)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Parameters for a neighbourhood expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandRequest {
    pub address: String,
    pub chain: Chain,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default = "default_depth")]
    pub depth: u32,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_depth() -> u32 {
    DEFAULT_DEPTH
}

fn default_limit() -> usize {
    DEFAULT_NODE_LIMIT
}

impl ExpandRequest {
    pub fn new(address: &str, chain: Chain) -> Self {
        Self {
            address: address.to_string(),
            chain,
            direction: Direction::Both,
            depth: DEFAULT_DEPTH,
            limit: DEFAULT_NODE_LIMIT,
        }
    }

    /// Reject out-of-range parameters.
    pub fn validate(&self) -> Result<(), ComplianceError> {
        validate_address(&self.address)?;
        if self.depth == 0 || self.depth > MAX_DEPTH {
            return Err(ComplianceError::Validation(format!(
                "depth must be between 1 and {MAX_DEPTH}, got {}",
                self.depth
            )));
        }
        if self.limit == 0 || self.limit > MAX_GRAPH_NODES {
            return Err(ComplianceError::Validation(format!(
                "limit must be between 1 and {MAX_GRAPH_NODES}, got {}",
                self.limit
            )));
        }
        Ok(())
    }
}

/// Reject blank or whitespace-containing addresses.
pub fn validate_address(address: &str) -> Result<(), ComplianceError> {
    if address.trim().is_empty() {
        return Err(ComplianceError::Validation("address must not be empty".into()));
    }
    if address.chars().any(char::is_whitespace) {
        return Err(ComplianceError::Validation(format!(
            "address contains whitespace: {address:?}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Risk signals
// ---------------------------------------------------------------------------

/// Severity assigned to a detected pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

/// A pattern reported by an external detector. Consumed, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern_type: String,
    pub confidence: f64,
    pub risk_score: f64,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub evidence: Vec<String>,
}

impl PatternMatch {
    /// Minimal match carrying only a type and risk score.
    pub fn with_risk(pattern_type: &str, risk_score: f64) -> Self {
        Self {
            pattern_type: pattern_type.to_string(),
            confidence: 1.0,
            risk_score,
            severity: Severity::default(),
            evidence: Vec::new(),
        }
    }
}

/// Input contract of the risk scoring aggregator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskSignalBundle {
    pub sanctions_hits: u32,
    pub pattern_matches: Vec<PatternMatch>,
    pub mixer_detected: bool,
    pub mixer_risk: f64,
    pub volume_anomaly: f64,
    pub base_score: f64,
}

/// Coarse banding of a final risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.75 {
            RiskLevel::Critical
        } else if score >= 0.5 {
            RiskLevel::High
        } else if score >= 0.25 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for CHAINWATCH.
///
/// Callers of the core only ever observe `Validation`, `UnknownChain`,
/// `NotFound` and `NotConnected`; `Collector` and `Engine` are recorded
/// in per-chain / per-branch results.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComplianceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown chain: {0}")]
    UnknownChain(String),

    #[error("Not found ({kind}): {query}")]
    NotFound { kind: String, query: String },

    #[error("Collector for {0} is not connected")]
    NotConnected(Chain),

    #[error("Collector error ({chain}): {message}")]
    Collector { chain: Chain, message: String },

    #[error("Engine failure ({engine}): {message}")]
    Engine { engine: String, message: String },
}

impl ComplianceError {
    pub fn not_found(kind: &str, query: &str) -> Self {
        ComplianceError::NotFound {
            kind: kind.to_string(),
            query: query.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ComplianceError::NotFound { .. })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
