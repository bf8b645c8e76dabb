//! Graph projection engine.
//!
//! Builds bounded node/edge views around a seed address, a transaction,
//! or a set of addresses, classifies every edge, and enriches nodes with
//! address metadata, sanctions status and entity labels.
//!
//! Store and enrichment calls run under timeouts. A failed neighbour
//! query marks the projection `partial`; a failed enrichment call leaves
//! the affected node fields empty. Neither fails the request.

use anyhow::anyhow;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::classifier::{classify_with, KnownAddressCache};
use super::known::{source_from_config, KnownAddressSource};
use super::{AddressRecord, EntityEnricher, GraphStore, TransferRecord};
use crate::config::GraphConfig;
use crate::types::{
    validate_address, Chain, ComplianceError, Direction, EdgeType, ExpandRequest, GraphEdge,
    GraphMetadata, GraphNode, GraphResponse, SanctionsStatus,
};

/// Parallel store / enrichment calls in flight per request.
const FAN_OUT: usize = 16;

// ---------------------------------------------------------------------------
// Query kinds
// ---------------------------------------------------------------------------

/// How a search query should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Address,
    Transaction,
    /// Transaction if the query looks like a hash, address otherwise.
    #[default]
    Auto,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Address => "address",
            SearchType::Transaction => "transaction",
            SearchType::Auto => "auto",
        }
    }

    fn resolve(self, query: &str, chain: Chain) -> SearchType {
        match self {
            SearchType::Auto if looks_like_tx_hash(query, chain) => SearchType::Transaction,
            SearchType::Auto => SearchType::Address,
            explicit => explicit,
        }
    }
}

impl std::str::FromStr for SearchType {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "address" | "addr" => Ok(SearchType::Address),
            "transaction" | "tx" | "tx_hash" => Ok(SearchType::Transaction),
            "auto" | "" => Ok(SearchType::Auto),
            _ => Err(ComplianceError::Validation(format!("invalid query type: {s}"))),
        }
    }
}

/// Grouping heuristic for `cluster`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClusterType {
    /// Seeds plus every counterparty shared by at least two seeds.
    #[default]
    CommonCounterparty,
    /// Seeds and the transfers directly between them.
    DirectTransfer,
}

impl ClusterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterType::CommonCounterparty => "common_counterparty",
            ClusterType::DirectTransfer => "direct_transfer",
        }
    }
}

impl std::str::FromStr for ClusterType {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "common_counterparty" | "counterparty" | "shared_counterparty" => {
                Ok(ClusterType::CommonCounterparty)
            }
            "direct_transfer" | "direct" => Ok(ClusterType::DirectTransfer),
            _ => Err(ComplianceError::Validation(format!("invalid cluster type: {s}"))),
        }
    }
}

/// 64 hex digits (optionally `0x`-prefixed), or a base58 signature on Solana.
pub fn looks_like_tx_hash(query: &str, chain: Chain) -> bool {
    let hex = query
        .strip_prefix("0x")
        .or_else(|| query.strip_prefix("0X"))
        .unwrap_or(query);
    if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return true;
    }
    chain == Chain::Solana && (80..=90).contains(&query.len())
}

// ---------------------------------------------------------------------------
// Projection builder
// ---------------------------------------------------------------------------

/// What `Projection::add_transfer` did with a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Insertion {
    /// A new edge was recorded.
    New,
    /// The edge was already present.
    Duplicate,
    /// The node cap left no room for its endpoints.
    Rejected,
}

/// Accumulates a bounded, de-duplicated node/edge set.
struct Projection {
    chain: Chain,
    limit: usize,
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    edges: Vec<GraphEdge>,
    edge_keys: HashSet<(String, String, String)>,
    truncated: bool,
    partial: bool,
}

impl Projection {
    fn new(chain: Chain, limit: usize) -> Self {
        Self {
            chain,
            limit,
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            edge_keys: HashSet::new(),
            truncated: false,
            partial: false,
        }
    }

    fn contains(&self, address: &str) -> bool {
        self.index.contains_key(&address.to_lowercase())
    }

    /// Add a node unless the cap is reached. Returns whether it is present.
    fn add_node(&mut self, address: &str) -> bool {
        let key = address.to_lowercase();
        if self.index.contains_key(&key) {
            return true;
        }
        if self.nodes.len() >= self.limit {
            self.truncated = true;
            return false;
        }
        self.index.insert(key, self.nodes.len());
        self.nodes.push(GraphNode::bare(address, self.chain));
        true
    }

    /// Add a transfer and both endpoints, all or nothing.
    fn add_transfer(&mut self, record: &TransferRecord, edge_type: EdgeType) -> Insertion {
        let new_nodes = [&record.from_address, &record.to_address]
            .iter()
            .filter(|a| !self.contains(a))
            .map(|a| a.to_lowercase())
            .collect::<HashSet<_>>()
            .len();
        if self.nodes.len() + new_nodes > self.limit {
            self.truncated = true;
            return Insertion::Rejected;
        }

        self.add_node(&record.from_address);
        self.add_node(&record.to_address);

        let key = (
            record.tx_hash.to_lowercase(),
            record.from_address.to_lowercase(),
            record.to_address.to_lowercase(),
        );
        if !self.edge_keys.insert(key) {
            return Insertion::Duplicate;
        }
        self.edges.push(GraphEdge {
            from_address: record.from_address.clone(),
            to_address: record.to_address.clone(),
            chain: self.chain,
            tx_hash: record.tx_hash.clone(),
            value: record.value,
            timestamp: record.timestamp,
            edge_type,
        });
        Insertion::New
    }

    fn finish(self, seed: String, query_type: Option<String>, depth: u32) -> GraphResponse {
        let mut edge_type_counts = BTreeMap::new();
        for edge in &self.edges {
            *edge_type_counts.entry(edge.edge_type).or_insert(0) += 1;
        }

        let metadata = GraphMetadata {
            seed,
            chain: self.chain,
            query_type,
            depth,
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            truncated: self.truncated,
            partial: self.partial,
            edge_type_counts,
            generated_at: Utc::now(),
        };

        GraphResponse {
            nodes: self.nodes,
            edges: self.edges,
            metadata,
            success: true,
        }
    }
}

/// Outcome of the per-node enrichment calls.
#[derive(Default)]
struct NodeEnrichment {
    record: Option<AddressRecord>,
    sanctions: Option<SanctionsStatus>,
    labels: Vec<String>,
    failures: usize,
    sanctions_failed: bool,
}

fn apply_record(node: &mut GraphNode, record: &AddressRecord) {
    node.balance = record.balance;
    node.tx_count = record.tx_count;
    node.first_seen = record.first_seen;
    node.last_seen = record.last_seen;
    node.risk_score = record.risk_score;
}

async fn within<T, F>(timeout: Duration, fut: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| anyhow!("timed out after {}s", timeout.as_secs_f64()))?
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// An address summary plus whether the sanctions service answered.
#[derive(Debug, Clone)]
pub struct AddressSummary {
    pub node: GraphNode,
    /// False when the sanctions lookup failed or timed out; the node's
    /// `sanctions_status` is then unknown rather than clear.
    pub sanctions_screened: bool,
}

pub struct GraphEngine {
    store: Arc<dyn GraphStore>,
    enricher: Arc<dyn EntityEnricher>,
    known: KnownAddressCache,
    config: GraphConfig,
}

impl GraphEngine {
    pub fn new(
        store: Arc<dyn GraphStore>,
        enricher: Arc<dyn EntityEnricher>,
        known_addresses: Arc<dyn KnownAddressSource>,
        config: GraphConfig,
    ) -> Self {
        Self {
            store,
            enricher,
            known: KnownAddressCache::new(known_addresses),
            config,
        }
    }

    /// Engine whose bridge / mixer lists come from `config.known_addresses_path`.
    pub fn from_config(
        store: Arc<dyn GraphStore>,
        enricher: Arc<dyn EntityEnricher>,
        config: GraphConfig,
    ) -> Self {
        let known = source_from_config(&config);
        Self::new(store, enricher, known, config)
    }

    /// The engine's bridge / mixer cache (for `refresh` / `invalidate`).
    pub fn known_addresses(&self) -> &KnownAddressCache {
        &self.known
    }

    /// Classify one edge: bridge > mixer > dex > transfer.
    pub fn classify_edge(&self, from_address: &str, to_address: &str) -> EdgeType {
        self.known.classify(from_address, to_address)
    }

    // -- expand -----------------------------------------------------------

    /// Breadth-first expansion around `req.address`, bounded by depth and
    /// node limit (and by the hard caps regardless of configuration).
    pub async fn expand(&self, req: &ExpandRequest) -> Result<GraphResponse, ComplianceError> {
        req.validate()?;

        let chain = req.chain;
        let depth = req.depth.min(self.config.effective_max_depth());
        let limit = req.limit.min(self.config.effective_max_nodes());
        let sets = self.known.snapshot();

        let mut proj = Projection::new(chain, limit);
        proj.add_node(&req.address);

        let mut visited = HashSet::from([req.address.to_lowercase()]);
        let mut frontier = vec![req.address.clone()];
        let mut reached = 0;

        for hop in 1..=depth {
            if frontier.is_empty() || proj.truncated {
                break;
            }

            let results = self
                .fetch_neighbors(&frontier, chain, req.direction, limit)
                .await;

            let mut next = Vec::new();
            let mut grew = false;
            for (address, result) in frontier.iter().zip(results) {
                let records = match result {
                    Ok(records) => records,
                    Err(e) => {
                        warn!(address = %address, chain = %chain, hop, error = %e, "Neighbour query failed");
                        proj.partial = true;
                        continue;
                    }
                };

                for record in records {
                    let edge_type = classify_with(&sets, &record.from_address, &record.to_address);
                    match proj.add_transfer(&record, edge_type) {
                        Insertion::Rejected => continue,
                        Insertion::New => grew = true,
                        Insertion::Duplicate => {}
                    }
                    for endpoint in [&record.from_address, &record.to_address] {
                        if visited.insert(endpoint.to_lowercase()) {
                            next.push(endpoint.clone());
                        }
                    }
                }
            }

            if grew {
                reached = hop;
            }
            frontier = next;
        }

        self.enrich_nodes(&mut proj.nodes).await;
        let resp = proj.finish(
            req.address.clone(),
            Some(req.direction.as_str().to_string()),
            reached,
        );

        info!(
            address = %req.address,
            chain = %chain,
            nodes = resp.metadata.node_count,
            edges = resp.metadata.edge_count,
            depth = reached,
            truncated = resp.metadata.truncated,
            "Graph expanded"
        );
        Ok(resp)
    }

    async fn fetch_neighbors(
        &self,
        addresses: &[String],
        chain: Chain,
        direction: Direction,
        limit: usize,
    ) -> Vec<anyhow::Result<Vec<TransferRecord>>> {
        let timeout = self.config.store_timeout();
        stream::iter(addresses.iter().map(|address| {
            within(timeout, self.store.neighbors(address, chain, direction, limit))
        }))
        .buffered(FAN_OUT)
        .collect()
        .await
    }

    // -- search -----------------------------------------------------------

    /// Resolve `query` as an address or transaction hash and return the
    /// one-hop projection around it. Zero matching entities is `NotFound`.
    pub async fn search(
        &self,
        query: &str,
        query_type: SearchType,
        chain: Chain,
    ) -> Result<GraphResponse, ComplianceError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ComplianceError::Validation("search query must not be empty".into()));
        }

        match query_type.resolve(query, chain) {
            SearchType::Transaction => self.search_transaction(query, chain).await,
            _ => self.search_address(query, chain).await,
        }
    }

    async fn search_transaction(
        &self,
        tx_hash: &str,
        chain: Chain,
    ) -> Result<GraphResponse, ComplianceError> {
        let records = within(self.config.store_timeout(), self.store.transaction(tx_hash, chain))
            .await
            .unwrap_or_else(|e| {
                warn!(tx_hash, chain = %chain, error = %e, "Transaction lookup failed");
                Vec::new()
            });

        if records.is_empty() {
            return Err(ComplianceError::not_found("transaction", tx_hash));
        }

        let sets = self.known.snapshot();
        let mut proj = Projection::new(chain, self.config.effective_max_nodes());
        for record in &records {
            proj.add_transfer(record, classify_with(&sets, &record.from_address, &record.to_address));
        }

        self.enrich_nodes(&mut proj.nodes).await;
        Ok(proj.finish(tx_hash.to_string(), Some("transaction".to_string()), 1))
    }

    async fn search_address(
        &self,
        address: &str,
        chain: Chain,
    ) -> Result<GraphResponse, ComplianceError> {
        validate_address(address)?;

        let limit = self.config.effective_max_nodes();
        let timeout = self.config.store_timeout();
        let (record, neighbors) = tokio::join!(
            within(timeout, self.store.address(address, chain)),
            within(timeout, self.store.neighbors(address, chain, Direction::Both, limit)),
        );

        let mut partial = false;
        let record = record.unwrap_or_else(|e| {
            warn!(address, chain = %chain, error = %e, "Address lookup failed");
            partial = true;
            None
        });
        let neighbors = neighbors.unwrap_or_else(|e| {
            warn!(address, chain = %chain, error = %e, "Neighbour query failed");
            partial = true;
            Vec::new()
        });

        if record.is_none() && neighbors.is_empty() {
            return Err(ComplianceError::not_found("address", address));
        }

        let sets = self.known.snapshot();
        let mut proj = Projection::new(chain, limit);
        proj.partial = partial;
        proj.add_node(address);
        for record in &neighbors {
            proj.add_transfer(record, classify_with(&sets, &record.from_address, &record.to_address));
        }

        let depth = if proj.edges.is_empty() { 0 } else { 1 };
        self.enrich_nodes(&mut proj.nodes).await;
        Ok(proj.finish(address.to_string(), Some("address".to_string()), depth))
    }

    // -- cluster ----------------------------------------------------------

    /// Combine a seed set into one projection using the given heuristic.
    pub async fn cluster(
        &self,
        addresses: &[String],
        chain: Chain,
        cluster_type: ClusterType,
    ) -> Result<GraphResponse, ComplianceError> {
        let mut seen = HashSet::new();
        let seeds: Vec<String> = addresses
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| seen.insert(a.to_lowercase()))
            .collect();

        if seeds.is_empty() {
            return Err(ComplianceError::Validation("cluster requires at least one address".into()));
        }
        for seed in &seeds {
            validate_address(seed)?;
        }

        let limit = self.config.effective_max_nodes();
        if seeds.len() > limit {
            return Err(ComplianceError::Validation(format!(
                "cluster accepts at most {limit} addresses, got {}",
                seeds.len()
            )));
        }

        let results = self.fetch_neighbors(&seeds, chain, Direction::Both, limit).await;

        let mut proj = Projection::new(chain, limit);
        for seed in &seeds {
            proj.add_node(seed);
        }

        let mut per_seed: Vec<Vec<TransferRecord>> = Vec::with_capacity(seeds.len());
        for (seed, result) in seeds.iter().zip(results) {
            match result {
                Ok(records) => per_seed.push(records),
                Err(e) => {
                    warn!(address = %seed, chain = %chain, error = %e, "Neighbour query failed");
                    proj.partial = true;
                    per_seed.push(Vec::new());
                }
            }
        }

        let seed_keys: HashSet<String> = seeds.iter().map(|s| s.to_lowercase()).collect();
        let members: HashSet<String> = match cluster_type {
            ClusterType::DirectTransfer => seed_keys.clone(),
            ClusterType::CommonCounterparty => {
                let shared = shared_counterparties(&per_seed, &seed_keys);
                debug!(shared = shared.len(), "Shared counterparties found");
                seed_keys.union(&shared).cloned().collect()
            }
        };

        let sets = self.known.snapshot();
        for record in per_seed.iter().flatten() {
            let from = record.from_address.to_lowercase();
            let to = record.to_address.to_lowercase();
            if members.contains(&from) && members.contains(&to) {
                proj.add_transfer(record, classify_with(&sets, &record.from_address, &record.to_address));
            }
        }

        self.enrich_nodes(&mut proj.nodes).await;
        let resp = proj.finish(seeds.join(","), Some(cluster_type.as_str().to_string()), 1);

        info!(
            seeds = seeds.len(),
            chain = %chain,
            cluster_type = cluster_type.as_str(),
            nodes = resp.metadata.node_count,
            edges = resp.metadata.edge_count,
            "Cluster built"
        );
        Ok(resp)
    }

    // -- summary ----------------------------------------------------------

    /// Aggregate node metadata without edge expansion.
    pub async fn summary(&self, address: &str, chain: Chain) -> Result<GraphNode, ComplianceError> {
        self.screened_summary(address, chain).await.map(|s| s.node)
    }

    /// Like [`summary`](Self::summary), but also reports whether the
    /// sanctions screen could be run.
    ///
    /// An address the store does not know is `NotFound`; a store that
    /// fails or times out is an `Engine` error.
    pub async fn screened_summary(
        &self,
        address: &str,
        chain: Chain,
    ) -> Result<AddressSummary, ComplianceError> {
        validate_address(address)?;

        let (record, screening) = tokio::join!(
            within(self.config.store_timeout(), self.store.address(address, chain)),
            self.screen(address, chain),
        );

        let record = match record {
            Ok(Some(record)) => record,
            Ok(None) => return Err(ComplianceError::not_found("address", address)),
            Err(e) => {
                warn!(address, chain = %chain, error = %e, "Address lookup failed");
                return Err(ComplianceError::Engine {
                    engine: "graph_store".into(),
                    message: e.to_string(),
                });
            }
        };

        let mut node = GraphNode::bare(address, chain);
        apply_record(&mut node, &record);
        node.sanctions_status = screening.sanctions;
        node.labels = screening.labels;
        Ok(AddressSummary {
            node,
            sanctions_screened: !screening.sanctions_failed,
        })
    }

    // -- enrichment -------------------------------------------------------

    async fn enrich_nodes(&self, nodes: &mut [GraphNode]) {
        if nodes.is_empty() {
            return;
        }

        let enrichments: Vec<NodeEnrichment> = stream::iter(
            nodes
                .iter()
                .map(|n| self.enrich_one(n.address.clone(), n.chain)),
        )
        .buffered(FAN_OUT)
        .collect()
        .await;

        let mut failures = 0;
        for (node, enrichment) in nodes.iter_mut().zip(enrichments) {
            failures += enrichment.failures;
            if let Some(record) = &enrichment.record {
                apply_record(node, record);
            }
            node.sanctions_status = enrichment.sanctions;
            node.labels = enrichment.labels;
        }

        if failures > 0 {
            warn!(nodes = nodes.len(), failures, "Some node enrichment calls failed");
        }
    }

    async fn enrich_one(&self, address: String, chain: Chain) -> NodeEnrichment {
        let (record, screening) = tokio::join!(
            within(self.config.enrichment_timeout(), self.store.address(&address, chain)),
            self.screen(&address, chain),
        );

        let mut enrichment = screening;
        match record {
            Ok(record) => enrichment.record = record,
            Err(e) => {
                debug!(address = %address, error = %e, "Address metadata unavailable");
                enrichment.failures += 1;
            }
        }
        enrichment
    }

    /// Sanctions status and labels for one address.
    async fn screen(&self, address: &str, chain: Chain) -> NodeEnrichment {
        let timeout = self.config.enrichment_timeout();
        let (sanctions, labels) = tokio::join!(
            within(timeout, self.enricher.sanctions_status(address, chain)),
            within(timeout, self.enricher.labels(address, chain)),
        );

        let mut enrichment = NodeEnrichment::default();
        match sanctions {
            Ok(status) => enrichment.sanctions = status,
            Err(e) => {
                debug!(address, error = %e, "Sanctions lookup unavailable");
                enrichment.failures += 1;
                enrichment.sanctions_failed = true;
            }
        }
        match labels {
            Ok(labels) => enrichment.labels = labels,
            Err(e) => {
                debug!(address, error = %e, "Label lookup unavailable");
                enrichment.failures += 1;
            }
        }
        enrichment
    }
}

/// Non-seed counterparties that transact with at least two seeds.
fn shared_counterparties(
    per_seed: &[Vec<TransferRecord>],
    seed_keys: &HashSet<String>,
) -> HashSet<String> {
    let mut touches: HashMap<String, HashSet<usize>> = HashMap::new();
    for (i, records) in per_seed.iter().enumerate() {
        for record in records {
            for endpoint in [&record.from_address, &record.to_address] {
                let key = endpoint.to_lowercase();
                if !seed_keys.contains(&key) {
                    touches.entry(key).or_default().insert(i);
                }
            }
        }
    }
    touches
        .into_iter()
        .filter(|(_, seeds)| seeds.len() >= 2)
        .map(|(key, _)| key)
        .collect()
}
