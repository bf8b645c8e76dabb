//! Graph engine against the in-memory store.

use std::sync::Arc;

use chainwatch::config::GraphConfig;
use chainwatch::graph::known::{FileAddressSource, KnownAddressFile, StaticAddressSource};
use chainwatch::graph::{ClusterType, GraphEngine, SearchType};
use chainwatch::types::{
    Chain, ComplianceError, Direction, EdgeType, ExpandRequest, SanctionsStatus, MAX_DEPTH,
    MAX_GRAPH_NODES,
};

use crate::mocks::{MemoryEnricher, MemoryGraphStore};

const BRIDGE: &str = "0x8315177ab297ba92a06054ce80a67ed4dbd7ed3a";
const MIXER: &str = "0x910cbd523d972eb0a6f4cae4618ad62622b39dbf";

fn engine_with(store: MemoryGraphStore, enricher: MemoryEnricher, config: GraphConfig) -> (GraphEngine, Arc<MemoryGraphStore>) {
    let store = Arc::new(store);
    let engine = GraphEngine::new(
        store.clone(),
        Arc::new(enricher),
        Arc::new(StaticAddressSource::from_lists(&[BRIDGE], &[MIXER])),
        config,
    );
    (engine, store)
}

fn engine(store: MemoryGraphStore) -> GraphEngine {
    engine_with(store, MemoryEnricher::new(), GraphConfig::default()).0
}

fn request(address: &str, depth: u32, limit: usize) -> ExpandRequest {
    ExpandRequest {
        depth,
        limit,
        ..ExpandRequest::new(address, Chain::Ethereum)
    }
}

// -- expand -----------------------------------------------------------------

#[tokio::test]
async fn test_expand_follows_path_to_depth() {
    let engine = engine(MemoryGraphStore::path(10));
    let resp = engine.expand(&request("0xn0", 3, 100)).await.unwrap();

    assert!(resp.success);
    assert_eq!(resp.nodes.len(), 4);
    assert_eq!(resp.edges.len(), 3);
    assert_eq!(resp.metadata.depth, 3);
    assert!(!resp.metadata.truncated);
    assert!(resp.node("0xN3").is_some());
    assert!(resp.node("0xn4").is_none());
}

#[tokio::test]
async fn test_expand_depth_is_last_hop_with_new_edges() {
    let engine = engine(MemoryGraphStore::path(2));
    let resp = engine.expand(&request("0xn0", MAX_DEPTH, 100)).await.unwrap();

    assert_eq!(resp.nodes.len(), 3);
    assert_eq!(resp.edges.len(), 2);
    assert_eq!(resp.metadata.depth, 2);

    let hub = self::engine(MemoryGraphStore::star("0xhub", 3));
    let resp = hub.expand(&request("0xhub", MAX_DEPTH, 100)).await.unwrap();
    assert_eq!(resp.edges.len(), 3);
    assert_eq!(resp.metadata.depth, 1);
}

#[tokio::test]
async fn test_expand_never_exceeds_max_depth() {
    let (engine, store) = engine_with(MemoryGraphStore::path(20), MemoryEnricher::new(), GraphConfig::default());
    let resp = engine.expand(&request("0xn0", MAX_DEPTH, 500)).await.unwrap();

    assert_eq!(resp.metadata.depth, MAX_DEPTH);
    assert_eq!(resp.nodes.len(), MAX_DEPTH as usize + 1);
    assert!(store.neighbor_calls() <= MAX_DEPTH as usize);

    let err = engine.expand(&request("0xn0", MAX_DEPTH + 1, 10)).await.unwrap_err();
    assert!(matches!(err, ComplianceError::Validation(_)));
}

#[tokio::test]
async fn test_expand_caps_nodes() {
    let engine = engine(MemoryGraphStore::star("0xhub", 800));
    let resp = engine.expand(&request("0xhub", 2, MAX_GRAPH_NODES)).await.unwrap();

    assert_eq!(resp.nodes.len(), MAX_GRAPH_NODES);
    assert!(resp.metadata.truncated);
    assert_eq!(resp.metadata.node_count, resp.nodes.len());

    let err = engine.expand(&request("0xhub", 1, MAX_GRAPH_NODES + 1)).await.unwrap_err();
    assert!(matches!(err, ComplianceError::Validation(_)));
}

#[tokio::test]
async fn test_expand_honours_configured_cap() {
    let config = GraphConfig {
        max_nodes: 25,
        ..GraphConfig::default()
    };
    let (engine, _) = engine_with(MemoryGraphStore::star("0xhub", 100), MemoryEnricher::new(), config);
    let resp = engine.expand(&request("0xhub", 1, 100)).await.unwrap();
    assert_eq!(resp.nodes.len(), 25);
    assert!(resp.metadata.truncated);
}

#[tokio::test]
async fn test_expand_direction() {
    let store = MemoryGraphStore::new()
        .transfer("0xa", "0xseed", "0x1", 1.0)
        .transfer("0xseed", "0xb", "0x2", 1.0);
    let engine = engine(store);

    let mut req = request("0xseed", 1, 10);
    req.direction = Direction::In;
    let resp = engine.expand(&req).await.unwrap();
    assert!(resp.node("0xa").is_some());
    assert!(resp.node("0xb").is_none());
    assert_eq!(resp.metadata.query_type.as_deref(), Some("in"));
}

#[tokio::test]
async fn test_expand_classifies_edges() {
    let store = MemoryGraphStore::new()
        .transfer("0xseed", &BRIDGE.to_uppercase().replace("0X", "0x"), "0x1", 5.0)
        .transfer("0xseed", MIXER, "0x2", 1.0)
        .transfer("0xseed", "UniswapV3Router", "0x3", 2.0)
        .transfer("0xseed", "0xfriend", "0x4", 3.0);
    let engine = engine(store);
    let resp = engine.expand(&request("0xseed", 1, 10)).await.unwrap();

    let counts = &resp.metadata.edge_type_counts;
    assert_eq!(counts[&EdgeType::Bridge], 1);
    assert_eq!(counts[&EdgeType::Mixer], 1);
    assert_eq!(counts[&EdgeType::Dex], 1);
    assert_eq!(counts[&EdgeType::Transfer], 1);

    let bridge_edge = resp.edges.iter().find(|e| e.tx_hash == "0x1").unwrap();
    assert_eq!(bridge_edge.edge_type, EdgeType::Bridge);
}

#[tokio::test]
async fn test_expand_store_failure_marks_partial() {
    let (engine, store) = engine_with(MemoryGraphStore::path(5), MemoryEnricher::new(), GraphConfig::default());
    store.fail_neighbors_of("0xn1");

    let resp = engine.expand(&request("0xn0", 4, 100)).await.unwrap();
    assert!(resp.success);
    assert!(resp.metadata.partial);
    assert_eq!(resp.nodes.len(), 2);
}

#[tokio::test]
async fn test_expand_enriches_nodes() {
    let store = MemoryGraphStore::new()
        .transfer("0xseed", "0xbad", "0x1", 1.0)
        .record("0xseed", 12.5, 40, None);
    let enricher = MemoryEnricher::new()
        .sanction("0xBAD")
        .label("0xseed", "exchange");
    let (engine, _) = engine_with(store, enricher, GraphConfig::default());

    let resp = engine.expand(&request("0xseed", 1, 10)).await.unwrap();
    let seed = resp.node("0xseed").unwrap();
    assert_eq!(seed.balance, Some(12.5));
    assert_eq!(seed.tx_count, Some(40));
    assert_eq!(seed.labels, vec!["exchange".to_string()]);
    assert_eq!(seed.sanctions_status, Some(SanctionsStatus::Clear));
    assert!(resp.node("0xbad").unwrap().is_sanctioned());
}

#[tokio::test]
async fn test_enrichment_failure_leaves_fields_empty() {
    let store = MemoryGraphStore::new().transfer("0xseed", "0xother", "0x1", 1.0);
    let (engine, _) = engine_with(store, MemoryEnricher::broken(), GraphConfig::default());

    let resp = engine.expand(&request("0xseed", 1, 10)).await.unwrap();
    assert!(resp.success);
    for node in &resp.nodes {
        assert!(node.labels.is_empty());
        assert!(node.sanctions_status.is_none());
    }
}

// -- search -----------------------------------------------------------------

#[tokio::test]
async fn test_search_address() {
    let store = MemoryGraphStore::new()
        .transfer("0xa", "0xseed", "0x1", 1.0)
        .transfer("0xseed", "0xb", "0x2", 1.0)
        .transfer("0xb", "0xc", "0x3", 1.0);
    let engine = engine(store);

    let resp = engine.search("0xSEED", SearchType::Auto, Chain::Ethereum).await.unwrap();
    assert_eq!(resp.nodes.len(), 3);
    assert_eq!(resp.edges.len(), 2);
    assert_eq!(resp.metadata.query_type.as_deref(), Some("address"));
}

#[tokio::test]
async fn test_search_transaction_auto_detected() {
    let hash = format!("0x{}", "ab".repeat(32));
    let store = MemoryGraphStore::new().transfer("0xa", "0xb", &hash, 9.0);
    let engine = engine(store);

    let resp = engine
        .search(&hash.to_uppercase().replace("0X", "0x"), SearchType::Auto, Chain::Ethereum)
        .await
        .unwrap();
    assert_eq!(resp.edges.len(), 1);
    assert_eq!(resp.edges[0].value, 9.0);
    assert_eq!(resp.metadata.query_type.as_deref(), Some("transaction"));
}

#[tokio::test]
async fn test_search_not_found() {
    let engine = engine(MemoryGraphStore::path(3));

    let err = engine
        .search("0xnobody", SearchType::Address, Chain::Ethereum)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = engine
        .search(&"f".repeat(64), SearchType::Auto, Chain::Ethereum)
        .await
        .unwrap_err();
    assert_eq!(err, ComplianceError::not_found("transaction", &"f".repeat(64)));

    let err = engine.search("  ", SearchType::Auto, Chain::Ethereum).await.unwrap_err();
    assert!(matches!(err, ComplianceError::Validation(_)));
}

#[tokio::test]
async fn test_search_known_address_without_transfers() {
    let engine = engine(MemoryGraphStore::new().record("0xdormant", 1.0, 1, None));
    let resp = engine.search("0xdormant", SearchType::Address, Chain::Ethereum).await.unwrap();
    assert_eq!(resp.nodes.len(), 1);
    assert!(resp.edges.is_empty());
    assert_eq!(resp.metadata.depth, 0);
}

// -- cluster ----------------------------------------------------------------

fn cluster_store() -> MemoryGraphStore {
    MemoryGraphStore::new()
        .transfer("0xs1", "0xhub", "0x1", 1.0)
        .transfer("0xhub", "0xs2", "0x2", 1.0)
        .transfer("0xs1", "0xlonely", "0x3", 1.0)
        .transfer("0xs2", "0xs1", "0x4", 1.0)
}

#[tokio::test]
async fn test_cluster_common_counterparty() {
    let engine = engine(cluster_store());
    let seeds = vec!["0xs1".to_string(), "0xs2".to_string()];
    let resp = engine
        .cluster(&seeds, Chain::Ethereum, ClusterType::CommonCounterparty)
        .await
        .unwrap();

    assert!(resp.node("0xhub").is_some());
    assert!(resp.node("0xlonely").is_none());
    assert_eq!(resp.nodes.len(), 3);
    // 0x4 is seen from both seeds but kept once
    assert_eq!(resp.edges.len(), 3);
    assert_eq!(resp.metadata.query_type.as_deref(), Some("common_counterparty"));
}

#[tokio::test]
async fn test_cluster_direct_transfer() {
    let engine = engine(cluster_store());
    let seeds = vec!["0xs1".to_string(), "0xS2".to_string(), "0xs1".to_string()];
    let resp = engine
        .cluster(&seeds, Chain::Ethereum, ClusterType::DirectTransfer)
        .await
        .unwrap();

    assert_eq!(resp.nodes.len(), 2);
    assert_eq!(resp.edges.len(), 1);
    assert_eq!(resp.edges[0].tx_hash, "0x4");
}

#[tokio::test]
async fn test_cluster_rejects_empty_seed_set() {
    let engine = engine(cluster_store());
    let err = engine
        .cluster(&[], Chain::Ethereum, ClusterType::DirectTransfer)
        .await
        .unwrap_err();
    assert!(matches!(err, ComplianceError::Validation(_)));
}

// -- summary ----------------------------------------------------------------

#[tokio::test]
async fn test_summary() {
    let store = MemoryGraphStore::new().record("0xseed", 3.0, 7, Some(0.4));
    let enricher = MemoryEnricher::new().label("0xseed", "mining_pool");
    let (engine, store) = engine_with(store, enricher, GraphConfig::default());

    let node = engine.summary("0xSeed", Chain::Ethereum).await.unwrap();
    assert_eq!(node.balance, Some(3.0));
    assert_eq!(node.tx_count, Some(7));
    assert_eq!(node.risk_score, Some(0.4));
    assert_eq!(node.labels, vec!["mining_pool".to_string()]);
    assert_eq!(store.neighbor_calls(), 0);

    let err = engine.summary("0xmissing", Chain::Ethereum).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_summary_store_outage_is_engine_error() {
    let store = MemoryGraphStore::new().record("0xseed", 3.0, 7, None).fail_records();
    let (engine, _) = engine_with(store, MemoryEnricher::new(), GraphConfig::default());

    let err = engine.summary("0xseed", Chain::Ethereum).await.unwrap_err();
    assert!(!err.is_not_found());
    assert!(matches!(err, ComplianceError::Engine { ref engine, .. } if engine == "graph_store"));
}

#[tokio::test]
async fn test_screened_summary_reports_sanctions_outage() {
    let store = MemoryGraphStore::new().record("0xseed", 3.0, 7, None);
    let (engine, _) = engine_with(store, MemoryEnricher::broken(), GraphConfig::default());

    let summary = engine.screened_summary("0xseed", Chain::Ethereum).await.unwrap();
    assert!(!summary.sanctions_screened);
    assert_eq!(summary.node.sanctions_status, None);
    assert_eq!(summary.node.balance, Some(3.0));

    let (engine, _) = engine_with(
        MemoryGraphStore::new().record("0xseed", 3.0, 7, None),
        MemoryEnricher::new(),
        GraphConfig::default(),
    );
    let summary = engine.screened_summary("0xseed", Chain::Ethereum).await.unwrap();
    assert!(summary.sanctions_screened);
    assert_eq!(summary.node.sanctions_status, Some(SanctionsStatus::Clear));
}

// -- known-address cache ----------------------------------------------------

#[tokio::test]
async fn test_known_address_cache_lifecycle() {
    let engine = engine(MemoryGraphStore::new());
    let cache = engine.known_addresses();
    assert!(!cache.is_loaded());

    assert_eq!(engine.classify_edge(BRIDGE, MIXER), EdgeType::Bridge);
    assert!(cache.is_loaded());

    cache.invalidate();
    assert!(!cache.is_loaded());
    cache.refresh().unwrap();
    assert_eq!(engine.classify_edge("", ""), EdgeType::Transfer);
}

#[tokio::test]
async fn test_engine_from_config_reads_list_file() {
    let path = std::env::temp_dir().join(format!("chainwatch_lists_{}.json", uuid::Uuid::new_v4()));
    FileAddressSource::new(&path)
        .save(&KnownAddressFile {
            bridges: vec!["0xCorpBridge".into()],
            mixers: vec!["0xcorpmixer".into()],
        })
        .unwrap();

    let config = GraphConfig {
        known_addresses_path: Some(path.display().to_string()),
        ..GraphConfig::default()
    };
    let engine = GraphEngine::from_config(
        Arc::new(MemoryGraphStore::new()),
        Arc::new(MemoryEnricher::new()),
        config,
    );
    assert_eq!(engine.classify_edge("0xcorpbridge", "0xa"), EdgeType::Bridge);
    assert_eq!(engine.classify_edge("0xa", "0xCORPMIXER"), EdgeType::Mixer);
    // Built-in lists are replaced, not merged.
    assert_eq!(engine.classify_edge(BRIDGE, "0xa"), EdgeType::Transfer);

    let builtin = GraphEngine::from_config(
        Arc::new(MemoryGraphStore::new()),
        Arc::new(MemoryEnricher::new()),
        GraphConfig::default(),
    );
    assert_eq!(builtin.classify_edge(MIXER, "0xa"), EdgeType::Mixer);

    std::fs::remove_file(&path).unwrap();
}
