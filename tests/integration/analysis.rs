//! Analysis orchestrator with the graph engine wired in.

use std::sync::Arc;

use chainwatch::config::{AnalysisConfig, GraphConfig};
use chainwatch::engine::{AnalysisOrchestrator, AnalysisRequest, MixerVerdict};
use chainwatch::graph::known::StaticAddressSource;
use chainwatch::graph::GraphEngine;
use chainwatch::types::{Chain, PatternMatch, RiskLevel};

use crate::mocks::{FixedCrossChain, FixedMixer, FixedPatterns, MemoryEnricher, MemoryGraphStore};

fn graph(store: MemoryGraphStore, enricher: MemoryEnricher) -> Arc<GraphEngine> {
    Arc::new(GraphEngine::new(
        Arc::new(store),
        Arc::new(enricher),
        Arc::new(StaticAddressSource::builtin()),
        GraphConfig::default(),
    ))
}

fn orchestrator(
    patterns: Option<Vec<PatternMatch>>,
    mixer: Option<MixerVerdict>,
) -> AnalysisOrchestrator {
    AnalysisOrchestrator::new(
        Arc::new(FixedPatterns(patterns)),
        Arc::new(FixedMixer(mixer)),
        Arc::new(FixedCrossChain(None)),
        AnalysisConfig {
            detector_timeout_secs: 2,
            graph_timeout_secs: 2,
        },
    )
}

#[tokio::test]
async fn test_total_failure_still_returns_result() {
    let orch = orchestrator(None, None)
        .with_graph(graph(MemoryGraphStore::new(), MemoryEnricher::broken()));

    let result = orch
        .analyze(&AnalysisRequest::address("0xunknown", Chain::Polygon))
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.detected_patterns.is_empty());
    assert!(!result.mixer_detected);
    assert!(result.cross_chain_flags.is_empty());
    assert_eq!(result.risk_score, 0.0);
    assert_eq!(result.chain, Chain::Polygon);

    let json = serde_json::to_value(&result).unwrap();
    for key in ["address", "chain", "detected_patterns", "mixer_detected", "risk_score", "cross_chain_flags", "success"] {
        assert!(json.get(key).is_some(), "missing {key}");
    }
}

#[tokio::test]
async fn test_sanctioned_address_scores_high() {
    let store = MemoryGraphStore::new().record("0xbad", 100.0, 12, None);
    let enricher = MemoryEnricher::new().sanction("0xbad");
    let orch = orchestrator(Some(vec![PatternMatch::with_risk("peel_chain", 0.5)]), None)
        .with_graph(graph(store, enricher));

    let result = orch
        .analyze(&AnalysisRequest::address("0xBAD", Chain::Ethereum))
        .await
        .unwrap();

    // 0.5 sanctions + 0.15 patterns
    assert_eq!(result.risk_score, 0.65);
    assert_eq!(result.risk_level, RiskLevel::High);
    assert_eq!(result.degraded_signals, vec!["mixer_detection", "cross_chain_correlation"]);
}

#[tokio::test]
async fn test_persisted_score_is_floor() {
    let store = MemoryGraphStore::new().record("0xwatched", 1.0, 1, Some(0.9));
    let orch = orchestrator(
        Some(Vec::new()),
        Some(MixerVerdict {
            detected: true,
            risk: 0.4,
            mixers: Vec::new(),
        }),
    )
    .with_graph(graph(store, MemoryEnricher::new()));

    let mut req = AnalysisRequest::address("0xwatched", Chain::Ethereum);
    req.base_score = 0.2;
    let result = orch.analyze(&req).await.unwrap();

    assert_eq!(result.risk_score, 0.9);
    assert_eq!(result.risk_level, RiskLevel::Critical);
    assert!(result.mixer_detected);
}

#[tokio::test]
async fn test_transaction_target_skips_graph_summary() {
    let orch = orchestrator(Some(vec![PatternMatch::with_risk("structuring", 1.0)]), None)
        .with_graph(graph(MemoryGraphStore::new(), MemoryEnricher::broken()));

    let hash = "0x".to_string() + &"1".repeat(64);
    let result = orch
        .analyze(&AnalysisRequest::transaction(&hash, Chain::Arbitrum))
        .await
        .unwrap();

    assert_eq!(result.tx_hash.as_deref(), Some(hash.as_str()));
    assert_eq!(result.risk_score, 0.3);
    assert!(!result.degraded_signals.contains(&"graph_summary".to_string()));
}

#[tokio::test]
async fn test_store_outage_degrades_graph_summary() {
    let store = MemoryGraphStore::new()
        .record("0xwatched", 1.0, 1, Some(0.9))
        .fail_records();
    let orch = orchestrator(Some(Vec::new()), Some(MixerVerdict::default()))
        .with_graph(graph(store, MemoryEnricher::new()));

    let result = orch
        .analyze(&AnalysisRequest::address("0xwatched", Chain::Ethereum))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.risk_score, 0.0);
    assert_eq!(result.degraded_signals, vec!["cross_chain_correlation", "graph_summary"]);
}

#[tokio::test]
async fn test_sanctions_outage_degrades_graph_summary_but_keeps_floor() {
    let store = MemoryGraphStore::new().record("0xbad", 100.0, 12, Some(0.4));
    let orch = orchestrator(Some(Vec::new()), Some(MixerVerdict::default()))
        .with_graph(graph(store, MemoryEnricher::broken()));

    let result = orch
        .analyze(&AnalysisRequest::address("0xbad", Chain::Ethereum))
        .await
        .unwrap();

    assert_eq!(result.risk_score, 0.4);
    assert!(result.degraded_signals.contains(&"graph_summary".to_string()));
}

#[tokio::test]
async fn test_unknown_address_is_not_degraded() {
    let orch = orchestrator(Some(Vec::new()), Some(MixerVerdict::default()))
        .with_graph(graph(MemoryGraphStore::new(), MemoryEnricher::new()));

    let result = orch
        .analyze(&AnalysisRequest::address("0xnobody", Chain::Ethereum))
        .await
        .unwrap();

    assert_eq!(result.degraded_signals, vec!["cross_chain_correlation"]);
}
