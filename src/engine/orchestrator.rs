//! Analysis orchestrator.
//!
//! Runs the pattern, mixer and cross-chain detectors concurrently, plus a
//! graph summary lookup for address targets, then scores whatever came
//! back. Every branch resolves to a `BranchOutcome`: either the value it
//! obtained or a neutral default with the reason it fell back. A failing,
//! panicking or slow branch never fails the analysis.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AnalysisTarget, CrossChainCorrelator, CrossChainFlag, MixerDetector, MixerVerdict, PatternDetector};
use crate::config::AnalysisConfig;
use crate::graph::GraphEngine;
use crate::scoring;
use crate::types::{Chain, ComplianceError, PatternMatch, RiskLevel, RiskSignalBundle};

// ---------------------------------------------------------------------------
// Branch results
// ---------------------------------------------------------------------------

/// Result of one concurrent branch.
#[derive(Debug, Clone, PartialEq)]
pub enum BranchOutcome<T> {
    Obtained(T),
    /// The branch failed; `value` is its neutral default.
    Degraded { value: T, reason: String },
}

impl<T> BranchOutcome<T> {
    pub fn value(&self) -> &T {
        match self {
            BranchOutcome::Obtained(v) | BranchOutcome::Degraded { value: v, .. } => v,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            BranchOutcome::Obtained(v) | BranchOutcome::Degraded { value: v, .. } => v,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, BranchOutcome::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            BranchOutcome::Degraded { reason, .. } => Some(reason),
            BranchOutcome::Obtained(_) => None,
        }
    }
}

/// Await `fut` under `timeout`, folding errors, panics and timeouts into
/// `default()`.
async fn run_branch<T, F, D>(name: &'static str, timeout: Duration, fut: F, default: D) -> BranchOutcome<T>
where
    F: Future<Output = anyhow::Result<T>>,
    D: FnOnce() -> T,
{
    let reason = match tokio::time::timeout(timeout, AssertUnwindSafe(fut).catch_unwind()).await {
        Ok(Ok(Ok(value))) => return BranchOutcome::Obtained(value),
        Ok(Ok(Err(e))) => format!("{e:#}"),
        Ok(Err(_)) => "detector panicked".to_string(),
        Err(_) => format!("timed out after {}s", timeout.as_secs_f64()),
    };

    warn!(branch = name, reason = %reason, "Branch degraded to neutral default");
    BranchOutcome::Degraded {
        value: default(),
        reason,
    }
}

/// Signals taken from the graph summary of an address.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct GraphSignals {
    sanctions_hits: u32,
    persisted_score: Option<f64>,
}

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub target: AnalysisTarget,
    pub chain: Chain,
    /// Pre-computed volume anomaly signal, `0` when unknown.
    #[serde(default)]
    pub volume_anomaly: f64,
    /// Previously persisted score; the result never drops below it.
    #[serde(default)]
    pub base_score: f64,
}

impl AnalysisRequest {
    pub fn address(address: &str, chain: Chain) -> Self {
        Self {
            target: AnalysisTarget::Address(address.to_string()),
            chain,
            volume_anomaly: 0.0,
            base_score: 0.0,
        }
    }

    pub fn transaction(tx_hash: &str, chain: Chain) -> Self {
        Self {
            target: AnalysisTarget::Transaction(tx_hash.to_string()),
            chain,
            volume_anomaly: 0.0,
            base_score: 0.0,
        }
    }
}

/// Always-successful analysis response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub chain: Chain,
    pub detected_patterns: Vec<PatternMatch>,
    pub mixer_detected: bool,
    pub mixer_risk: f64,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub cross_chain_flags: Vec<CrossChainFlag>,
    /// Branches that fell back to a neutral default.
    pub degraded_signals: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
    pub success: bool,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct AnalysisOrchestrator {
    patterns: Arc<dyn PatternDetector>,
    mixers: Arc<dyn MixerDetector>,
    cross_chain: Arc<dyn CrossChainCorrelator>,
    graph: Option<Arc<GraphEngine>>,
    config: AnalysisConfig,
}

impl AnalysisOrchestrator {
    pub fn new(
        patterns: Arc<dyn PatternDetector>,
        mixers: Arc<dyn MixerDetector>,
        cross_chain: Arc<dyn CrossChainCorrelator>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            patterns,
            mixers,
            cross_chain,
            graph: None,
            config,
        }
    }

    /// Use the graph engine for sanctions status and persisted scores.
    pub fn with_graph(mut self, graph: Arc<GraphEngine>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Analyse one address or transaction.
    ///
    /// Only a malformed target is rejected; every downstream failure
    /// degrades that branch and the result still reports success.
    pub async fn analyze(&self, req: &AnalysisRequest) -> Result<AnalysisResult, ComplianceError> {
        req.target.validate()?;

        let timeout = self.config.detector_timeout();
        let target = &req.target;
        let chain = req.chain;

        let (patterns, mixer, cross_chain, graph) = tokio::join!(
            run_branch(
                "pattern_detection",
                timeout,
                self.patterns.detect(target, chain),
                Vec::new,
            ),
            run_branch(
                "mixer_detection",
                timeout,
                self.mixers.detect(target, chain),
                MixerVerdict::default,
            ),
            run_branch(
                "cross_chain_correlation",
                timeout,
                self.cross_chain.correlate(target, chain),
                Vec::new,
            ),
            self.graph_signals(req),
        );

        let degraded_signals: Vec<String> = [
            ("pattern_detection", patterns.is_degraded()),
            ("mixer_detection", mixer.is_degraded()),
            ("cross_chain_correlation", cross_chain.is_degraded()),
            ("graph_summary", graph.is_degraded()),
        ]
        .into_iter()
        .filter(|(_, degraded)| *degraded)
        .map(|(name, _)| name.to_string())
        .collect();

        let patterns = patterns.into_value();
        let mixer = mixer.into_value();
        let cross_chain = cross_chain.into_value();
        let graph = graph.into_value();

        let floor = graph
            .persisted_score
            .map_or(req.base_score, |persisted| persisted.max(req.base_score));

        let signals = RiskSignalBundle {
            sanctions_hits: graph.sanctions_hits,
            pattern_matches: patterns,
            mixer_detected: mixer.detected,
            mixer_risk: mixer.risk,
            volume_anomaly: req.volume_anomaly,
            base_score: floor,
        };
        let breakdown = scoring::breakdown(&signals);

        info!(
            subject = %target.value(),
            kind = target.kind(),
            chain = %chain,
            risk_score = breakdown.score,
            risk_level = %breakdown.level,
            patterns = signals.pattern_matches.len(),
            mixer = signals.mixer_detected,
            cross_chain_flags = cross_chain.len(),
            degraded = degraded_signals.len(),
            "Analysis complete"
        );

        Ok(AnalysisResult {
            analysis_id: Uuid::new_v4(),
            address: target.address().map(str::to_string),
            tx_hash: target.tx_hash().map(str::to_string),
            chain,
            detected_patterns: signals.pattern_matches,
            mixer_detected: signals.mixer_detected,
            mixer_risk: if signals.mixer_detected { signals.mixer_risk } else { 0.0 },
            risk_score: breakdown.score,
            risk_level: breakdown.level,
            cross_chain_flags: cross_chain,
            degraded_signals,
            analyzed_at: Utc::now(),
            success: true,
        })
    }

    /// Sanctions hit and persisted score from the graph summary. Only
    /// address targets have one; an unknown address contributes nothing.
    ///
    /// A summary whose sanctions screen failed keeps its persisted score
    /// but is reported as degraded, since "no hit" is then unverified.
    async fn graph_signals(&self, req: &AnalysisRequest) -> BranchOutcome<GraphSignals> {
        let (Some(graph), Some(address)) = (self.graph.as_ref(), req.target.address()) else {
            return BranchOutcome::Obtained(GraphSignals::default());
        };

        let lookup = async {
            match graph.screened_summary(address, req.chain).await {
                Ok(summary) => Ok((
                    GraphSignals {
                        sanctions_hits: u32::from(summary.node.is_sanctioned()),
                        persisted_score: summary.node.risk_score,
                    },
                    summary.sanctions_screened,
                )),
                Err(e) if e.is_not_found() => {
                    debug!(address, chain = %req.chain, "No graph summary for target");
                    Ok((GraphSignals::default(), true))
                }
                Err(e) => Err(anyhow::Error::new(e)),
            }
        };

        let outcome = run_branch(
            "graph_summary",
            self.config.graph_timeout(),
            lookup,
            || (GraphSignals::default(), true),
        )
        .await;

        match outcome {
            BranchOutcome::Obtained((signals, true)) => BranchOutcome::Obtained(signals),
            BranchOutcome::Obtained((signals, false)) => {
                warn!(address, chain = %req.chain, "Sanctions screen unavailable for target");
                BranchOutcome::Degraded {
                    value: signals,
                    reason: "sanctions screening unavailable".to_string(),
                }
            }
            BranchOutcome::Degraded {
                value: (signals, _),
                reason,
            } => BranchOutcome::Degraded {
                value: signals,
                reason,
            },
        }
    }
}
