//! Analysis engine: detector seams and the orchestrator that fans out to
//! them.
//!
//! Pattern detection, mixer detection and cross-chain correlation are
//! external engines reached through the traits below. Each is called
//! with the analysis target and chain and either returns a structured
//! result or fails; the orchestrator owns what happens next.

pub mod orchestrator;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{validate_address, Chain, ComplianceError, PatternMatch};

pub use orchestrator::{AnalysisOrchestrator, AnalysisRequest, AnalysisResult, BranchOutcome};

/// What is being analysed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnalysisTarget {
    Address(String),
    Transaction(String),
}

impl AnalysisTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisTarget::Address(_) => "address",
            AnalysisTarget::Transaction(_) => "transaction",
        }
    }

    /// The raw address or transaction hash.
    pub fn value(&self) -> &str {
        match self {
            AnalysisTarget::Address(v) | AnalysisTarget::Transaction(v) => v,
        }
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            AnalysisTarget::Address(a) => Some(a),
            AnalysisTarget::Transaction(_) => None,
        }
    }

    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            AnalysisTarget::Transaction(h) => Some(h),
            AnalysisTarget::Address(_) => None,
        }
    }

    pub fn validate(&self) -> Result<(), ComplianceError> {
        validate_address(self.value()).map_err(|_| {
            ComplianceError::Validation(format!("invalid {} target: {:?}", self.kind(), self.value()))
        })
    }
}

/// Mixer detector output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MixerVerdict {
    pub detected: bool,
    /// Detector's confidence-weighted risk, meaningful only when `detected`.
    pub risk: f64,
    /// Mixer contracts or services the target interacted with.
    #[serde(default)]
    pub mixers: Vec<String>,
}

/// Related activity for the same actor on another chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossChainFlag {
    pub flag_type: String,
    pub source_chain: Chain,
    pub target_chain: Chain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// ---------------------------------------------------------------------------
// Detector seams
// ---------------------------------------------------------------------------

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PatternDetector: Send + Sync {
    /// Laundering / structuring patterns found around the target.
    async fn detect(&self, target: &AnalysisTarget, chain: Chain) -> Result<Vec<PatternMatch>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MixerDetector: Send + Sync {
    async fn detect(&self, target: &AnalysisTarget, chain: Chain) -> Result<MixerVerdict>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrossChainCorrelator: Send + Sync {
    async fn correlate(&self, target: &AnalysisTarget, chain: Chain) -> Result<Vec<CrossChainFlag>>;
}
