//! Risk scoring aggregator.
//!
//! Combines independent risk signals into one score in `[0, 1]`.
//! Components are additive: a single strong signal is never diluted by
//! weak or absent ones. The caller's `base_score` is a floor, so a
//! recomputed score never drops below a previously persisted one.

use serde::{Deserialize, Serialize};

use crate::types::{RiskLevel, RiskSignalBundle};

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

/// Flat contribution of any sanctions hit.
pub const SANCTIONS_WEIGHT: f64 = 0.50;
/// Weight of the mean pattern risk.
pub const PATTERN_WEIGHT: f64 = 0.30;
/// Weight of the mixer risk (only when a mixer was detected).
pub const MIXER_WEIGHT: f64 = 0.20;
/// Weight of the volume anomaly signal.
pub const VOLUME_WEIGHT: f64 = 0.10;

/// Per-component view of one scoring run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub sanctions: f64,
    pub patterns: f64,
    pub mixer: f64,
    pub volume: f64,
    /// Sum of the four components before floor and clamp.
    pub raw: f64,
    pub floor: f64,
    pub score: f64,
    pub level: RiskLevel,
}

/// Final score for a signal bundle.
pub fn score(signals: &RiskSignalBundle) -> f64 {
    breakdown(signals).score
}

/// Final score with its components.
pub fn breakdown(signals: &RiskSignalBundle) -> ScoreBreakdown {
    let sanctions = if signals.sanctions_hits > 0 {
        SANCTIONS_WEIGHT
    } else {
        0.0
    };

    let patterns = if signals.pattern_matches.is_empty() {
        0.0
    } else {
        let total: f64 = signals
            .pattern_matches
            .iter()
            .map(|p| sanitize(p.risk_score))
            .sum();
        let mean = total / signals.pattern_matches.len() as f64;
        mean.min(1.0) * PATTERN_WEIGHT
    };

    let mixer = if signals.mixer_detected {
        sanitize(signals.mixer_risk).min(1.0) * MIXER_WEIGHT
    } else {
        0.0
    };

    let volume = sanitize(signals.volume_anomaly).min(1.0) * VOLUME_WEIGHT;

    let raw = sanctions + patterns + mixer + volume;
    let floor = sanitize(signals.base_score);
    let score = round4(raw.max(floor).min(1.0));

    ScoreBreakdown {
        sanctions,
        patterns,
        mixer,
        volume,
        raw,
        floor,
        score,
        level: RiskLevel::from_score(score),
    }
}

/// Negative and non-finite inputs count as no signal.
fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
