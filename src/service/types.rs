//! Service layer types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::matcher::MatchError;

/// Outcome of one recognition attempt.
///
/// Reported for every completed search, including near-misses below the
/// threshold; the caller decides rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    /// Best-matching employee. In the legacy employee-store fallback this
    /// is withheld when the similarity is below threshold.
    pub employee_id: Option<String>,
    /// Best-matching fingerprint. Absent in the legacy fallback, which
    /// only resolves to employee granularity.
    pub fingerprint_id: Option<String>,
    /// Raw cosine similarity in [-1, 1]; not clamped or rescaled.
    pub confidence: f32,
    #[serde(rename = "match")]
    pub matched: bool,
}

/// A completed recognition: either a match report or a structured
/// match-level error (empty database, unknown target). Pipeline failures
/// are a separate, outer error.
pub type RecognizeOutcome = Result<MatchResult, MatchError>;

/// Fingerprint registration result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResult {
    pub employee_id: String,
    /// Id under which the first image was registered; usable later for
    /// 1:1 verification.
    pub fingerprint_id: String,
}

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResult {
    pub healthy: bool,
    pub version: String,
    /// Names of models currently resident in the cache, by kind.
    pub resident_models: HashMap<String, Vec<String>>,
}
