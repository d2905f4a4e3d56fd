//! Embedding matching
//!
//! Cosine-similarity search over store snapshots. Two modes: 1:1
//! verification against an explicit target fingerprint, and 1:N
//! identification scanning the fingerprint-keyed records with a fallback
//! to the legacy employee-keyed aggregates when no fingerprints exist.

use thiserror::Error;

use super::types::MatchResult;
use crate::store::{EmployeeRecord, FingerprintRecord};
use crate::utils::math::cosine_similarity;

/// Match-level outcomes surfaced to the caller as structured payloads,
/// not failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("Target fingerprint ID {0} not found in database")]
    TargetNotFound(String),

    #[error("Embeddings database is empty")]
    DatabaseEmpty,
}

/// Search for the stored embedding closest to `query`.
///
/// With `target_fingerprint_id` this is 1:1 verification: only that record
/// is compared, and its absence is an error. Otherwise every fingerprint
/// record is scanned and the maximum-similarity candidate is always
/// reported, annotated with `matched = best >= threshold` (the boundary is
/// inclusive). Exact ties keep the first-seen record, relying on the
/// snapshots' insertion order.
pub fn recognize(
    query: &[f32],
    fingerprints: &[FingerprintRecord],
    employees: &[EmployeeRecord],
    threshold: f32,
    target_fingerprint_id: Option<&str>,
) -> Result<MatchResult, MatchError> {
    if fingerprints.is_empty() && employees.is_empty() {
        return Err(MatchError::DatabaseEmpty);
    }

    if let Some(target) = target_fingerprint_id {
        let record = fingerprints
            .iter()
            .find(|r| r.fingerprint_id == target)
            .ok_or_else(|| MatchError::TargetNotFound(target.to_string()))?;

        let similarity = cosine_similarity(query, &record.embedding);
        return Ok(MatchResult {
            employee_id: Some(record.employee_id.clone()),
            fingerprint_id: Some(record.fingerprint_id.clone()),
            confidence: similarity,
            matched: similarity >= threshold,
        });
    }

    if !fingerprints.is_empty() {
        let mut best: Option<&FingerprintRecord> = None;
        let mut best_similarity = -1.0f32;

        for record in fingerprints {
            let similarity = cosine_similarity(query, &record.embedding);
            if similarity > best_similarity {
                best_similarity = similarity;
                best = Some(record);
            }
        }

        // A non-empty snapshot always yields a candidate.
        if let Some(record) = best {
            return Ok(MatchResult {
                employee_id: Some(record.employee_id.clone()),
                fingerprint_id: Some(record.fingerprint_id.clone()),
                confidence: best_similarity,
                matched: best_similarity >= threshold,
            });
        }
    }

    // Legacy fallback: employee-granularity only, and the id is withheld
    // below threshold.
    let mut best_employee: Option<&EmployeeRecord> = None;
    let mut best_similarity = -1.0f32;

    for record in employees {
        let similarity = cosine_similarity(query, &record.embedding);
        if similarity > best_similarity {
            best_similarity = similarity;
            best_employee = Some(record);
        }
    }

    let matched = best_similarity >= threshold;
    Ok(MatchResult {
        employee_id: best_employee
            .filter(|_| matched)
            .map(|r| r.employee_id.clone()),
        fingerprint_id: None,
        confidence: best_similarity,
        matched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(id: &str, emp: &str, embedding: Vec<f32>) -> FingerprintRecord {
        FingerprintRecord {
            fingerprint_id: id.to_string(),
            employee_id: emp.to_string(),
            embedding,
            created_at: 0,
        }
    }

    fn emp(id: &str, embedding: Vec<f32>) -> EmployeeRecord {
        EmployeeRecord {
            employee_id: id.to_string(),
            embedding,
        }
    }

    #[test]
    fn test_empty_database() {
        let result = recognize(&[1.0, 0.0], &[], &[], 0.5, None);
        assert_eq!(result.unwrap_err(), MatchError::DatabaseEmpty);
    }

    #[test]
    fn test_target_verification_match() {
        let fingerprints = vec![fp("A", "emp-1", vec![1.0, 0.0])];
        let result = recognize(&[1.0, 0.0], &fingerprints, &[], 0.99, Some("A")).unwrap();
        assert!(result.matched);
        assert_eq!(result.fingerprint_id.as_deref(), Some("A"));
        assert_eq!(result.employee_id.as_deref(), Some("emp-1"));
        assert!((result.confidence - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_target_not_found() {
        let fingerprints = vec![fp("A", "emp-1", vec![1.0, 0.0])];
        let result = recognize(&[1.0, 0.0], &fingerprints, &[], 0.99, Some("B"));
        assert_eq!(
            result.unwrap_err(),
            MatchError::TargetNotFound("B".to_string())
        );
    }

    #[test]
    fn test_target_below_threshold_still_reported() {
        let fingerprints = vec![fp("A", "emp-1", vec![0.0, 1.0])];
        let result = recognize(&[1.0, 0.0], &fingerprints, &[], 0.9, Some("A")).unwrap();
        assert!(!result.matched);
        assert_eq!(result.fingerprint_id.as_deref(), Some("A"));
        assert!(result.confidence.abs() < 1e-6);
    }

    #[test]
    fn test_best_match_selection_any_insertion_order() {
        // Cosine similarities to the query [1, 0]: 0.2, 0.9, 0.5.
        let a = vec![0.2, (1.0f32 - 0.04).sqrt()];
        let b = vec![0.9, (1.0f32 - 0.81).sqrt()];
        let c = vec![0.5, (1.0f32 - 0.25).sqrt()];

        for order in [
            vec![("a", &a), ("b", &b), ("c", &c)],
            vec![("c", &c), ("a", &a), ("b", &b)],
            vec![("b", &b), ("c", &c), ("a", &a)],
        ] {
            let fingerprints: Vec<FingerprintRecord> = order
                .iter()
                .map(|&(id, e)| fp(id, &format!("emp-{id}"), e.clone()))
                .collect();
            let result = recognize(&[1.0, 0.0], &fingerprints, &[], 0.7, None).unwrap();
            assert_eq!(result.fingerprint_id.as_deref(), Some("b"));
            assert!(result.matched);
            assert!((result.confidence - 0.9).abs() < 1e-5);
        }
    }

    #[test]
    fn test_below_threshold_best_still_reported() {
        let fingerprints = vec![fp("A", "emp-1", vec![0.6, 0.8])];
        let result = recognize(&[1.0, 0.0], &fingerprints, &[], 0.95, None).unwrap();
        assert!(!result.matched);
        assert_eq!(result.fingerprint_id.as_deref(), Some("A"));
        assert_eq!(result.employee_id.as_deref(), Some("emp-1"));
        assert!((result.confidence - 0.6).abs() < 1e-5);
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let fingerprints = vec![fp("A", "emp-1", vec![1.0, 0.0])];
        // Identical vectors: similarity exactly 1.0, threshold exactly 1.0.
        let result = recognize(&[1.0, 0.0], &fingerprints, &[], 1.0, None).unwrap();
        assert!(result.matched);
    }

    #[test]
    fn test_exact_tie_keeps_first_seen() {
        let fingerprints = vec![
            fp("first", "emp-1", vec![1.0, 0.0]),
            fp("second", "emp-2", vec![2.0, 0.0]),
        ];
        // Both have similarity exactly 1.0 to the query.
        let result = recognize(&[3.0, 0.0], &fingerprints, &[], 0.5, None).unwrap();
        assert_eq!(result.fingerprint_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_legacy_fallback_has_no_fingerprint_id() {
        let employees = vec![emp("emp-1", vec![1.0, 0.0]), emp("emp-2", vec![0.0, 1.0])];
        let result = recognize(&[1.0, 0.0], &[], &employees, 0.9, None).unwrap();
        assert!(result.matched);
        assert_eq!(result.employee_id.as_deref(), Some("emp-1"));
        assert!(result.fingerprint_id.is_none());
    }

    #[test]
    fn test_legacy_fallback_withholds_employee_below_threshold() {
        let employees = vec![emp("emp-1", vec![0.0, 1.0])];
        let result = recognize(&[1.0, 0.0], &[], &employees, 0.9, None).unwrap();
        assert!(!result.matched);
        assert!(result.employee_id.is_none());
        assert!(result.fingerprint_id.is_none());
        assert!(result.confidence.abs() < 1e-6);
    }

    #[test]
    fn test_fingerprint_store_takes_precedence_over_legacy() {
        let fingerprints = vec![fp("A", "emp-1", vec![0.0, 1.0])];
        let employees = vec![emp("emp-2", vec![1.0, 0.0])];
        // The legacy store holds a perfect match, but the fingerprint
        // store is non-empty so it wins.
        let result = recognize(&[1.0, 0.0], &fingerprints, &employees, 0.5, None).unwrap();
        assert_eq!(result.fingerprint_id.as_deref(), Some("A"));
        assert!(!result.matched);
    }
}
