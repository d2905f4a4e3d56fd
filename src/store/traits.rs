//! Store abstraction traits
//!
//! Defines the interface for embeddings persistence. The canonical record
//! is fingerprint-keyed; the employee-keyed aggregate is a legacy index
//! maintained alongside it for older callers.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A stored fingerprint enrollment.
///
/// Created on registration, deleted-then-recreated when the same
/// `fingerprint_id` is re-registered, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintRecord {
    /// Unique fingerprint ID (UUID unless supplied by the caller)
    pub fingerprint_id: String,
    /// Owning employee ID. Not validated against an identity registry;
    /// orphans are permitted.
    pub employee_id: String,
    /// Fixed-length feature vector
    pub embedding: Vec<f32>,
    /// Registration timestamp (unix seconds)
    #[serde(default)]
    pub created_at: i64,
}

/// Legacy per-employee aggregate embedding.
///
/// Maintained as a decaying average: each new enrollment for the employee
/// replaces the value with `(old + incoming) / 2`, weighting recent
/// fingerprints more heavily than a true mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub employee_id: String,
    pub embedding: Vec<f32>,
}

/// Embeddings store trait
///
/// Implementations must be thread-safe; all mutations are serialized so
/// that concurrent registrations cannot lose updates. Snapshot methods
/// return records in insertion order, which matching relies on for
/// deterministic tie-breaking.
#[async_trait]
pub trait EmbeddingStore: Send + Sync + 'static {
    /// Snapshot of all fingerprint-keyed records, in insertion order.
    async fn fingerprints(&self) -> Result<Vec<FingerprintRecord>>;

    /// Snapshot of all legacy employee aggregates, in insertion order.
    async fn employees(&self) -> Result<Vec<EmployeeRecord>>;

    /// Look up a single fingerprint record.
    async fn get_fingerprint(&self, fingerprint_id: &str) -> Result<Option<FingerprintRecord>>;

    /// Delete a fingerprint record and persist. Returns true if it existed.
    async fn delete_fingerprint(&self, fingerprint_id: &str) -> Result<bool>;

    /// Enroll a batch of records from one registration.
    ///
    /// For each record: any prior record under the same fingerprint_id is
    /// deleted before the new one is written (no merge), and the owning
    /// employee's aggregate is updated with the decaying average. Both
    /// halves are persisted once, after the whole batch.
    async fn enroll(&self, records: Vec<FingerprintRecord>) -> Result<()>;

    /// Number of fingerprint-keyed records.
    async fn count_fingerprints(&self) -> Result<usize>;
}
