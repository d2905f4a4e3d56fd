//! File-backed embeddings store
//!
//! Two independent JSON mapping files, one per half: fingerprint-keyed
//! records and legacy employee aggregates. Either file may be missing
//! (auto-created empty) or corrupt (that half falls back to empty; the
//! other half is unaffected). Persistence is whole-file overwrite through
//! a temp file and atomic rename, so a concurrent reader never observes a
//! torn write. There is no transactional atomicity across the two files;
//! a crash between the two writes leaves them inconsistent.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::traits::{EmbeddingStore, EmployeeRecord, FingerprintRecord};
use crate::utils::math::decaying_average;

pub const FINGERPRINT_DB_FILE: &str = "fingerprint_embeddings.json";
pub const EMPLOYEE_DB_FILE: &str = "employee_embeddings.json";

struct StoreState {
    fingerprints: Vec<FingerprintRecord>,
    employees: Vec<EmployeeRecord>,
}

/// JSON-file-backed embeddings store.
///
/// State lives in memory behind one async mutex; every mutating operation
/// is a load-modify-save critical section against that lock, so there is
/// at most one concurrent writer. Reads clone a consistent snapshot.
pub struct FileStore {
    fingerprint_path: PathBuf,
    employee_path: PathBuf,
    state: Mutex<StoreState>,
}

impl FileStore {
    /// Open (or initialize) the store under `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create embeddings directory {:?}", dir))?;

        let fingerprint_path = dir.join(FINGERPRINT_DB_FILE);
        let employee_path = dir.join(EMPLOYEE_DB_FILE);

        let fingerprints: Vec<FingerprintRecord> = load_half(&fingerprint_path)?;
        let employees: Vec<EmployeeRecord> = load_half(&employee_path)?;

        info!(
            "Embeddings store opened: {} fingerprint record(s), {} employee aggregate(s)",
            fingerprints.len(),
            employees.len()
        );

        Ok(Self {
            fingerprint_path,
            employee_path,
            state: Mutex::new(StoreState {
                fingerprints,
                employees,
            }),
        })
    }

    fn persist_fingerprints(&self, state: &StoreState) -> Result<()> {
        write_atomic(&self.fingerprint_path, &state.fingerprints)
    }

    fn persist_employees(&self, state: &StoreState) -> Result<()> {
        write_atomic(&self.employee_path, &state.employees)
    }
}

#[async_trait::async_trait]
impl EmbeddingStore for FileStore {
    async fn fingerprints(&self) -> Result<Vec<FingerprintRecord>> {
        Ok(self.state.lock().await.fingerprints.clone())
    }

    async fn employees(&self) -> Result<Vec<EmployeeRecord>> {
        Ok(self.state.lock().await.employees.clone())
    }

    async fn get_fingerprint(&self, fingerprint_id: &str) -> Result<Option<FingerprintRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .fingerprints
            .iter()
            .find(|r| r.fingerprint_id == fingerprint_id)
            .cloned())
    }

    async fn delete_fingerprint(&self, fingerprint_id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.fingerprints.len();
        state
            .fingerprints
            .retain(|r| r.fingerprint_id != fingerprint_id);
        let deleted = state.fingerprints.len() != before;
        if deleted {
            self.persist_fingerprints(&state)?;
            debug!("Deleted fingerprint record {}", fingerprint_id);
        }
        Ok(deleted)
    }

    async fn enroll(&self, records: Vec<FingerprintRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        for record in records {
            // Replace wholesale: delete-then-append, never merge.
            state
                .fingerprints
                .retain(|r| r.fingerprint_id != record.fingerprint_id);

            if let Some(existing) = state
                .employees
                .iter_mut()
                .find(|e| e.employee_id == record.employee_id)
            {
                existing.embedding = decaying_average(&existing.embedding, &record.embedding);
            } else {
                state.employees.push(EmployeeRecord {
                    employee_id: record.employee_id.clone(),
                    embedding: record.embedding.clone(),
                });
            }

            debug!(
                "Enrolled fingerprint {} for employee {}",
                record.fingerprint_id, record.employee_id
            );
            state.fingerprints.push(record);
        }

        self.persist_fingerprints(&state)?;
        self.persist_employees(&state)?;
        Ok(())
    }

    async fn count_fingerprints(&self) -> Result<usize> {
        Ok(self.state.lock().await.fingerprints.len())
    }
}

/// Load one mapping file. Missing: auto-create empty. Corrupt: log and
/// fall back to empty for this half only.
fn load_half<T: DeserializeOwned + Serialize>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        info!("Embeddings file {:?} not found, creating empty database", path);
        write_atomic(path, &Vec::<T>::new())?;
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read embeddings file {:?}", path))?;
    match serde_json::from_str(&content) {
        Ok(records) => Ok(records),
        Err(e) => {
            warn!("Embeddings file {:?} is corrupt ({e}), starting empty", path);
            Ok(Vec::new())
        }
    }
}

/// Whole-file overwrite via temp file + atomic rename.
fn write_atomic<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("embeddings file {:?} has no parent directory", path))?;
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {:?}", dir))?;
    let json = serde_json::to_string(records)?;
    tmp.write_all(json.as_bytes())?;
    tmp.persist(path)
        .with_context(|| format!("failed to replace embeddings file {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(fp: &str, emp: &str, embedding: Vec<f32>) -> FingerprintRecord {
        FingerprintRecord {
            fingerprint_id: fp.to_string(),
            employee_id: emp.to_string(),
            embedding,
            created_at: 1234567890,
        }
    }

    #[tokio::test]
    async fn test_open_initializes_empty_files() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert!(dir.path().join(FINGERPRINT_DB_FILE).exists());
        assert!(dir.path().join(EMPLOYEE_DB_FILE).exists());
        assert_eq!(store.count_fingerprints().await.unwrap(), 0);
        assert!(store.employees().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enroll_and_reload() {
        let dir = tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store
                .enroll(vec![
                    record("fp-1", "emp-1", vec![1.0, 0.0]),
                    record("fp-2", "emp-2", vec![0.0, 1.0]),
                ])
                .await
                .unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        let fps = store.fingerprints().await.unwrap();
        assert_eq!(fps.len(), 2);
        // Insertion order survives the round-trip.
        assert_eq!(fps[0].fingerprint_id, "fp-1");
        assert_eq!(fps[1].fingerprint_id, "fp-2");
        assert_eq!(store.employees().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reenrollment_is_idempotent_overwrite() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store
            .enroll(vec![record("fp-1", "emp-1", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .enroll(vec![record("fp-1", "emp-1", vec![0.0, 1.0])])
            .await
            .unwrap();

        let fps = store.fingerprints().await.unwrap();
        assert_eq!(fps.len(), 1);
        assert_eq!(fps[0].embedding, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_employee_aggregate_decaying_average() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store
            .enroll(vec![record("fp-1", "emp-1", vec![2.0, 4.0])])
            .await
            .unwrap();
        let employees = store.employees().await.unwrap();
        assert_eq!(employees[0].embedding, vec![2.0, 4.0]);

        store
            .enroll(vec![record("fp-2", "emp-1", vec![4.0, 8.0])])
            .await
            .unwrap();
        let employees = store.employees().await.unwrap();
        assert_eq!(employees.len(), 1);
        assert_eq!(employees[0].embedding, vec![3.0, 6.0]);

        // Two fingerprints, one aggregate.
        assert_eq!(store.count_fingerprints().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_fingerprint() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store
            .enroll(vec![record("fp-1", "emp-1", vec![1.0])])
            .await
            .unwrap();

        assert!(store.delete_fingerprint("fp-1").await.unwrap());
        assert!(!store.delete_fingerprint("fp-1").await.unwrap());
        assert_eq!(store.count_fingerprints().await.unwrap(), 0);

        // Deletion is persisted, not just in-memory.
        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.count_fingerprints().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_half_falls_back_independently() {
        let dir = tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            store
                .enroll(vec![record("fp-1", "emp-1", vec![1.0])])
                .await
                .unwrap();
        }

        std::fs::write(dir.path().join(FINGERPRINT_DB_FILE), b"{not json").unwrap();

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.count_fingerprints().await.unwrap(), 0);
        // The employee half is unaffected by the corrupt fingerprint half.
        assert_eq!(store.employees().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_fingerprint() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store
            .enroll(vec![record("fp-1", "emp-1", vec![1.0, 2.0])])
            .await
            .unwrap();

        let found = store.get_fingerprint("fp-1").await.unwrap().unwrap();
        assert_eq!(found.employee_id, "emp-1");
        assert!(store.get_fingerprint("fp-9").await.unwrap().is_none());
    }
}
