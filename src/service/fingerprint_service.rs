//! Fingerprint Service - Core business logic
//!
//! Orchestrates preprocessing, embedding extraction, matching, and store
//! updates for enrollment and recognition requests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::{
    preprocess::preprocess, EmbeddingExtractor, LoadedModels, ModelCache, Segmenter,
};
use crate::error::ServiceError;
use crate::store::{EmbeddingStore, FingerprintRecord};

use super::matcher;
use super::types::*;

/// Fingerprint enrollment and recognition service
pub struct FingerprintService<S: EmbeddingStore> {
    models: Arc<ModelCache>,
    store: Arc<S>,
    config: Config,
}

impl<S: EmbeddingStore> FingerprintService<S> {
    pub fn new(models: Arc<ModelCache>, store: Arc<S>, config: Config) -> Self {
        Self {
            models,
            store,
            config,
        }
    }

    /// Get a reference to the store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Recognize a fingerprint against the embeddings store.
    ///
    /// Returns the match outcome (or a structured match-level error) on
    /// success; pipeline failures (model load, undecodable image) are the
    /// outer error.
    pub async fn recognize(
        &self,
        image: Vec<u8>,
        segmentation_model: &str,
        recognition_model: &str,
        threshold: Option<f32>,
        target_fingerprint_id: Option<String>,
    ) -> Result<RecognizeOutcome, ServiceError> {
        let start = Instant::now();

        let models = self.load_models(segmentation_model, recognition_model).await?;

        let fingerprints = self
            .store
            .fingerprints()
            .await
            .map_err(ServiceError::Store)?;
        let employees = self.store.employees().await.map_err(ServiceError::Store)?;

        if fingerprints.is_empty() && employees.is_empty() {
            return Ok(Err(matcher::MatchError::DatabaseEmpty));
        }

        let embedding = extract_embeddings(models, vec![image])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Inference(anyhow::anyhow!("no embedding produced")))?;

        let threshold = threshold.unwrap_or(self.config.recognition.similarity_threshold);
        let outcome = matcher::recognize(
            &embedding,
            &fingerprints,
            &employees,
            threshold,
            target_fingerprint_id.as_deref(),
        );

        info!(
            "Recognition completed in {}ms ({} fingerprint record(s) scanned)",
            start.elapsed().as_millis(),
            fingerprints.len()
        );

        Ok(outcome)
    }

    /// Register one or more fingerprints for an employee.
    ///
    /// Every image is preprocessed, embedded, and upserted into the
    /// fingerprint-keyed store; each enrollment also folds into the
    /// employee's legacy decaying-average aggregate. Both halves are
    /// persisted once, after all images are processed. Returns the id of
    /// the first registered fingerprint.
    pub async fn register(
        &self,
        images: Vec<Vec<u8>>,
        employee_id: &str,
        positions: Vec<String>,
        segmentation_model: &str,
        recognition_model: &str,
        fingerprint_id: Option<String>,
    ) -> Result<RegisterResult, ServiceError> {
        let start = Instant::now();

        if images.is_empty() {
            return Err(ServiceError::validation("No selected file"));
        }
        if fingerprint_id.is_some() && images.len() > 1 {
            return Err(ServiceError::validation(
                "Only one file allowed when fingerprint_id is provided",
            ));
        }
        let positions = broadcast_positions(positions, images.len())?;
        let ids = assign_fingerprint_ids(images.len(), fingerprint_id.as_deref());

        // Re-registration under an explicit id is an overwrite: drop the
        // prior record before reprocessing.
        if let Some(id) = &fingerprint_id {
            let removed = self
                .store
                .delete_fingerprint(id)
                .await
                .map_err(ServiceError::Store)?;
            if removed {
                info!("Removed existing fingerprint {} before re-registration", id);
            }
        }

        self.archive_scans(employee_id, &positions, &ids, &images)?;

        let models = self.load_models(segmentation_model, recognition_model).await?;
        let embeddings = extract_embeddings(models, images).await?;

        let created_at = unix_now();
        let records: Vec<FingerprintRecord> = ids
            .iter()
            .zip(embeddings)
            .map(|(id, embedding)| FingerprintRecord {
                fingerprint_id: id.clone(),
                employee_id: employee_id.to_string(),
                embedding,
                created_at,
            })
            .collect();

        let count = records.len();
        self.store
            .enroll(records)
            .await
            .map_err(ServiceError::Store)?;

        info!(
            "Registered {} fingerprint(s) for employee {} in {}ms",
            count,
            employee_id,
            start.elapsed().as_millis()
        );

        Ok(RegisterResult {
            employee_id: employee_id.to_string(),
            fingerprint_id: ids[0].clone(),
        })
    }

    /// Get health status
    pub fn health(&self) -> HealthResult {
        HealthResult {
            healthy: true,
            version: env!("CARGO_PKG_VERSION").to_string(),
            resident_models: self.models.resident_models(),
        }
    }

    async fn load_models(
        &self,
        segmentation_model: &str,
        recognition_model: &str,
    ) -> Result<LoadedModels, ServiceError> {
        let cache = self.models.clone();
        let seg = segmentation_model.to_string();
        let rec = recognition_model.to_string();
        tokio::task::spawn_blocking(move || cache.load(&seg, &rec))
            .await
            .map_err(|e| ServiceError::ModelLoad(e.into()))?
    }

    /// Archive raw scans under the per-employee dataset directory,
    /// `<employee>_<position>_<id>.bmp`, before any processing.
    fn archive_scans(
        &self,
        employee_id: &str,
        positions: &[String],
        ids: &[String],
        images: &[Vec<u8>],
    ) -> Result<(), ServiceError> {
        let employee_dir = self
            .config
            .storage
            .dataset_dir
            .join(sanitize_component(employee_id));
        std::fs::create_dir_all(&employee_dir)?;

        for ((position, id), image) in positions.iter().zip(ids).zip(images) {
            let filename = format!(
                "{}_{}_{}.bmp",
                sanitize_component(employee_id),
                sanitize_component(position),
                sanitize_component(id)
            );
            let path: PathBuf = employee_dir.join(filename);
            std::fs::write(&path, image)?;
        }
        Ok(())
    }
}

/// Preprocess and embed a batch of raw images on the blocking pool.
///
/// Inference is synchronous and runs to completion; it must not suspend
/// the async runtime.
async fn extract_embeddings(
    models: LoadedModels,
    images: Vec<Vec<u8>>,
) -> Result<Vec<Vec<f32>>, ServiceError> {
    tokio::task::spawn_blocking(move || {
        let segmenter = Segmenter::new(models.segmentation);
        let extractor = EmbeddingExtractor::new(models.recognition);

        images
            .iter()
            .map(|image| {
                let tensor = preprocess(image, &segmenter, extractor.input_shape())?;
                Ok(extractor.embed(&tensor)?.vector)
            })
            .collect()
    })
    .await
    .map_err(|e| ServiceError::Inference(e.into()))?
}

/// Pair positions with images: a single position broadcasts to all
/// images, otherwise the counts must match exactly.
fn broadcast_positions(
    positions: Vec<String>,
    image_count: usize,
) -> Result<Vec<String>, ServiceError> {
    if positions.is_empty() {
        return Err(ServiceError::validation("Missing required parameters"));
    }
    if positions.len() == image_count {
        return Ok(positions);
    }
    if positions.len() == 1 {
        return Ok(vec![positions[0].clone(); image_count]);
    }
    Err(ServiceError::validation(
        "Number of positions must match number of files",
    ))
}

/// One id per image: the caller-supplied id goes to the first image,
/// every other image gets a fresh UUID.
fn assign_fingerprint_ids(image_count: usize, explicit: Option<&str>) -> Vec<String> {
    (0..image_count)
        .map(|i| match (i, explicit) {
            (0, Some(id)) => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        })
        .collect()
}

/// Keep filesystem path components to a safe character set.
fn sanitize_component(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_positions_exact_match() {
        let positions = vec!["thumb".to_string(), "index".to_string()];
        let result = broadcast_positions(positions.clone(), 2).unwrap();
        assert_eq!(result, positions);
    }

    #[test]
    fn test_broadcast_positions_single_broadcasts() {
        let result = broadcast_positions(vec!["thumb".to_string()], 3).unwrap();
        assert_eq!(result, vec!["thumb", "thumb", "thumb"]);
    }

    #[test]
    fn test_broadcast_positions_mismatch() {
        let positions = vec!["thumb".to_string(), "index".to_string()];
        let err = broadcast_positions(positions, 3).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "Number of positions must match number of files"
        );
    }

    #[test]
    fn test_broadcast_positions_empty() {
        let err = broadcast_positions(vec![], 1).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn test_assign_ids_explicit_first_only() {
        let ids = assign_fingerprint_ids(3, Some("fp-explicit"));
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], "fp-explicit");
        assert_ne!(ids[1], ids[0]);
        assert_ne!(ids[2], ids[1]);
    }

    #[test]
    fn test_assign_ids_all_generated() {
        let ids = assign_fingerprint_ids(2, None);
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("emp-01_left.thumb"), "emp-01_left.thumb");
        assert_eq!(sanitize_component("../etc/passwd"), ".._etc_passwd");
        assert_eq!(sanitize_component("a b/c"), "a_b_c");
    }
}
