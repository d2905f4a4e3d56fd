//! Service error types

use thiserror::Error;

/// Errors produced by the recognition pipeline and its collaborators.
///
/// The API layer maps each variant to a status code: `Validation` becomes a
/// 400, everything else a 500. Match-level outcomes (`TargetNotFound`,
/// `DatabaseEmpty`) live in [`crate::service::matcher::MatchError`] and are
/// reported as structured payloads, not failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("Failed to load models")]
    ModelLoad(#[source] anyhow::Error),

    #[error("Could not load image")]
    ImageDecode(#[source] image::ImageError),

    #[error("Inference failed")]
    Inference(#[source] anyhow::Error),

    #[error("Storage error")]
    Store(#[source] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
