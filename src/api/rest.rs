//! Axum REST API handlers

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::ServiceError;
use crate::service::FingerprintService;
use crate::store::EmbeddingStore;

use super::dto::*;

/// Application state shared across handlers
pub struct AppState<S: EmbeddingStore> {
    pub service: Arc<FingerprintService<S>>,
}

/// Create the REST API router
pub fn create_rest_router<S: EmbeddingStore + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/api/recognize", post(recognize_handler::<S>))
        .route("/api/register", post(register_handler::<S>))
        .route("/health", get(health_handler::<S>))
        // Scans can be large uncompressed bitmaps
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(msg: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(msg)))
}

/// Convert a pipeline failure into the boundary response. Internal detail
/// is logged server-side, never leaked to the client.
fn map_service_error(e: ServiceError) -> ApiError {
    match e {
        ServiceError::Validation(msg) => bad_request(msg),
        ServiceError::ModelLoad(source) => {
            error!("Model loading failed: {source:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to load models")),
            )
        }
        other => {
            error!("Request processing failed: {other:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(other.to_string())),
            )
        }
    }
}

/// Recognize a fingerprint against the embeddings store
async fn recognize_handler<S: EmbeddingStore>(
    State(state): State<Arc<AppState<S>>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut image_data: Option<Vec<u8>> = None;
    let mut segmentation_model: Option<String> = None;
    let mut recognition_model: Option<String> = None;
    let mut target_fingerprint_id: Option<String> = None;
    let mut threshold: Option<f32> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                image_data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| bad_request(e.to_string()))?
                        .to_vec(),
                );
            }
            "segmentation_model_path" => {
                segmentation_model = Some(field.text().await.unwrap_or_default())
            }
            "recognition_model_path" => {
                recognition_model = Some(field.text().await.unwrap_or_default())
            }
            "target_fingerprint_id" => {
                target_fingerprint_id = Some(field.text().await.unwrap_or_default())
            }
            "threshold" => threshold = field.text().await.ok().and_then(|t| t.parse().ok()),
            _ => {}
        }
    }

    let image_data = image_data.ok_or_else(|| bad_request("No file part"))?;
    if image_data.is_empty() {
        return Err(bad_request("No selected file"));
    }

    let (segmentation_model, recognition_model) = match (segmentation_model, recognition_model) {
        (Some(s), Some(r)) if !s.is_empty() && !r.is_empty() => (s, r),
        _ => return Err(bad_request("Missing model path parameters")),
    };

    let target_fingerprint_id = target_fingerprint_id.filter(|t| !t.is_empty());

    let outcome = state
        .service
        .recognize(
            image_data,
            &segmentation_model,
            &recognition_model,
            threshold,
            target_fingerprint_id,
        )
        .await
        .map_err(map_service_error)?;

    // Match-level misses are structured payloads on a 200, not failures.
    Ok(match outcome {
        Ok(result) => Json(RecognizeResponse {
            similarity: SimilarityDto {
                employee_id: result.employee_id,
                fingerprint_id: result.fingerprint_id,
                confidence: result.confidence,
                matched: result.matched,
            },
        })
        .into_response(),
        Err(match_error) => Json(ErrorResponse::new(match_error.to_string())).into_response(),
    })
}

/// Register one or more fingerprints for an employee
async fn register_handler<S: EmbeddingStore>(
    State(state): State<Arc<AppState<S>>>,
    mut multipart: Multipart,
) -> Result<Json<RegisterResponse>, ApiError> {
    let mut images: Vec<Vec<u8>> = Vec::new();
    let mut employee_id: Option<String> = None;
    let mut positions: Vec<String> = Vec::new();
    let mut segmentation_model: Option<String> = None;
    let mut recognition_model: Option<String> = None;
    let mut fingerprint_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                images.push(
                    field
                        .bytes()
                        .await
                        .map_err(|e| bad_request(e.to_string()))?
                        .to_vec(),
                );
            }
            "employee_id" => employee_id = Some(field.text().await.unwrap_or_default()),
            "position" => positions.push(field.text().await.unwrap_or_default()),
            "segmentation_model_path" => {
                segmentation_model = Some(field.text().await.unwrap_or_default())
            }
            "recognition_model_path" => {
                recognition_model = Some(field.text().await.unwrap_or_default())
            }
            "fingerprint_id" => fingerprint_id = Some(field.text().await.unwrap_or_default()),
            _ => {}
        }
    }

    if images.is_empty() {
        return Err(bad_request("No file part"));
    }
    if images[0].is_empty() {
        return Err(bad_request("No selected file"));
    }

    let (employee_id, segmentation_model, recognition_model) =
        match (employee_id, segmentation_model, recognition_model) {
            (Some(e), Some(s), Some(r))
                if !e.is_empty() && !s.is_empty() && !r.is_empty() && !positions.is_empty() =>
            {
                (e, s, r)
            }
            _ => return Err(bad_request("Missing required parameters")),
        };

    let fingerprint_id = fingerprint_id.filter(|f| !f.is_empty());

    let result = state
        .service
        .register(
            images,
            &employee_id,
            positions,
            &segmentation_model,
            &recognition_model,
            fingerprint_id,
        )
        .await
        .map_err(map_service_error)?;

    Ok(Json(RegisterResponse {
        message: "Fingerprint registered successfully".to_string(),
        employee_id: result.employee_id,
        fingerprint_id: result.fingerprint_id,
    }))
}

/// Health check
async fn health_handler<S: EmbeddingStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    let health = state.service.health();

    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Fingerprint API is running".to_string(),
        version: health.version,
        models_loaded: health.resident_models,
    })
}
