//! REST API request/response data transfer objects

use std::collections::HashMap;

use serde::Serialize;

/// Recognition response wrapper
#[derive(Debug, Serialize)]
pub struct RecognizeResponse {
    pub similarity: SimilarityDto,
}

#[derive(Debug, Serialize)]
pub struct SimilarityDto {
    pub employee_id: Option<String>,
    pub fingerprint_id: Option<String>,
    pub confidence: f32,
    #[serde(rename = "match")]
    pub matched: bool,
}

/// Register response
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    #[serde(rename = "employeeId")]
    pub employee_id: String,
    pub fingerprint_id: String,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub version: String,
    pub models_loaded: HashMap<String, Vec<String>>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_serializes_match_keyword() {
        let dto = SimilarityDto {
            employee_id: Some("emp-1".to_string()),
            fingerprint_id: None,
            confidence: 0.75,
            matched: true,
        };
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["match"], true);
        assert_eq!(json["fingerprint_id"], serde_json::Value::Null);
    }
}
