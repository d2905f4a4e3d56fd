//! Fingerprint service configuration

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub models: ModelsConfig,
    pub recognition: RecognitionConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    pub device: String,
    pub model_idle_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Root directory holding `segmentation/` and `recognition/` artifacts.
    pub models_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionConfig {
    pub similarity_threshold: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the two embeddings mapping files.
    pub embeddings_dir: PathBuf,
    /// Directory where registered raw scans are archived per employee.
    pub dataset_dir: PathBuf,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_path() -> &'static str {
        "config.toml"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig { port: 5000 },
            inference: InferenceConfig {
                device: "CPU".to_string(),
                model_idle_timeout: 300,
            },
            models: ModelsConfig {
                models_dir: PathBuf::from("fingerprint_models"),
            },
            recognition: RecognitionConfig {
                similarity_threshold: 1.0,
            },
            storage: StorageConfig {
                embeddings_dir: PathBuf::from("data/embeddings"),
                dataset_dir: PathBuf::from("data/dataset"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
            [server]
            port = 8080

            [inference]
            device = "CPU"
            model_idle_timeout = 60

            [models]
            models_dir = "models"

            [recognition]
            similarity_threshold = 0.85

            [storage]
            embeddings_dir = "data/embeddings"
            dataset_dir = "data/dataset"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 8080);
        assert!((config.recognition.similarity_threshold - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_default_threshold() {
        let config = Config::default();
        assert!((config.recognition.similarity_threshold - 1.0).abs() < 1e-6);
    }
}
