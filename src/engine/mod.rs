//! Inference engine module
//!
//! Provides OpenVINO-based inference with:
//! - Named-model resolution and shape introspection
//! - Lazy loading and automatic unloading after idle timeout
//! - Graceful degradation when segmentation output is malformed

pub mod loader;
pub mod segmenter;
pub mod preprocess;
pub mod embedder;

pub use loader::{LoadedModels, ModelCache};
pub use segmenter::Segmenter;
pub use embedder::{Embedding, EmbeddingExtractor};
