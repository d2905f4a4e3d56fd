//! Embeddings store for fingerprint data persistence

pub mod traits;
pub mod file;

pub use traits::{EmbeddingStore, EmployeeRecord, FingerprintRecord};
pub use file::FileStore;
