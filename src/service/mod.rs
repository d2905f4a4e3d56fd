//! Service layer module

pub mod fingerprint_service;
pub mod matcher;
pub mod types;

pub use fingerprint_service::FingerprintService;
pub use types::*;
