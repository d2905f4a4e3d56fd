//! Model loading and caching
//!
//! Resolves named segmentation and recognition artifacts under the models
//! directory, compiles them once, and keeps them in a name-keyed cache.
//! Cached models are evicted after `model_idle_timeout` seconds without
//! access; the next request reloads them from disk. Eviction is the only
//! invalidation path, so replacing an artifact file takes effect after one
//! idle period (or a restart).

use std::collections::HashMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use openvino::{CompiledModel, Core};
use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::InferenceConfig;
use crate::error::ServiceError;

/// Input resolution assumed when a model does not declare a usable static
/// shape.
pub const FALLBACK_INPUT_SIZE: (u32, u32) = (90, 90);

/// Wrapper for OpenVINO Core that implements Send + Sync
pub struct SafeCore(Core);
unsafe impl Send for SafeCore {}
unsafe impl Sync for SafeCore {}

impl Deref for SafeCore {
    type Target = Core;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for SafeCore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Wrapper for OpenVINO CompiledModel that implements Send + Sync
#[derive(Clone)]
pub struct SafeCompiledModel(pub Arc<CompiledModel>);
unsafe impl Send for SafeCompiledModel {}
unsafe impl Sync for SafeCompiledModel {}

impl SafeCompiledModel {
    /// Create an inference request
    /// OpenVINO CompiledModel methods are thread-safe in C++, but Rust bindings
    /// require &mut self. We bypass this restriction safely.
    pub fn create_infer_request(&self) -> anyhow::Result<openvino::InferRequest> {
        unsafe {
            let ptr = Arc::as_ptr(&self.0) as *mut CompiledModel;
            (*ptr).create_infer_request().map_err(|e| e.into())
        }
    }
}

/// The two artifact kinds a request names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Segmentation,
    Recognition,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Segmentation => "segmentation",
            ModelKind::Recognition => "recognition",
        }
    }
}

/// A compiled model together with its declared input resolution.
#[derive(Clone)]
pub struct LoadedModel {
    pub compiled: SafeCompiledModel,
    pub input_shape: (u32, u32),
}

/// Both models a recognition or registration request needs.
pub struct LoadedModels {
    pub segmentation: LoadedModel,
    pub recognition: LoadedModel,
}

struct CachedModel {
    model: LoadedModel,
    last_access: Instant,
}

/// Name-keyed model cache with lazy loading and idle unloading.
pub struct ModelCache {
    core: Arc<RwLock<SafeCore>>,
    models_dir: PathBuf,
    device: String,
    idle_timeout: Duration,

    segmentation: RwLock<HashMap<String, CachedModel>>,
    recognition: RwLock<HashMap<String, CachedModel>>,

    shutdown: Notify,
}

impl ModelCache {
    pub fn new(config: &InferenceConfig, models_dir: &Path) -> Result<Self, ServiceError> {
        let core = Core::new().map_err(|e| ServiceError::ModelLoad(e.into()))?;

        Ok(Self {
            core: Arc::new(RwLock::new(SafeCore(core))),
            models_dir: models_dir.to_path_buf(),
            device: config.device.clone(),
            idle_timeout: Duration::from_secs(config.model_idle_timeout),
            segmentation: RwLock::new(HashMap::new()),
            recognition: RwLock::new(HashMap::new()),
            shutdown: Notify::new(),
        })
    }

    /// Resolve and load the named segmentation and recognition models.
    ///
    /// Either failure aborts the pair; a request never proceeds with one
    /// model loaded and the other missing.
    pub fn load(
        &self,
        segmentation_name: &str,
        recognition_name: &str,
    ) -> Result<LoadedModels, ServiceError> {
        let segmentation = self.get_or_load(ModelKind::Segmentation, segmentation_name)?;
        let recognition = self.get_or_load(ModelKind::Recognition, recognition_name)?;
        Ok(LoadedModels {
            segmentation,
            recognition,
        })
    }

    fn cache_for(&self, kind: ModelKind) -> &RwLock<HashMap<String, CachedModel>> {
        match kind {
            ModelKind::Segmentation => &self.segmentation,
            ModelKind::Recognition => &self.recognition,
        }
    }

    fn get_or_load(&self, kind: ModelKind, name: &str) -> Result<LoadedModel, ServiceError> {
        let cache = self.cache_for(kind);

        // Fast path: already loaded, bump the access time.
        {
            let read_guard = cache.read();
            if read_guard.contains_key(name) {
                drop(read_guard);
                let mut write_guard = cache.write();
                if let Some(cached) = write_guard.get_mut(name) {
                    cached.last_access = Instant::now();
                    return Ok(cached.model.clone());
                }
            }
        }

        let mut write_guard = cache.write();

        // Double-check after acquiring the write lock
        if let Some(cached) = write_guard.get_mut(name) {
            cached.last_access = Instant::now();
            return Ok(cached.model.clone());
        }

        let path = self.artifact_path(kind, name)?;
        info!("Loading {} model '{}' from {:?}", kind.as_str(), name, path);
        let start = Instant::now();

        let model = self
            .load_model(&path)
            .map_err(ServiceError::ModelLoad)?;

        info!(
            "Model {}/{} loaded in {:?} (input {}x{})",
            kind.as_str(),
            name,
            start.elapsed(),
            model.input_shape.0,
            model.input_shape.1
        );

        write_guard.insert(
            name.to_string(),
            CachedModel {
                model: model.clone(),
                last_access: Instant::now(),
            },
        );

        Ok(model)
    }

    /// Build `<models_dir>/<kind>/<name>.onnx`, rejecting names that would
    /// escape the models directory.
    fn artifact_path(&self, kind: ModelKind, name: &str) -> Result<PathBuf, ServiceError> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
        {
            return Err(ServiceError::ModelLoad(anyhow::anyhow!(
                "invalid model name: {:?}",
                name
            )));
        }
        Ok(self
            .models_dir
            .join(kind.as_str())
            .join(format!("{}.onnx", name)))
    }

    fn load_model(&self, path: &Path) -> anyhow::Result<LoadedModel> {
        let path_str = path
            .to_str()
            .with_context(|| format!("non-UTF-8 model path {:?}", path))?;

        // Core methods take &mut self in the Rust bindings.
        let mut core = self.core.write();
        let model = core
            .read_model_from_file(path_str, "")
            .with_context(|| format!("failed to read model {:?}", path))?;

        let input_shape = introspect_input_shape(&model).unwrap_or_else(|| {
            warn!(
                "Model {:?} has no usable static input shape, assuming {}x{}",
                path, FALLBACK_INPUT_SIZE.0, FALLBACK_INPUT_SIZE.1
            );
            FALLBACK_INPUT_SIZE
        });

        let compiled = core
            .compile_model(&model, self.device.as_str().into())
            .with_context(|| format!("failed to compile model {:?}", path))?;

        Ok(LoadedModel {
            compiled: SafeCompiledModel(Arc::new(compiled)),
            input_shape,
        })
    }

    /// Names of currently-resident models, for health reporting.
    pub fn resident_models(&self) -> HashMap<String, Vec<String>> {
        let mut out = HashMap::new();
        for kind in [ModelKind::Segmentation, ModelKind::Recognition] {
            let mut names: Vec<String> =
                self.cache_for(kind).read().keys().cloned().collect();
            names.sort();
            out.insert(kind.as_str().to_string(), names);
        }
        out
    }

    fn cleanup_idle_models(&self) {
        let now = Instant::now();
        for kind in [ModelKind::Segmentation, ModelKind::Recognition] {
            let cache = self.cache_for(kind);
            let has_idle = {
                let read_guard = cache.read();
                read_guard
                    .values()
                    .any(|c| now.duration_since(c.last_access) > self.idle_timeout)
            };

            if has_idle {
                let mut write_guard = cache.write();
                write_guard.retain(|name, cached| {
                    let keep = now.duration_since(cached.last_access) <= self.idle_timeout;
                    if !keep {
                        info!("Unloading idle {} model '{}'", kind.as_str(), name);
                    }
                    keep
                });
            }
        }
    }

    /// Start the background cleanup task
    pub async fn start_cleanup_task(self: Arc<Self>) {
        let check_interval = Duration::from_secs(60);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(check_interval) => {
                    debug!("Running model cleanup check");
                    self.cleanup_idle_models();
                }
                _ = self.shutdown.notified() => {
                    info!("Model cache cleanup task shutting down");
                    break;
                }
            }
        }
    }

    /// Signal shutdown
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

impl Drop for ModelCache {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

/// Read the first input's declared spatial resolution.
///
/// Artifacts exported from the training pipeline are NHWC `[1, H, W, 1]`;
/// multi-input models contribute their first input. Returns None for dynamic
/// or non-4D shapes so the caller can apply the fallback.
fn introspect_input_shape(model: &openvino::Model) -> Option<(u32, u32)> {
    let input = model.get_input_by_index(0).ok()?;
    let shape = input.get_shape().ok()?;
    let dims = shape.get_dimensions().to_vec();
    if dims.len() != 4 {
        return None;
    }
    let (h, w) = (dims[1], dims[2]);
    if h <= 0 || w <= 0 {
        return None;
    }
    Some((h as u32, w as u32))
}
