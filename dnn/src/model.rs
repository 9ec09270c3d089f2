//! Model registry: register models by ID and load them as ready-to-use Nets.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use once_cell::sync::Lazy;

use crate::config::DnnConfig;
use crate::error::DnnError;
use crate::net::{Backend, ModelFormat, Net, Target};

/// Where a registered model's data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Model (and optional config) files on disk. For Caffe, `model` is the
    /// `.caffemodel` and `config` the `.prototxt`.
    Files {
        model: String,
        config: String,
        format: ModelFormat,
    },
    /// Model data embedded in the binary, e.g. via `include_bytes!`.
    Memory {
        format: ModelFormat,
        model: &'static [u8],
        config: &'static [u8],
    },
}

impl ModelSource {
    /// Loads the model with the loader matching its format.
    pub fn load(&self) -> Result<Net, DnnError> {
        match self {
            ModelSource::Files { model, config, format } => match format {
                ModelFormat::Caffe => Net::read_net_from_caffe(config, model),
                ModelFormat::TensorFlow if config.is_empty() => Net::read_net_from_tensorflow(model),
                ModelFormat::Onnx => Net::read_net_from_onnx(model),
                ModelFormat::Torch => Net::read_net_from_torch(model),
                _ => Net::read_net(model, config),
            },
            ModelSource::Memory { format, model, config } => Net::read_net_from_bytes(*format, model, config),
        }
    }
}

/// Describes a registered model.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub id: String,
    pub source: ModelSource,
    pub backend: Backend,
    pub target: Target,
}

static REGISTRY: Lazy<Mutex<HashMap<String, ModelInfo>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Registers a model with the default backend and target.
/// Registering the same ID twice replaces the previous registration.
pub fn register_model(id: &str, source: ModelSource) {
    register_model_info(ModelInfo {
        id: id.to_string(),
        source,
        backend: Backend::default(),
        target: Target::default(),
    });
}

/// Registers a fully described model.
pub fn register_model_info(info: ModelInfo) {
    let mut reg = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
    tracing::debug!(id = %info.id, backend = %info.backend, target = %info.target, "dnn: model registered");
    reg.insert(info.id.clone(), info);
}

/// Registers every model listed in `cfg`. Returns how many were registered.
pub fn register_from_config(cfg: &DnnConfig) -> usize {
    for (id, entry) in &cfg.models {
        register_model_info(ModelInfo {
            id: id.clone(),
            source: ModelSource::Files {
                model: entry.model.to_string_lossy().into_owned(),
                config: entry
                    .config
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                format: entry.format,
            },
            backend: entry.backend.unwrap_or(cfg.backend),
            target: entry.target.unwrap_or(cfg.target),
        });
    }
    cfg.models.len()
}

/// Loads a registered model by ID and applies its backend and target.
pub fn load_model(id: &str) -> Result<Net, DnnError> {
    // Clone out so the lock is not held across the native load.
    let info = {
        let reg = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
        reg.get(id)
            .cloned()
            .ok_or_else(|| DnnError::ModelNotRegistered(id.to_string()))?
    };

    let mut net = info.source.load()?;
    net.set_preferable_backend(info.backend)?;
    net.set_preferable_target(info.target)?;
    Ok(net)
}

/// Returns the IDs of all registered models, sorted.
pub fn list_models() -> Vec<String> {
    let reg = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
    let mut ids: Vec<String> = reg.keys().cloned().collect();
    ids.sort();
    ids
}

/// Returns the registration for `id`, if any.
pub fn model_info(id: &str) -> Option<ModelInfo> {
    let reg = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
    reg.get(id).cloned()
}

/// Returns true if the model is registered.
pub fn is_registered(id: &str) -> bool {
    let reg = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
    reg.contains_key(id)
}

/// Removes a registration. Returns true if it existed.
pub fn unregister_model(id: &str) -> bool {
    let mut reg = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
    reg.remove(id).is_some()
}
