//! Runtime configuration: which shim library to load, the default
//! backend/target, and models to register at startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DnnError;
use crate::net::{Backend, ModelFormat, Target};

/// Path of the shim shared library.
pub const ENV_LIBRARY: &str = "GIZTOY_DNN_LIBRARY";
/// Default backend name, e.g. `opencv`.
pub const ENV_BACKEND: &str = "GIZTOY_DNN_BACKEND";
/// Default target name, e.g. `cpu`.
pub const ENV_TARGET: &str = "GIZTOY_DNN_TARGET";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnnConfig {
    /// Shim library path. Falls back to [`ENV_LIBRARY`], then the platform
    /// default name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<PathBuf>,

    #[serde(default)]
    pub backend: Backend,

    #[serde(default)]
    pub target: Target,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub models: HashMap<String, ModelEntry>,
}

/// A model file (and optional config file) registered under an ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub model: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<PathBuf>,

    #[serde(default)]
    pub format: ModelFormat,

    /// Overrides [`DnnConfig::backend`] for this model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,

    /// Overrides [`DnnConfig::target`] for this model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
}

impl DnnConfig {
    /// Builds a config from `GIZTOY_DNN_*` environment variables.
    pub fn from_env() -> Result<Self, DnnError> {
        let mut cfg = Self::default();
        cfg.apply_vars(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Overrides fields with `GIZTOY_DNN_*` environment variables that are set.
    pub fn apply_env(&mut self) -> Result<(), DnnError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<(), DnnError> {
        if let Some(path) = get(ENV_LIBRARY).filter(|v| !v.is_empty()) {
            self.library = Some(PathBuf::from(path));
        }
        if let Some(v) = get(ENV_BACKEND).filter(|v| !v.is_empty()) {
            self.backend = v.parse().map_err(|e| DnnError::Config(format!("{ENV_BACKEND}: {e}")))?;
        }
        if let Some(v) = get(ENV_TARGET).filter(|v| !v.is_empty()) {
            self.target = v.parse().map_err(|e| DnnError::Config(format!("{ENV_TARGET}: {e}")))?;
        }
        Ok(())
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, DnnError> {
        serde_yaml::from_str(s).map_err(|e| DnnError::Config(e.to_string()))
    }

    pub fn from_json_str(s: &str) -> Result<Self, DnnError> {
        serde_json::from_str(s).map_err(|e| DnnError::Config(e.to_string()))
    }

    /// Loads a config file. `.json` files are parsed as JSON, anything
    /// else as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DnnError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DnnError::Config(format!("read {}: {e}", path.display())))?;
        let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    pub fn to_yaml(&self) -> Result<String, DnnError> {
        serde_yaml::to_string(self).map_err(|e| DnnError::Config(e.to_string()))
    }
}
