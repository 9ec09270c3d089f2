//! Utility functions for CLI commands.

use std::path::PathBuf;

use anyhow::Context as _;
use giztoy_dnn::{DnnConfig, ModelFormat, ModelSource, Net, Scalar, Size};

use crate::Cli;

const APP_NAME: &str = "dnn";
const BASE_DIR: &str = ".giztoy";
const CONFIG_FILE: &str = "config.yaml";

/// Returns ~/.giztoy/dnn/config.yaml.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(BASE_DIR).join(APP_NAME).join(CONFIG_FILE))
}

/// Loads the config file, then applies environment and flag overrides.
///
/// A missing default config file is not an error; a missing file passed
/// with --config-file is.
pub fn load_config(cli: &Cli) -> anyhow::Result<DnnConfig> {
    let mut cfg = match &cli.config_file {
        Some(path) => DnnConfig::load(path)?,
        None => match default_config_path() {
            Some(path) if path.exists() => DnnConfig::load(&path)?,
            _ => DnnConfig::default(),
        },
    };
    cfg.apply_env()?;
    if let Some(lib) = &cli.library {
        cfg.library = Some(PathBuf::from(lib));
    }
    Ok(cfg)
}

/// Loads the config, initializes the runtime and registers config models.
pub fn init_runtime(cli: &Cli) -> anyhow::Result<DnnConfig> {
    let cfg = load_config(cli)?;
    giztoy_dnn::init_from_config(&cfg).context("failed to load the dnn shim library")?;
    let n = giztoy_dnn::register_from_config(&cfg);
    tracing::debug!(models = n, "registered models from config");
    Ok(cfg)
}

/// Opens `model` as a registered model ID, or else as a file path.
pub fn open_model(model: &str, config: Option<&str>, format: ModelFormat) -> anyhow::Result<Net> {
    if config.is_none() && giztoy_dnn::is_registered(model) {
        tracing::debug!(id = model, "loading registered model");
        return Ok(giztoy_dnn::load_model(model)?);
    }
    let source = ModelSource::Files {
        model: model.to_string(),
        config: config.unwrap_or_default().to_string(),
        format,
    };
    source.load().with_context(|| format!("failed to load {model}"))
}

/// Outputs result as JSON or YAML.
pub fn output_result<T: serde::Serialize>(result: &T, as_json: bool) -> anyhow::Result<()> {
    let output = if as_json {
        serde_json::to_string_pretty(result)? + "\n"
    } else {
        serde_yaml::to_string(result)?
    };
    print!("{output}");
    Ok(())
}

/// Parses "WxH", e.g. "300x300".
pub fn parse_size(s: &str) -> Result<Size, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {s:?}"))?;
    let w = w.trim().parse::<i32>().map_err(|e| format!("width: {e}"))?;
    let h = h.trim().parse::<i32>().map_err(|e| format!("height: {e}"))?;
    if w < 0 || h < 0 {
        return Err(format!("negative size {s:?}"));
    }
    Ok(Size::new(w, h))
}

/// Parses up to four comma-separated values, e.g. "104,117,123".
pub fn parse_mean(s: &str) -> Result<Scalar, String> {
    let vals = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("{v:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match vals.as_slice() {
        [v] => Ok(Scalar::all(*v)),
        [a, b, c] => Ok(Scalar::new(*a, *b, *c, 0.0)),
        [a, b, c, d] => Ok(Scalar::new(*a, *b, *c, *d)),
        _ => Err(format!("expected 1, 3 or 4 values, got {}", vals.len())),
    }
}

/// Returns the `k` largest values with their indices, largest first.
pub fn top_k(values: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed.truncate(k);
    indexed
}
