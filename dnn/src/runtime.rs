//! Process-wide resolution of the shim function table.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;

use crate::config::{DnnConfig, ENV_LIBRARY};
use crate::error::DnnError;
use crate::ffi::DnnApi;

static API: OnceCell<DnnApi> = OnceCell::new();

/// Base name of the shim library, without platform prefix or suffix.
pub const LIBRARY_NAME: &str = "giztoy_dnn";

/// Loads the shim library from `path`.
///
/// Does nothing if a library has already been loaded.
pub fn init(path: impl AsRef<Path>) -> Result<(), DnnError> {
    let path = path.as_ref();
    API.get_or_try_init(|| load(path))?;
    Ok(())
}

/// Loads the shim library named by `cfg`, or the default one.
pub fn init_from_config(cfg: &DnnConfig) -> Result<(), DnnError> {
    match &cfg.library {
        Some(path) => init(path),
        None => api().map(|_| ()),
    }
}

/// Returns true once a function table has been resolved.
pub fn is_initialized() -> bool {
    API.get().is_some()
}

/// Installs a prebuilt table. Returns the table already installed, if any.
#[cfg(test)]
pub(crate) fn install(api: DnnApi) -> &'static DnnApi {
    API.get_or_init(|| api)
}

pub(crate) fn api() -> Result<&'static DnnApi, DnnError> {
    API.get_or_try_init(resolve_default)
}

#[cfg(feature = "bundled")]
fn resolve_default() -> Result<DnnApi, DnnError> {
    tracing::debug!("dnn: using bundled shim");
    Ok(DnnApi::linked())
}

#[cfg(not(feature = "bundled"))]
fn resolve_default() -> Result<DnnApi, DnnError> {
    load(&default_library_path())
}

fn default_library_path() -> PathBuf {
    match std::env::var_os(ENV_LIBRARY) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(libloading::library_filename(LIBRARY_NAME)),
    }
}

fn load(path: &Path) -> Result<DnnApi, DnnError> {
    let api = DnnApi::load(path)?;
    tracing::info!(path = %path.display(), "dnn: shim library loaded");
    Ok(api)
}
