//! Script path resolution.

use crate::assets::AssetError;
use crate::config::Config;
use crate::security::is_core_module;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Directory a module's scripts are served from.
///
/// Module names end up in the path, so anything but a plain identifier is
/// rejected.
pub fn script_dir(config: &Config, module: &str) -> Result<PathBuf, AssetError> {
    if is_core_module(module) {
        return Ok(config.core_script_dir());
    }
    if module.is_empty()
        || !module
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AssetError::InvalidFile);
    }
    Ok(config.module_script_dir(module))
}

/// Resolve `file` below `base` and make sure the result is a regular file
/// that stays inside `base` once symlinks are followed.
pub async fn resolve_script(base: &Path, file: &str) -> Result<PathBuf, AssetError> {
    // Rejected before touching the filesystem
    if file.contains("../") {
        return Err(AssetError::InvalidFile);
    }

    let canonical_base = canonicalize(base).await?;
    let canonical = canonicalize(&base.join(file)).await?;

    if !canonical.starts_with(&canonical_base) {
        return Err(AssetError::InvalidFile);
    }

    let metadata = tokio::fs::metadata(&canonical)
        .await
        .map_err(|_| AssetError::NotFound)?;
    if !metadata.is_file() {
        return Err(AssetError::NotFound);
    }

    Ok(canonical)
}

async fn canonicalize(path: &Path) -> Result<PathBuf, AssetError> {
    tokio::fs::canonicalize(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => AssetError::NotFound,
        _ => AssetError::InvalidFile,
    })
}
