use crate::error::{EngineError, Result};
use std::path::{Path, PathBuf};

/// Name of the engine binary looked up on `PATH` when nothing else is
/// configured.
pub const ENGINE_BINARY_NAME: &str = "qgrep";

/// Environment override for the engine binary path.
pub const ENGINE_PATH_ENV: &str = "SCOUR_ENGINE";

/// Resolves the engine binary: explicit configuration first, then the
/// `SCOUR_ENGINE` environment variable, then `qgrep` on `PATH`. Resolution
/// happens before any state mutation so a missing engine is reported as an
/// environment error, not a mid-operation failure.
pub fn resolve_engine_binary(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(EngineError::BinaryNotFound(path.display().to_string()));
    }

    if let Ok(raw) = std::env::var(ENGINE_PATH_ENV) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let path = PathBuf::from(trimmed);
            if path.is_file() {
                return Ok(path);
            }
            return Err(EngineError::BinaryNotFound(trimmed.to_string()));
        }
    }

    if let Some(found) = find_on_path(ENGINE_BINARY_NAME) {
        return Ok(found);
    }

    Err(EngineError::BinaryNotFound(ENGINE_BINARY_NAME.to_string()))
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{name}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}
