//! Platform-specific directory utilities
//!
//! Follows platform conventions for cache and data directories, with
//! `GUARD_AI_DATA_DIR` overriding the data location.

use std::path::PathBuf;

use runtime::FileAggregateRepository;

const APP_NAME: &str = "guard-ai";

/// Get the platform-specific log directory
///
/// - macOS: `~/Library/Caches/guard-ai/logs`
/// - Linux: `~/.cache/guard-ai/logs` (or `$XDG_CACHE_HOME/guard-ai/logs`)
/// - Windows: `%LOCALAPPDATA%\guard-ai\logs`
/// - Fallback: `/tmp/guard-ai/logs`
pub fn log_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("/tmp").join(APP_NAME))
        .join("logs")
}

/// Get the directory holding persisted rollout aggregates
///
/// `GUARD_AI_DATA_DIR` wins; otherwise the platform data directory, falling
/// back to `./guard_data`.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("GUARD_AI_DATA_DIR") {
        return PathBuf::from(dir);
    }
    FileAggregateRepository::default_dir().unwrap_or_else(|_| PathBuf::from("./guard_data"))
}
