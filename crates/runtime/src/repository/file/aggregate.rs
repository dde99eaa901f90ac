//! File-based AggregateRepository implementation.

use std::fs;
use std::path::{Path, PathBuf};

use crate::metrics::AggregateDocument;
use crate::repository::{AggregateRepository, RepositoryError, Result};

const FILE_NAME: &str = "rollout_metrics.json";

/// Stores the aggregate document as pretty JSON in a single file.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous document intact.
pub struct FileAggregateRepository {
    path: PathBuf,
}

impl FileAggregateRepository {
    /// Repository at `path`, creating its parent directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(RepositoryError::Io)?;
        }
        Ok(Self { path })
    }

    /// Repository inside `dir` using the default file name.
    pub fn in_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Self::new(dir.as_ref().join(FILE_NAME))
    }

    /// Platform data directory for guard rollout metrics.
    ///
    /// - macOS: `~/Library/Application Support/guard-ai`
    /// - Linux: `~/.local/share/guard-ai` (or `$XDG_DATA_HOME/guard-ai`)
    /// - Windows: `%APPDATA%\guard-ai`
    pub fn default_dir() -> Result<PathBuf> {
        directories::ProjectDirs::from("", "", "guard-ai")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(RepositoryError::NoDataDir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AggregateRepository for FileAggregateRepository {
    fn load(&self) -> Result<AggregateDocument> {
        if !self.path.exists() {
            return Ok(AggregateDocument::default());
        }

        let json = fs::read_to_string(&self.path).map_err(RepositoryError::Io)?;
        let document: AggregateDocument =
            serde_json::from_str(&json).map_err(|e| RepositoryError::Json(e.to_string()))?;

        tracing::debug!("Loaded rollout aggregates: {}", self.path.display());
        Ok(document)
    }

    fn save(&self, document: &AggregateDocument) -> Result<()> {
        let temp_path = self.path.with_extension("json.tmp");

        // Write to temp file
        let json = serde_json::to_string_pretty(document)
            .map_err(|e| RepositoryError::Json(e.to_string()))?;
        fs::write(&temp_path, json).map_err(RepositoryError::Io)?;

        // Atomic rename
        fs::rename(&temp_path, &self.path).map_err(RepositoryError::Io)?;

        tracing::debug!("Saved rollout aggregates: {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_empty_document() {
        let dir = TempDir::new().unwrap();
        let repo = FileAggregateRepository::in_dir(dir.path().join("nested")).unwrap();
        assert!(repo.load().unwrap().is_empty());
    }

    #[test]
    fn corrupted_file_is_a_json_error() {
        let dir = TempDir::new().unwrap();
        let repo = FileAggregateRepository::in_dir(dir.path()).unwrap();
        fs::write(repo.path(), "{ not json").unwrap();
        assert!(matches!(repo.load(), Err(RepositoryError::Json(_))));
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let repo = FileAggregateRepository::in_dir(dir.path()).unwrap();
        repo.save(&AggregateDocument::default()).unwrap();
        assert!(repo.path().exists());
        assert!(!repo.path().with_extension("json.tmp").exists());
    }
}
