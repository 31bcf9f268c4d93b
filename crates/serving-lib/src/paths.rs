//! Filesystem layout of the predictor service

use std::path::{Path, PathBuf};
use tracing::info;

/// Directories and files the predictor reads and writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePaths {
    pub models_dir: PathBuf,
    pub database_file: PathBuf,
}

impl ServicePaths {
    pub fn new(models_dir: impl Into<PathBuf>, database_file: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            database_file: database_file.into(),
        }
    }

    /// Create the models directory and the database's parent directory
    pub fn ensure_structure(&self) -> std::io::Result<()> {
        for dir in [Some(self.models_dir.as_path()), self.database_file.parent()]
            .into_iter()
            .flatten()
            .filter(|dir| !dir.as_os_str().is_empty())
        {
            ensure_dir(dir)?;
        }
        Ok(())
    }
}

fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    if !dir.is_dir() {
        std::fs::create_dir_all(dir)?;
        info!(path = %dir.display(), "Created directory");
    }
    Ok(())
}
