//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_URL: &str = "http://127.0.0.1:5000";

/// CLI configuration, `~/.config/servectl/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub featurizer_url: Option<String>,
    pub predictor_url: Option<String>,
    /// Default output format (`table` or `json`)
    pub default_format: Option<String>,
}

impl Config {
    /// Load the user configuration; defaults when there is none
    pub fn load() -> Result<Self> {
        match dirs_next::home_dir() {
            Some(home) => Self::load_from(&Self::config_path(&home)),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        serde_json::from_str(&content).context("Failed to parse config file")
    }

    fn config_path(home: &Path) -> PathBuf {
        home.join(".config").join("servectl").join("config.json")
    }

    pub fn featurizer_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.featurizer_url.clone())
            .unwrap_or_else(|| DEFAULT_URL.to_string())
    }

    pub fn predictor_url(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.predictor_url.clone())
            .unwrap_or_else(|| DEFAULT_URL.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.featurizer_url(None), DEFAULT_URL);
        assert_eq!(config.predictor_url(None), DEFAULT_URL);
    }

    #[test]
    fn test_flag_over_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"featurizer_url": "http://f:5000", "predictor_url": "http://p:5001"}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.featurizer_url(None), "http://f:5000");
        assert_eq!(
            config.predictor_url(Some("http://other:1".into())),
            "http://other:1"
        );
    }
}
