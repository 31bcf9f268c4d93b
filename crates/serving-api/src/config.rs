//! Service configuration
//!
//! Each service reads an optional config file (`SERVING_CONFIG`, default
//! `config/<service>` with any extension the `config` crate knows), then
//! environment variables under its own prefix.

use anyhow::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Env var naming the features extraction backend
pub const LIBRARY_ENV: &str = "FEATURES_EXTRACTION_LIBRARY";

/// Env var naming the config file
pub const CONFIG_FILE_ENV: &str = "SERVING_CONFIG";

/// Featurizer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeaturizerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Features extraction backend name
    #[serde(default)]
    pub features_extraction_library: Option<String>,
}

/// Predictor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PredictorConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding `<name>.<extension>` artifacts
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Model registry database file
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Backend providing the artifact format
    #[serde(default = "default_artifact_format")]
    pub artifact_format: String,

    /// Keep deserialized predictors between requests
    #[serde(default)]
    pub cache_predictors: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("ml").join("models")
}

fn default_database() -> PathBuf {
    PathBuf::from("database").join("database.json")
}

fn default_artifact_format() -> String {
    "onnx".to_string()
}

fn config_file(service: &str) -> String {
    std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| format!("config/{}", service))
}

fn build(
    file: &str,
    prefix: &str,
    env: Option<HashMap<String, String>>,
) -> Result<config::Config> {
    Ok(config::Config::builder()
        .add_source(config::File::with_name(file).required(false))
        .add_source(
            config::Environment::with_prefix(prefix)
                .try_parsing(true)
                .source(env),
        )
        .build()?)
}

impl FeaturizerConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        Self::load_from(
            &config_file("featurizer"),
            None,
            std::env::var(LIBRARY_ENV).ok(),
        )
    }

    /// `env` replaces the process environment when given; `library`
    /// overrides any configured backend name.
    pub fn load_from(
        file: &str,
        env: Option<HashMap<String, String>>,
        library: Option<String>,
    ) -> Result<Self> {
        let mut config: Self = build(file, "FEATURIZER", env)?.try_deserialize()?;
        if let Some(library) = library.filter(|l| !l.trim().is_empty()) {
            config.features_extraction_library = Some(library);
        }
        Ok(config)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PredictorConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file("predictor"), None)
    }

    pub fn load_from(file: &str, env: Option<HashMap<String, String>>) -> Result<Self> {
        Ok(build(file, "PREDICTOR", env)?.try_deserialize()?)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let config = PredictorConfig::load_from("does/not/exist", env(&[])).unwrap();
        assert_eq!(config.addr(), "127.0.0.1:5000");
        assert_eq!(config.models_dir, PathBuf::from("ml/models"));
        assert_eq!(config.database, PathBuf::from("database/database.json"));
        assert_eq!(config.artifact_format, "onnx");
        assert!(!config.cache_predictors);
    }

    #[test]
    fn test_prefixed_environment() {
        let config = PredictorConfig::load_from(
            "does/not/exist",
            env(&[
                ("PREDICTOR_PORT", "5001"),
                ("PREDICTOR_ARTIFACT_FORMAT", "linear"),
                ("PREDICTOR_CACHE_PREDICTORS", "true"),
                ("FEATURIZER_PORT", "6000"),
            ]),
        )
        .unwrap();
        assert_eq!(config.port, 5001);
        assert_eq!(config.artifact_format, "linear");
        assert!(config.cache_predictors);
    }

    #[test]
    fn test_file_then_environment() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("featurizer.toml");
        std::fs::write(
            &file,
            "port = 7000\nfeatures_extraction_library = \"elementwise\"\n",
        )
        .unwrap();
        let file = file.to_string_lossy().to_string();

        let config =
            FeaturizerConfig::load_from(&file, env(&[("FEATURIZER_HOST", "0.0.0.0")]), None)
                .unwrap();
        assert_eq!(config.addr(), "0.0.0.0:7000");
        assert_eq!(
            config.features_extraction_library.as_deref(),
            Some("elementwise")
        );

        let config = FeaturizerConfig::load_from(&file, env(&[]), Some("summary".into())).unwrap();
        assert_eq!(config.features_extraction_library.as_deref(), Some("summary"));
    }
}
