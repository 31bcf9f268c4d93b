//! Core library of the featurizer and predictor services
//!
//! This crate provides:
//! - Labeled numeric tables and their JSON wire codec
//! - Pluggable features extraction and artifact format backends
//! - Model configuration registry over a JSON document store
//! - Feature preprocessing and predictor loading
//! - The featurize, predict and model request pipelines
//! - Health checks and observability

pub mod health;
pub mod models;
pub mod observability;
pub mod paths;
pub mod pipeline;
pub mod plugin;
pub mod predictor;
pub mod preprocessing;
pub mod registry;
pub mod table;

pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse};
pub use models::*;
pub use observability::{EventLogger, ServiceMetrics};
pub use paths::ServicePaths;
pub use table::{Label, Table, TableCodec};

use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run plugin-provided code, turning a panic into an error.
pub(crate) fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(anyhow::anyhow!("panicked: {}", message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guarded_catches_panics() {
        let err = guarded::<()>(|| panic!("boom")).unwrap_err();
        assert_eq!(err.to_string(), "panicked: boom");
        assert_eq!(guarded(|| Ok(2)).unwrap(), 2);
    }
}
