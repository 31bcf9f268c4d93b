//! `/featurize`: raw data table in, features table out

use super::{CodedError, ErrorClass};
use crate::guarded;
use crate::models::{FeaturizeArgs, FeaturizeResponse};
use crate::plugin::{extract_extractor_factory, Backend, ExtractorFactory, Meta};
use crate::table::{CodecError, TableCodec};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Wire key of the raw data table
pub const DATA_CODEC: TableCodec = TableCodec::new("data");

/// Wire key of the features table
pub const FEATURES_CODEC: TableCodec = TableCodec::new("features");

#[derive(Debug, Error)]
pub enum FeaturizeError {
    #[error("Incomplete request args: `data` and `configuration` are required")]
    IncompleteArgs,

    #[error("Features extractor is not importable")]
    ExtractorNotImportable,

    #[error("Unsupported raw data type: {0}")]
    UnsupportedDataType(CodecError),

    #[error("No raw data present: {0}")]
    NoRawData(CodecError),

    #[error("Raw data conversion failed: {0}")]
    DataConversion(CodecError),

    #[error("Unsupported meta type: expected a JSON object")]
    UnsupportedMetaType,

    #[error("Meta conversion failed: {0}")]
    MetaConversion(serde_json::Error),

    #[error("Features extractor failed")]
    ExtractorFailed(anyhow::Error),
}

impl CodedError for FeaturizeError {
    fn code(&self) -> u16 {
        match self {
            FeaturizeError::IncompleteArgs => 401,
            FeaturizeError::ExtractorNotImportable => 402,
            FeaturizeError::UnsupportedDataType(_) => 403,
            FeaturizeError::NoRawData(_) => 404,
            FeaturizeError::DataConversion(_) => 405,
            FeaturizeError::UnsupportedMetaType => 406,
            FeaturizeError::MetaConversion(_) => 407,
            FeaturizeError::ExtractorFailed(_) => 408,
        }
    }

    fn class(&self) -> ErrorClass {
        match self {
            FeaturizeError::ExtractorNotImportable => ErrorClass::Unavailable,
            FeaturizeError::ExtractorFailed(_) => ErrorClass::Computation,
            _ => ErrorClass::ClientInput,
        }
    }
}

impl From<CodecError> for FeaturizeError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnsupportedType(_) => FeaturizeError::UnsupportedDataType(err),
            CodecError::MissingField(_) => FeaturizeError::NoRawData(err),
            _ => FeaturizeError::DataConversion(err),
        }
    }
}

/// Features extraction with the backend resolved at start
pub struct FeaturizePipeline {
    backend: Option<Arc<dyn Backend>>,
}

impl FeaturizePipeline {
    pub fn new(backend: Option<Arc<dyn Backend>>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_deref().map(|b| b.name())
    }

    /// Whether the backend exposes a features extractor
    pub fn is_available(&self) -> bool {
        self.extractor_factory().is_ok()
    }

    fn extractor_factory(&self) -> Result<Arc<dyn ExtractorFactory>, FeaturizeError> {
        let backend = self
            .backend
            .as_deref()
            .ok_or(FeaturizeError::ExtractorNotImportable)?;
        extract_extractor_factory(backend).map_err(|e| {
            error!(error = %e, "Features extractor capability missing");
            FeaturizeError::ExtractorNotImportable
        })
    }

    pub fn run(&self, args: &FeaturizeArgs) -> Result<FeaturizeResponse, FeaturizeError> {
        let (Some(data), Some(configuration)) = (&args.data, &args.configuration) else {
            return Err(FeaturizeError::IncompleteArgs);
        };

        let factory = self.extractor_factory()?;
        let table = DATA_CODEC.decode(data)?;
        let meta = parse_meta(args.meta.as_deref())?;

        debug!(
            configuration = %configuration,
            rows = table.nrows(),
            cols = table.ncols(),
            "Computing features"
        );

        let features = guarded(|| {
            let extractor = factory.create(configuration)?;
            extractor.compute(&table, &meta)
        })
        .map_err(|e| {
            error!(
                configuration = %configuration,
                error = %format!("{:#}", e),
                "Features extractor failed"
            );
            FeaturizeError::ExtractorFailed(e)
        })?;

        Ok(FeaturizeResponse {
            configuration: configuration.clone(),
            data: data.clone(),
            features: FEATURES_CODEC.encode(&features),
        })
    }
}

fn parse_meta(meta: Option<&str>) -> Result<Meta, FeaturizeError> {
    let Some(text) = meta else {
        return Ok(Meta::new());
    };
    match serde_json::from_str(text).map_err(FeaturizeError::MetaConversion)? {
        Value::Object(meta) => Ok(meta),
        _ => Err(FeaturizeError::UnsupportedMetaType),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{
        summary, BackendRegistry, Capability, FeaturesExtractor, StaticBackend,
        FEATURES_EXTRACTOR,
    };
    use crate::table::{Label, Table};
    use anyhow::Result;
    use ndarray::array;

    struct Doubler;

    impl FeaturesExtractor for Doubler {
        fn compute(&self, data: &Table, meta: &Meta) -> Result<Table> {
            if meta.contains_key("explode") {
                panic!("extractor exploded");
            }
            Ok(Table::from_floats(data.values().to_f64().mapv(|v| v * 2.0)))
        }
    }

    struct DoublerFactory;

    impl ExtractorFactory for DoublerFactory {
        fn create(&self, configuration: &str) -> Result<Box<dyn FeaturesExtractor>> {
            if configuration == "bad" {
                anyhow::bail!("unknown configuration");
            }
            Ok(Box::new(Doubler))
        }
    }

    fn pipeline() -> FeaturizePipeline {
        let backend = StaticBackend::new("doubler").with_capability(
            FEATURES_EXTRACTOR,
            Capability::FeaturesExtractor(Arc::new(DoublerFactory)),
        );
        FeaturizePipeline::new(Some(Arc::new(backend)))
    }

    fn args(data: Option<&str>, meta: Option<&str>, configuration: Option<&str>) -> FeaturizeArgs {
        FeaturizeArgs {
            data: data.map(String::from),
            meta: meta.map(String::from),
            configuration: configuration.map(String::from),
        }
    }

    fn data_2x2() -> String {
        DATA_CODEC.encode(&Table::from_ints(array![[1, 2], [3, 4]]))
    }

    fn code(result: Result<FeaturizeResponse, FeaturizeError>) -> u16 {
        result.err().map(|e| e.code()).unwrap_or(200)
    }

    #[test]
    fn test_featurize_2x2() {
        let data = data_2x2();
        let response = pipeline().run(&args(Some(&data), None, Some("cfg1"))).unwrap();

        assert_eq!(response.configuration, "cfg1");
        assert_eq!(response.data, data);
        let features = FEATURES_CODEC.decode(&response.features).unwrap();
        assert_eq!(features.to_rows_f64(), vec![vec![2.0, 4.0], vec![6.0, 8.0]]);
    }

    #[test]
    fn test_required_args_checked_first() {
        let no_backend = FeaturizePipeline::new(None);
        assert_eq!(code(no_backend.run(&args(None, None, Some("cfg")))), 401);
        assert_eq!(code(no_backend.run(&args(Some("x"), None, None))), 401);
    }

    #[test]
    fn test_data_failures() {
        let p = pipeline();
        assert_eq!(code(p.run(&args(Some("[1, 2]"), None, Some("c")))), 403);
        assert_eq!(code(p.run(&args(Some(r#"{"other": 1}"#), None, Some("c")))), 404);
        assert_eq!(code(p.run(&args(Some("{broken"), None, Some("c")))), 405);
        assert_eq!(code(p.run(&args(Some(r#"{"data": [[1], [2, 3]]}"#), None, Some("c")))), 405);
    }

    #[test]
    fn test_meta_failures() {
        let p = pipeline();
        let data = data_2x2();
        assert_eq!(code(p.run(&args(Some(&data), Some("[1]"), Some("c")))), 406);
        assert_eq!(code(p.run(&args(Some(&data), Some("{nope"), Some("c")))), 407);
        assert_eq!(code(p.run(&args(Some(&data), Some(r#"{"k": 1}"#), Some("c")))), 200);
    }

    #[test]
    fn test_missing_backend() {
        let resolved = BackendRegistry::with_builtins().resolve_backend(Some("no_such_library"));
        let p = FeaturizePipeline::new(resolved);
        assert!(!p.is_available());
        assert_eq!(code(p.run(&args(Some(&data_2x2()), None, Some("c")))), 402);
    }

    #[test]
    fn test_backend_resolved_before_decoding() {
        let p = FeaturizePipeline::new(None);
        assert_eq!(code(p.run(&args(Some("{broken"), None, Some("c")))), 402);
        assert_eq!(code(p.run(&args(Some(&data_2x2()), Some("[1]"), Some("c")))), 402);
    }

    #[test]
    fn test_backend_without_extractor() {
        let resolved = BackendRegistry::with_builtins().resolve_backend(Some("onnx"));
        let p = FeaturizePipeline::new(resolved);
        assert_eq!(p.backend_name(), Some("onnx"));
        assert_eq!(code(p.run(&args(Some(&data_2x2()), None, Some("c")))), 402);
    }

    #[test]
    fn test_extractor_failures() {
        let p = pipeline();
        let data = data_2x2();
        assert_eq!(code(p.run(&args(Some(&data), None, Some("bad")))), 408);

        let err = p
            .run(&args(Some(&data), Some(r#"{"explode": true}"#), Some("c")))
            .unwrap_err();
        assert_eq!(err.code(), 408);
        assert_eq!(err.class(), ErrorClass::Computation);
        // Internal detail stays out of the message
        assert_eq!(err.to_string(), "Features extractor failed");
    }

    #[test]
    fn test_summary_backend() {
        let p = FeaturizePipeline::new(Some(summary::backend()));
        let response = p
            .run(&args(Some(&data_2x2()), None, Some("mean,max")))
            .unwrap();
        let features = FEATURES_CODEC.decode(&response.features).unwrap();
        assert_eq!(features.rows(), &[Label::from("mean"), Label::from("max")]);
        assert_eq!(features.to_rows_f64(), vec![vec![2.0, 3.0], vec![3.0, 4.0]]);
    }
}
