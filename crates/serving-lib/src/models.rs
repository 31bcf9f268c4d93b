//! Request arguments and response bodies shared by the services and the CLI

use crate::registry::DocId;
use crate::table::WireTable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Flat request arguments (query string, form or JSON body)
pub type RawArgs = HashMap<String, String>;

/// Argument value, treating empty strings as absent
fn arg(args: &RawArgs, name: &str) -> Option<String> {
    args.get(name).filter(|v| !v.is_empty()).cloned()
}

/// `POST /featurize` arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeaturizeArgs {
    pub data: Option<WireTable>,
    pub meta: Option<String>,
    pub configuration: Option<String>,
}

impl FeaturizeArgs {
    pub fn from_args(args: &RawArgs) -> Self {
        Self {
            data: arg(args, "data"),
            meta: arg(args, "meta"),
            configuration: arg(args, "configuration"),
        }
    }
}

/// `POST /featurize` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturizeResponse {
    pub configuration: String,
    pub data: WireTable,
    pub features: WireTable,
}

/// `POST /predict` arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictArgs {
    pub features: Option<WireTable>,
    pub model: Option<String>,
    /// Return class probabilities instead of predictions
    pub proba: Option<String>,
}

impl PredictArgs {
    pub fn from_args(args: &RawArgs) -> Self {
        Self {
            features: arg(args, "features"),
            model: arg(args, "model"),
            proba: arg(args, "proba"),
        }
    }

    /// `proba` interpreted as a flag
    pub fn wants_proba(&self) -> bool {
        matches!(
            self.proba.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("1" | "true" | "yes" | "on")
        )
    }
}

/// `POST /predict` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub model: String,
    pub features: WireTable,
    pub predictions: WireTable,
}

/// `/model` arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelArgs {
    /// Model configuration JSON text for writes, model name for reads
    pub model: Option<String>,
}

impl ModelArgs {
    pub fn from_args(args: &RawArgs) -> Self {
        Self {
            model: arg(args, "model"),
        }
    }
}

/// Store ids touched by a write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordIds {
    One(DocId),
    Many(Vec<DocId>),
}

impl RecordIds {
    pub fn to_vec(&self) -> Vec<DocId> {
        match self {
            RecordIds::One(id) => vec![*id],
            RecordIds::Many(ids) => ids.clone(),
        }
    }
}

/// `POST`/`PUT /model` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWriteResponse {
    pub id: RecordIds,
    pub model: String,
}

/// `GET /model` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReadResponse {
    /// Stored configuration as JSON text
    pub record: String,
    pub model: String,
}

/// Failure body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Numeric status code as text
    pub status: String,
    pub message: String,
}
