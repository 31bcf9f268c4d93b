//! Request argument extraction
//!
//! Arguments may come from the query string, a form-encoded body or a JSON
//! object body. Body arguments override query arguments of the same name;
//! non-string JSON values are kept as their JSON text.

use crate::error::ApiError;
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
};
use serde_json::Value;
use serving_lib::RawArgs;

/// Flat request arguments
#[derive(Debug, Clone, Default)]
pub struct RequestArgs(pub RawArgs);

#[async_trait]
impl<S> FromRequest<S> for RequestArgs
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut args = RawArgs::new();
        if let Some(query) = req.uri().query() {
            args.extend(url::form_urlencoded::parse(query.as_bytes()).into_owned());
        }

        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase().starts_with("application/json"))
            .unwrap_or(false);

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Unreadable request body: {}", e)))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(args));
        }

        if is_json {
            args.extend(json_args(&body)?);
        } else {
            args.extend(url::form_urlencoded::parse(&body).into_owned());
        }
        Ok(Self(args))
    }
}

fn json_args(body: &[u8]) -> Result<RawArgs, ApiError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Malformed JSON body: {}", e)))?;
    let Value::Object(object) = value else {
        return Err(ApiError::bad_request("JSON body must be an object"));
    };

    Ok(object
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}
