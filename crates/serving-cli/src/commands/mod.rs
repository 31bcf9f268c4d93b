pub mod featurize;
pub mod model;
pub mod predict;

use anyhow::{Context, Result};
use serving_lib::table::CodecError;
use serving_lib::{Table, TableCodec};
use std::path::Path;

/// Key tables are written under in input files
const FILE_CODEC: TableCodec = TableCodec::new("data");

/// Read a table file `{"data": [[...]], "rows": [...], "cols": [...]}`;
/// the payload may also sit under `fallback`'s key.
pub fn read_table(path: &Path, fallback: TableCodec) -> Result<Table> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let table = match FILE_CODEC.decode(&text) {
        Err(CodecError::MissingField(_)) => fallback.decode(&text),
        other => other,
    };
    table.with_context(|| format!("Invalid table in {}", path.display()))
}

/// Inline value, or the contents of a file when written `@path`
pub fn read_argument(value: &str) -> Result<String> {
    match value.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path)),
        None => Ok(value.to_string()),
    }
}
