//! Textual wire representation of tables
//!
//! A wire table is a JSON object carrying the encoded numeric payload under a
//! caller-chosen key plus the two label lists:
//!
//! ```text
//! {"data": "{\"__ndarray__\": [[1, 2], [3, 4]], \"dtype\": \"int64\", \"shape\": [2, 2], \"Corder\": true}",
//!  "rows": [0, 1], "cols": ["a", "b"]}
//! ```
//!
//! The payload is itself JSON text in the `__ndarray__` layout written by
//! Python's json_tricks, so Python clients can produce and consume it directly.
//! Non-finite floats are written as the strings `"NaN"`, `"Infinity"` and
//! `"-Infinity"`; the bare tokens Python emits are accepted on input.

use super::{Label, Table, Values};
use ndarray::Array2;
use serde_json::{json, Map, Value};
use std::borrow::Cow;
use thiserror::Error;

/// Encoded table text
pub type WireTable = String;

const NDARRAY_KEY: &str = "__ndarray__";
const ROWS_KEY: &str = "rows";
const COLS_KEY: &str = "cols";

const NON_FINITE_TOKENS: [&str; 3] = ["NaN", "Infinity", "-Infinity"];

/// Decoding errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload is not valid JSON: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("payload has no `{0}` field")]
    MissingField(String),

    #[error("unsupported payload type: {0}")]
    UnsupportedType(String),

    #[error("invalid table shape: {0}")]
    Shape(String),

    #[error("invalid cell value: {0}")]
    Cell(String),

    #[error("invalid {axis} labels: {reason}")]
    Labels { axis: &'static str, reason: String },
}

/// Encodes and decodes tables under a fixed payload key
#[derive(Debug, Clone, Copy)]
pub struct TableCodec {
    key: &'static str,
}

impl TableCodec {
    pub const fn new(key: &'static str) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Encode a table into its wire text
    pub fn encode(&self, table: &Table) -> WireTable {
        let (nrows, ncols) = table.shape();
        let data = match table.values() {
            Values::Int(a) => Value::Array(
                a.outer_iter()
                    .map(|row| Value::Array(row.iter().map(|v| json!(v)).collect()))
                    .collect(),
            ),
            Values::Float(a) => Value::Array(
                a.outer_iter()
                    .map(|row| Value::Array(row.iter().map(|v| float_to_json(*v)).collect()))
                    .collect(),
            ),
        };

        let payload = json!({
            NDARRAY_KEY: data,
            "dtype": table.dtype().as_str(),
            "shape": [nrows, ncols],
            "Corder": true,
        });

        let mut wire = Map::new();
        wire.insert(self.key.to_string(), Value::String(payload.to_string()));
        wire.insert(ROWS_KEY.to_string(), json!(table.rows()));
        wire.insert(COLS_KEY.to_string(), json!(table.cols()));
        Value::Object(wire).to_string()
    }

    /// Decode wire text into a table
    pub fn decode(&self, wire: &str) -> Result<Table, CodecError> {
        let mut outer = match serde_json::from_str::<Value>(wire)? {
            Value::Object(map) => map,
            other => return Err(CodecError::UnsupportedType(type_name(&other).to_string())),
        };

        let payload = outer
            .remove(self.key)
            .ok_or_else(|| CodecError::MissingField(self.key.to_string()))?;

        let array = match payload {
            Value::String(text) => serde_json::from_str::<Value>(&normalize_non_finite(&text))?,
            value @ (Value::Array(_) | Value::Object(_)) => value,
            other => return Err(CodecError::UnsupportedType(type_name(&other).to_string())),
        };

        let values = values_from_json(array)?;
        let rows = labels_from_json(outer.remove(ROWS_KEY), "row")?;
        let cols = labels_from_json(outer.remove(COLS_KEY), "column")?;

        Table::new(values, rows, cols).map_err(|e| CodecError::Shape(e.to_string()))
    }
}

fn float_to_json(v: f64) -> Value {
    if v.is_nan() {
        Value::String("NaN".to_string())
    } else if v.is_infinite() && v > 0.0 {
        Value::String("Infinity".to_string())
    } else if v.is_infinite() {
        Value::String("-Infinity".to_string())
    } else {
        json!(v)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Quote bare `NaN` / `Infinity` / `-Infinity` tokens outside of strings.
fn normalize_non_finite(text: &str) -> Cow<'_, str> {
    if !text.contains("NaN") && !text.contains("Infinity") {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    let mut skip_to = 0;

    for (i, c) in text.char_indices() {
        if i < skip_to {
            continue;
        }
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            continue;
        }
        let rest = &text[i..];
        if let Some(token) = NON_FINITE_TOKENS.iter().find(|t| rest.starts_with(**t)) {
            out.push('"');
            out.push_str(token);
            out.push('"');
            skip_to = i + token.len();
            continue;
        }
        out.push(c);
    }

    Cow::Owned(out)
}

#[derive(Debug, Clone, Copy)]
enum Cell {
    Int(i64),
    Float(f64),
}

impl Cell {
    fn as_f64(self) -> f64 {
        match self {
            Cell::Int(v) => v as f64,
            Cell::Float(v) => v,
        }
    }
}

fn cell_from_json(value: &Value) -> Result<Cell, CodecError> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Cell::Int(i))
            } else {
                n.as_f64()
                    .map(Cell::Float)
                    .ok_or_else(|| CodecError::Cell(n.to_string()))
            }
        }
        Value::Null => Ok(Cell::Float(f64::NAN)),
        Value::Bool(b) => Ok(Cell::Int(i64::from(*b))),
        Value::String(s) => match s.as_str() {
            "NaN" | "nan" => Ok(Cell::Float(f64::NAN)),
            "Infinity" | "inf" => Ok(Cell::Float(f64::INFINITY)),
            "-Infinity" | "-inf" => Ok(Cell::Float(f64::NEG_INFINITY)),
            other => Err(CodecError::Cell(format!("{:?}", other))),
        },
        other => Err(CodecError::Cell(type_name(other).to_string())),
    }
}

/// Requested element type from a json_tricks `dtype` string
fn integer_dtype(dtype: &str) -> Result<bool, CodecError> {
    if dtype.starts_with("int") || dtype.starts_with("uint") || dtype == "bool" {
        Ok(true)
    } else if dtype.starts_with("float") {
        Ok(false)
    } else {
        Err(CodecError::UnsupportedType(format!("dtype {}", dtype)))
    }
}

fn values_from_json(value: Value) -> Result<Values, CodecError> {
    let (data, dtype, declared_shape) = match value {
        Value::Object(mut map) => {
            let data = map
                .remove(NDARRAY_KEY)
                .ok_or_else(|| CodecError::UnsupportedType("object without array data".to_string()))?;
            let dtype = map.get("dtype").and_then(Value::as_str).map(str::to_string);
            let shape = map.get("shape").and_then(Value::as_array).map(|dims| {
                dims.iter()
                    .filter_map(Value::as_u64)
                    .map(|d| d as usize)
                    .collect::<Vec<_>>()
            });
            (data, dtype, shape)
        }
        array @ Value::Array(_) => (array, None, None),
        other => return Err(CodecError::UnsupportedType(type_name(&other).to_string())),
    };

    let items = match data {
        Value::Array(items) => items,
        other => return Err(CodecError::UnsupportedType(type_name(&other).to_string())),
    };

    let (nrows, ncols, cells) = grid_from_items(&items, declared_shape.as_deref())?;

    if let Some(shape) = &declared_shape {
        let matches = match shape.as_slice() {
            [r, c] => *r == nrows && *c == ncols,
            [n] => *n == nrows && ncols == 1,
            _ => false,
        };
        if !matches {
            return Err(CodecError::Shape(format!(
                "declared shape {:?} does not match data {}x{}",
                shape, nrows, ncols
            )));
        }
    }

    let integer = match dtype.as_deref() {
        Some(dtype) => integer_dtype(dtype)?,
        None => cells.iter().all(|c| matches!(c, Cell::Int(_))),
    };

    if integer {
        let ints = cells
            .iter()
            .map(|c| match *c {
                Cell::Int(v) => Ok(v),
                Cell::Float(v) if v.fract() == 0.0 && v.is_finite() => Ok(v as i64),
                Cell::Float(v) => Err(CodecError::Cell(format!("{} in integer table", v))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Array2::from_shape_vec((nrows, ncols), ints)
            .map(Values::Int)
            .map_err(|e| CodecError::Shape(e.to_string()))
    } else {
        let floats = cells.iter().map(|c| c.as_f64()).collect();
        Array2::from_shape_vec((nrows, ncols), floats)
            .map(Values::Float)
            .map_err(|e| CodecError::Shape(e.to_string()))
    }
}

/// Flatten a 1-D or 2-D JSON array into row-major cells.
fn grid_from_items(
    items: &[Value],
    declared_shape: Option<&[usize]>,
) -> Result<(usize, usize, Vec<Cell>), CodecError> {
    if items.is_empty() {
        let ncols = match declared_shape {
            Some([0, c]) => *c,
            _ => 0,
        };
        return Ok((0, ncols, Vec::new()));
    }

    let nested = items.iter().filter(|v| v.is_array()).count();

    if nested == 0 {
        // 1-D array: a single column
        let cells = items.iter().map(cell_from_json).collect::<Result<Vec<_>, _>>()?;
        return Ok((cells.len(), 1, cells));
    }
    if nested != items.len() {
        return Err(CodecError::Shape("mixed scalars and rows".to_string()));
    }

    let mut ncols = None;
    let mut cells = Vec::new();
    for row in items {
        let row = row.as_array().map(Vec::as_slice).unwrap_or_default();
        match ncols {
            None => ncols = Some(row.len()),
            Some(n) if n != row.len() => {
                return Err(CodecError::Shape(format!(
                    "ragged rows ({} and {} columns)",
                    n,
                    row.len()
                )))
            }
            Some(_) => {}
        }
        for value in row {
            if value.is_array() {
                return Err(CodecError::Shape("more than 2 dimensions".to_string()));
            }
            cells.push(cell_from_json(value)?);
        }
    }

    Ok((items.len(), ncols.unwrap_or(0), cells))
}

fn labels_from_json(value: Option<Value>, axis: &'static str) -> Result<Option<Vec<Label>>, CodecError> {
    let items = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(CodecError::Labels {
                axis,
                reason: format!("expected a list, got {}", type_name(&other)),
            })
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(Label::Str(s)),
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(Label::Int)
                .ok_or_else(|| CodecError::Labels {
                    axis,
                    reason: format!("non-integer label {}", n),
                }),
            other => Err(CodecError::Labels {
                axis,
                reason: format!("unsupported label type {}", type_name(&other)),
            }),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Dtype;
    use ndarray::array;

    const DATA: TableCodec = TableCodec::new("data");

    #[test]
    fn test_round_trip_int_table() {
        let table = Table::new(
            Values::Int(array![[1, 2], [3, 4]]),
            Some(vec!["r1".into(), "r2".into()]),
            Some(vec!["a".into(), Label::Int(9)]),
        )
        .unwrap();

        let decoded = DATA.decode(&DATA.encode(&table)).unwrap();
        assert_eq!(decoded, table);
        assert_eq!(decoded.dtype(), Dtype::Int64);
    }

    #[test]
    fn test_round_trip_non_finite_floats() {
        let table = Table::from_floats(array![
            [f64::NAN, f64::INFINITY],
            [f64::NEG_INFINITY, 1.5],
            [0.0, -2.0]
        ]);

        let decoded = DATA.decode(&DATA.encode(&table)).unwrap();
        assert_eq!(decoded, table);
        assert_eq!(decoded.dtype(), Dtype::Float64);
    }

    #[test]
    fn test_float_table_with_integral_values_stays_float() {
        let table = Table::from_floats(array![[1.0, 2.0]]);
        let decoded = DATA.decode(&DATA.encode(&table)).unwrap();
        assert_eq!(decoded.dtype(), Dtype::Float64);
    }

    #[test]
    fn test_decode_python_non_finite_tokens() {
        let inner = r#"{"__ndarray__": [[NaN, Infinity], [-Infinity, 1.0]], "dtype": "float64", "shape": [2, 2], "Corder": true}"#;
        let wire = json!({ "data": inner }).to_string();

        let table = DATA.decode(&wire).unwrap();
        let values = table.values().to_f64();
        assert!(values[[0, 0]].is_nan());
        assert_eq!(values[[0, 1]], f64::INFINITY);
        assert_eq!(values[[1, 0]], f64::NEG_INFINITY);
        assert_eq!(values[[1, 1]], 1.0);
    }

    #[test]
    fn test_non_finite_tokens_inside_strings_untouched() {
        let normalized = normalize_non_finite(r#"{"k": "NaN and \"Infinity\"", "v": NaN}"#);
        assert_eq!(normalized, r#"{"k": "NaN and \"Infinity\"", "v": "NaN"}"#);
    }

    #[test]
    fn test_decode_bare_nested_list() {
        let wire = json!({ "data": "[[1, 2.5], [3, 4]]" }).to_string();
        let table = DATA.decode(&wire).unwrap();
        assert_eq!(table.dtype(), Dtype::Float64);
        assert_eq!(table.shape(), (2, 2));
    }

    #[test]
    fn test_decode_inline_array_payload() {
        let wire = json!({ "data": [[1, 2], [3, 4]], "cols": ["a", "b"] }).to_string();
        let table = DATA.decode(&wire).unwrap();
        assert_eq!(table.dtype(), Dtype::Int64);
        assert_eq!(table.cols(), &[Label::from("a"), Label::from("b")]);
    }

    #[test]
    fn test_decode_one_dimensional_as_column() {
        let wire = json!({ "data": r#"{"__ndarray__": [1, 0, 1], "dtype": "int64", "shape": [3]}"# }).to_string();
        let table = DATA.decode(&wire).unwrap();
        assert_eq!(table.shape(), (3, 1));
    }

    #[test]
    fn test_rows_without_cols_defaults_cols() {
        let wire = json!({ "data": "[[1, 2, 3]]", "rows": ["only"] }).to_string();
        let table = DATA.decode(&wire).unwrap();
        assert_eq!(table.rows(), &[Label::from("only")]);
        assert_eq!(table.cols(), Label::range(3).as_slice());
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(DATA.decode("{not json"), Err(CodecError::MalformedPayload(_))));

        let wire = json!({ "data": "[[1, 2" }).to_string();
        assert!(matches!(DATA.decode(&wire), Err(CodecError::MalformedPayload(_))));
    }

    #[test]
    fn test_missing_field() {
        let wire = json!({ "features": "[[1]]" }).to_string();
        match DATA.decode(&wire) {
            Err(CodecError::MissingField(field)) => assert_eq!(field, "data"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_types() {
        assert!(matches!(DATA.decode("[1, 2]"), Err(CodecError::UnsupportedType(_))));

        let wire = json!({ "data": 5 }).to_string();
        assert!(matches!(DATA.decode(&wire), Err(CodecError::UnsupportedType(_))));

        let wire = json!({ "data": "42" }).to_string();
        assert!(matches!(DATA.decode(&wire), Err(CodecError::UnsupportedType(_))));

        let wire = json!({ "data": r#"{"__ndarray__": [[1]], "dtype": "complex128"}"# }).to_string();
        assert!(matches!(DATA.decode(&wire), Err(CodecError::UnsupportedType(_))));
    }

    #[test]
    fn test_shape_errors() {
        let ragged = json!({ "data": "[[1, 2], [3]]" }).to_string();
        assert!(matches!(DATA.decode(&ragged), Err(CodecError::Shape(_))));

        let cube = json!({ "data": "[[[1]]]" }).to_string();
        assert!(matches!(DATA.decode(&cube), Err(CodecError::Shape(_))));

        let labels = json!({ "data": "[[1, 2]]", "cols": ["a"] }).to_string();
        assert!(matches!(DATA.decode(&labels), Err(CodecError::Shape(_))));

        let declared = json!({ "data": r#"{"__ndarray__": [[1, 2]], "shape": [2, 2]}"# }).to_string();
        assert!(matches!(DATA.decode(&declared), Err(CodecError::Shape(_))));
    }

    #[test]
    fn test_invalid_labels_and_cells() {
        let labels = json!({ "data": "[[1]]", "rows": "r" }).to_string();
        assert!(matches!(DATA.decode(&labels), Err(CodecError::Labels { .. })));

        let cells = json!({ "data": r#"[["x"]]"# }).to_string();
        assert!(matches!(DATA.decode(&cells), Err(CodecError::Cell(_))));
    }

    #[test]
    fn test_encoded_payload_layout() {
        let codec = TableCodec::new("predictions");
        let wire = codec.encode(&Table::from_ints(array![[7]]));
        let outer: Value = serde_json::from_str(&wire).unwrap();

        let inner: Value = serde_json::from_str(outer["predictions"].as_str().unwrap()).unwrap();
        assert_eq!(inner["__ndarray__"], json!([[7]]));
        assert_eq!(inner["dtype"], "int64");
        assert_eq!(inner["shape"], json!([1, 1]));
        assert_eq!(outer["rows"], json!([0]));
        assert_eq!(outer["cols"], json!([0]));
    }
}
