//! Payload decoding: JSON bodies, parquet tables and CSV tables.
//!
//! Parquet payloads are written by pandas on the server. The index column is
//! found through the `pandas` schema metadata (`index_columns`); without it
//! rows get a `0..n` range index. Every other column becomes a frame column
//! labelled by its field name. The frames returned here are in wire
//! orientation; transposition is the caller's decision.
//!
//! CSV payloads take their first column as the index. Cells are read as
//! text and classified afterwards so that numeric literals survive verbatim
//! as [`Cell::Decimal`].

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use bytes::Bytes;
use ertdata_types::{Cell, Frame, Label};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::{Map, Value};

use crate::DecodeError;

/// Schema metadata key under which pandas stores its table description.
pub const PANDAS_METADATA_KEY: &str = "pandas";

pub fn json_object(body: &[u8]) -> Result<Map<String, Value>, DecodeError> {
    match serde_json::from_slice(body)? {
        Value::Object(map) => Ok(map),
        other => Err(unexpected("a JSON object", &other)),
    }
}

pub fn json_array(body: &[u8]) -> Result<Vec<Value>, DecodeError> {
    match serde_json::from_slice(body)? {
        Value::Array(items) => Ok(items),
        other => Err(unexpected("a JSON array", &other)),
    }
}

/// A JSON array whose items are all objects.
pub fn json_object_array(body: &[u8]) -> Result<Vec<Map<String, Value>>, DecodeError> {
    json_array(body)?
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            other => Err(unexpected("an array of JSON objects", &other)),
        })
        .collect()
}

pub(crate) fn unexpected(expected: &'static str, found: &Value) -> DecodeError {
    let found = match found {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    };
    DecodeError::UnexpectedShape {
        expected,
        found: found.to_string(),
    }
}

#[derive(Debug, PartialEq)]
enum IndexLayout {
    Column(String),
    Range { start: i64, step: i64 },
}

fn pandas_index_layout(schema: &Schema) -> IndexLayout {
    let default = IndexLayout::Range { start: 0, step: 1 };
    let Some(raw) = schema.metadata().get(PANDAS_METADATA_KEY) else {
        return default;
    };
    let Ok(metadata) = serde_json::from_str::<Value>(raw) else {
        return default;
    };
    match metadata
        .get("index_columns")
        .and_then(Value::as_array)
        .and_then(|columns| columns.first())
    {
        Some(Value::String(name)) if schema.field_with_name(name).is_ok() => IndexLayout::Column(name.clone()),
        Some(Value::Object(range)) if range.get("kind").and_then(Value::as_str) == Some("range") => IndexLayout::Range {
            start: range.get("start").and_then(Value::as_i64).unwrap_or(0),
            step: range.get("step").and_then(Value::as_i64).unwrap_or(1),
        },
        _ => default,
    }
}

/// Decode a parquet payload into a frame in wire orientation.
pub fn parquet_frame(body: Bytes) -> Result<Frame, DecodeError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(body)?;
    let schema = builder.schema().clone();
    let layout = pandas_index_layout(&schema);
    let reader = builder.build()?;

    let index_position = match &layout {
        IndexLayout::Column(name) => schema.index_of(name).ok(),
        IndexLayout::Range { .. } => None,
    };
    let mut index_cells: Vec<Cell> = Vec::new();
    let mut columns: Vec<(Label, Vec<Cell>)> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(position, _)| Some(*position) != index_position)
        .map(|(_, field)| (Label::Text(field.name().clone()), Vec::new()))
        .collect();

    let mut row_count = 0_usize;
    for batch in reader {
        let batch = batch?;
        row_count += batch.num_rows();
        let mut data_columns = columns.iter_mut();
        for (position, array) in batch.columns().iter().enumerate() {
            let cells = column_cells(array)?;
            if Some(position) == index_position {
                index_cells.extend(cells);
            } else if let Some((_, target)) = data_columns.next() {
                target.extend(cells);
            }
        }
    }

    let index = match layout {
        IndexLayout::Range { start, step } => (0..row_count as i64).map(|row| Label::Int(start + row * step)).collect(),
        IndexLayout::Column(_) => index_cells.into_iter().map(label_from_cell).collect(),
    };
    Ok(Frame::from_columns(index, columns)?)
}

fn column_cells(array: &ArrayRef) -> Result<Vec<Cell>, DecodeError> {
    let data_type = array.data_type();
    let cells = if data_type.is_integer() {
        let ints = cast(array, &DataType::Int64)?;
        ints.as_primitive::<Int64Type>()
            .iter()
            .map(|value| value.map_or(Cell::Null, Cell::Int))
            .collect()
    } else if data_type.is_floating() {
        let floats = cast(array, &DataType::Float64)?;
        floats
            .as_primitive::<Float64Type>()
            .iter()
            .map(|value| value.map_or(Cell::Null, Cell::Float))
            .collect()
    } else if *data_type == DataType::Boolean {
        array
            .as_boolean()
            .iter()
            .map(|value| value.map_or(Cell::Null, Cell::Bool))
            .collect()
    } else if matches!(data_type, DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View) {
        let text = cast(array, &DataType::Utf8)?;
        text.as_string::<i32>()
            .iter()
            .map(|value| value.map_or(Cell::Null, |text| Cell::Text(text.to_string())))
            .collect()
    } else {
        // Timestamps, dates and anything else keep their display form.
        let options = FormatOptions::default();
        let formatter = ArrayFormatter::try_new(array.as_ref(), &options)?;
        (0..array.len())
            .map(|row| {
                if array.is_null(row) {
                    Cell::Null
                } else {
                    Cell::Text(formatter.value(row).to_string())
                }
            })
            .collect()
    };
    Ok(cells)
}

fn label_from_cell(cell: Cell) -> Label {
    match cell {
        Cell::Int(value) => Label::Int(value),
        Cell::Text(text) | Cell::Decimal(text) => Label::Text(text),
        Cell::Float(value) => Label::Text(value.to_string()),
        Cell::Bool(value) => Label::Text(value.to_string()),
        Cell::Null => Label::Text(String::new()),
    }
}

/// Decode a CSV payload, first column as index, without transposing.
pub fn csv_frame(body: &[u8]) -> Result<Frame, DecodeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Frame::empty());
    }

    let (inferred, _) = Format::default().with_header(true).infer_schema(body, None)?;
    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|field| Field::new(field.name(), DataType::Utf8, true))
        .collect();
    if fields.is_empty() {
        return Ok(Frame::empty());
    }
    let schema = Arc::new(Schema::new(fields));
    let reader = ReaderBuilder::new(Arc::clone(&schema)).with_header(true).build(body)?;

    let mut index: Vec<Label> = Vec::new();
    let mut columns: Vec<(Label, Vec<Cell>)> = schema
        .fields()
        .iter()
        .skip(1)
        .map(|field| (Label::Text(field.name().clone()), Vec::new()))
        .collect();

    for batch in reader {
        let batch = batch?;
        for (position, array) in batch.columns().iter().enumerate() {
            let values = array.as_string::<i32>();
            if position == 0 {
                index.extend(values.iter().map(index_label));
            } else if let Some((_, target)) = columns.get_mut(position - 1) {
                target.extend(values.iter().map(literal_cell));
            }
        }
    }

    Ok(Frame::from_columns(index, columns)?)
}

fn index_label(text: Option<&str>) -> Label {
    let text = text.unwrap_or_default().trim();
    match text.parse::<i64>() {
        Ok(value) => Label::Int(value),
        Err(_) => Label::Text(text.to_string()),
    }
}

/// Classify a CSV field without losing the digits of numeric literals.
fn literal_cell(text: Option<&str>) -> Cell {
    let Some(text) = text.map(str::trim).filter(|text| !text.is_empty()) else {
        return Cell::Null;
    };
    if let Ok(value) = text.parse::<i64>() {
        return Cell::Int(value);
    }
    if text.parse::<f64>().is_ok() {
        return Cell::Decimal(text.to_string());
    }
    match text {
        "True" | "true" => Cell::Bool(true),
        "False" | "false" => Cell::Bool(false),
        _ => Cell::Text(text.to_string()),
    }
}
