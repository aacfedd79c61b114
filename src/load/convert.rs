use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{Array, ArrayRef, AsArray},
    compute::cast,
    datatypes::{
        DataType, Date32Type, Float64Type, Int64Type, TimeUnit, TimestampMicrosecondType,
    },
    record_batch::RecordBatch,
};
use chrono::{NaiveDate, NaiveDateTime};

/// One value ready to be bound into an `INSERT`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

/// Cast a parsed column into one of the shapes [`cell_at`] knows how to read:
/// Int64, Float64, Boolean, Date32, Timestamp(µs, None), Utf8 or Null.
pub fn normalize_column(arr: &ArrayRef) -> Result<ArrayRef> {
    let target = match arr.data_type() {
        DataType::Null | DataType::Boolean | DataType::Utf8 => return Ok(arr.clone()),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => DataType::Int64,
        DataType::Float16 | DataType::Float32 | DataType::Float64 => DataType::Float64,
        DataType::Date32 | DataType::Date64 => DataType::Date32,
        DataType::Timestamp(_, _) => DataType::Timestamp(TimeUnit::Microsecond, None),
        _ => DataType::Utf8,
    };
    if arr.data_type() == &target {
        return Ok(arr.clone());
    }
    cast(arr, &target).with_context(|| format!("casting {} to {}", arr.data_type(), target))
}

/// Normalize every column of `batch`.
pub fn normalize_batch(batch: &RecordBatch) -> Result<Vec<ArrayRef>> {
    batch.columns().iter().map(normalize_column).collect()
}

/// Read row `row` of a normalized column.
///
/// Dates and timestamps are rendered as `YYYY-MM-DD` / `YYYY-MM-DD HH:MM:SS[.ffffff]`
/// literals, which MySQL converts on insert. Non-finite floats become NULL.
pub fn cell_at(arr: &ArrayRef, row: usize) -> Result<Cell> {
    if arr.is_null(row) {
        return Ok(Cell::Null);
    }
    let cell = match arr.data_type() {
        DataType::Null => Cell::Null,
        DataType::Int64 => Cell::Int(arr.as_primitive::<Int64Type>().value(row)),
        DataType::Float64 => {
            let v = arr.as_primitive::<Float64Type>().value(row);
            if v.is_finite() {
                Cell::Float(v)
            } else {
                Cell::Null
            }
        }
        DataType::Boolean => Cell::Bool(arr.as_boolean().value(row)),
        DataType::Utf8 => Cell::Text(arr.as_string::<i32>().value(row).to_string()),
        DataType::Date32 => arr
            .as_primitive::<Date32Type>()
            .value_as_date(row)
            .map(date_literal)
            .ok_or_else(|| anyhow!("date out of range at row {}", row))?,
        DataType::Timestamp(TimeUnit::Microsecond, None) => arr
            .as_primitive::<TimestampMicrosecondType>()
            .value_as_datetime(row)
            .map(datetime_literal)
            .ok_or_else(|| anyhow!("timestamp out of range at row {}", row))?,
        other => return Err(anyhow!("column type {} was not normalized", other)),
    };
    Ok(cell)
}

fn date_literal(d: NaiveDate) -> Cell {
    Cell::Text(d.format("%Y-%m-%d").to_string())
}

fn datetime_literal(ts: NaiveDateTime) -> Cell {
    Cell::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())
}
