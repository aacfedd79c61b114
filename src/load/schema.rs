use anyhow::{anyhow, Context, Result};
use arrow::{
    csv::reader::Format,
    datatypes::{DataType, Field, Schema},
};
use std::{collections::HashSet, fs::File, path::Path};
use tracing::debug;

use crate::db::quote_ident;

/// CSV dialect shared by inference and reading. Rows shorter than the
/// header are padded with nulls; longer rows are an error.
pub fn csv_format() -> Format {
    Format::default()
        .with_header(true)
        .with_delimiter(b',')
        .with_truncated_rows(true)
}

/// Infer column types from every record in `path`.
///
/// Header names are normalized with [`normalize_headers`]; a file without a
/// header row is rejected.
pub fn infer_csv_schema(path: &Path) -> Result<Schema> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let (inferred, records) = csv_format()
        .infer_schema(file, None)
        .with_context(|| format!("inferring column types of {}", path.display()))?;

    if inferred.fields().is_empty() {
        return Err(anyhow!("no columns to parse from {}", path.display()));
    }
    debug!(file = %path.display(), records, columns = inferred.fields().len(), "inferred schema");

    let raw: Vec<String> = inferred.fields().iter().map(|f| f.name().clone()).collect();
    let names = normalize_headers(&raw);
    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .zip(names)
        .map(|(f, name)| Field::new(name, f.data_type().clone(), true))
        .collect();
    Ok(Schema::new(fields))
}

/// Make header names usable as column names:
///  - blank headers become `Unnamed: <index>`
///  - repeats get `.1`, `.2`, ... appended, skipping names already taken
pub fn normalize_headers(raw: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(raw.len());
    let mut out = Vec::with_capacity(raw.len());

    for (idx, name) in raw.iter().enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {}", idx)
        } else {
            name.clone()
        };

        let mut candidate = base.clone();
        let mut n = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}.{}", base, n);
            n += 1;
        }
        seen.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

/// Map an inferred Arrow type onto a MySQL column type.
///
/// - Int*/UInt*              → BIGINT
/// - Float*                  → DOUBLE
/// - Boolean                 → BOOL
/// - Date32, Date64          → DATE
/// - Timestamp(_, _)         → DATETIME
/// - Utf8, Null, fallback    → TEXT
pub fn sql_column_type(dt: &DataType) -> &'static str {
    match dt {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => "BIGINT",
        DataType::Float16 | DataType::Float32 | DataType::Float64 => "DOUBLE",
        DataType::Boolean => "BOOL",
        DataType::Date32 | DataType::Date64 => "DATE",
        DataType::Timestamp(_, _) => "DATETIME",
        _ => "TEXT",
    }
}

/// `CREATE TABLE` statement for `table` with one nullable column per field.
pub fn create_table_sql(table: &str, schema: &Schema) -> String {
    let columns: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| format!("{} {}", quote_ident(f.name()), sql_column_type(f.data_type())))
        .collect();
    format!("CREATE TABLE {} ({})", quote_ident(table), columns.join(", "))
}
