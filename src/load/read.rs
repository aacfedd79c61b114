use anyhow::{Context, Result};
use arrow::{
    array::ArrayRef,
    compute::{cast_with_options, CastOptions},
    csv::ReaderBuilder,
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use std::{fs::File, path::Path, sync::Arc};
use tracing::warn;

use crate::load::schema::{csv_format, infer_csv_schema};

/// Every row of one file, already converted to its final column types.
#[derive(Debug)]
pub struct ParsedCsv {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl ParsedCsv {
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

/// Parse the whole of `path` into memory.
///
/// Cells are read as text first, then each column is converted to its
/// inferred type. A column whose values only look like numbers or dates
/// (`2021-02-30`, an integer that overflows) stays text instead of failing
/// the file.
pub fn read_csv(path: &Path, batch_rows: usize) -> Result<ParsedCsv> {
    let inferred = infer_csv_schema(path)?;
    let text = read_as_text(path, &inferred, batch_rows)?;

    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            let dt = settle_column_type(&text, idx, field.data_type());
            if field.data_type() != &DataType::Null && field.data_type() != &dt {
                warn!(
                    file = %path.display(),
                    column = %field.name(),
                    inferred = %field.data_type(),
                    "values do not all convert; keeping column as text"
                );
            }
            Field::new(field.name(), dt, true)
        })
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let batches = text
        .iter()
        .map(|b| retype_batch(b, &schema))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("converting columns of {}", path.display()))?;
    Ok(ParsedCsv { schema, batches })
}

fn read_as_text(path: &Path, inferred: &Schema, batch_rows: usize) -> Result<Vec<RecordBatch>> {
    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|f| Field::new(f.name(), DataType::Utf8, true))
        .collect();

    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = ReaderBuilder::new(Arc::new(Schema::new(fields)))
        .with_format(csv_format())
        .with_truncated_rows(true)
        .with_batch_size(batch_rows.max(1))
        .build(file)
        .with_context(|| format!("creating CSV reader for {}", path.display()))?;

    reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("parsing {}", path.display()))
}

fn strict() -> CastOptions<'static> {
    CastOptions {
        safe: false,
        ..Default::default()
    }
}

/// `inferred` if every value of column `idx` converts to it, otherwise Utf8.
fn settle_column_type(batches: &[RecordBatch], idx: usize, inferred: &DataType) -> DataType {
    if matches!(inferred, DataType::Utf8 | DataType::Null) {
        return DataType::Utf8;
    }
    let fits = batches
        .iter()
        .all(|b| cast_with_options(b.column(idx), inferred, &strict()).is_ok());
    if fits {
        inferred.clone()
    } else {
        DataType::Utf8
    }
}

fn retype_batch(batch: &RecordBatch, schema: &SchemaRef) -> Result<RecordBatch> {
    let columns = batch
        .columns()
        .iter()
        .zip(schema.fields())
        .map(|(col, field)| -> Result<ArrayRef> {
            if col.data_type() == field.data_type() {
                Ok(col.clone())
            } else {
                Ok(cast_with_options(col, field.data_type(), &strict())?)
            }
        })
        .collect::<Result<Vec<ArrayRef>>>()?;
    RecordBatch::try_new(schema.clone(), columns).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::Int64Type;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &[u8]) -> Result<NamedTempFile> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(content)?;
        Ok(tmp)
    }

    #[test]
    fn short_rows_are_padded_with_nulls() -> Result<()> {
        let tmp = csv_file(b"x,y\n1,2\n3\n")?;
        let parsed = read_csv(tmp.path(), 1000)?;

        assert_eq!(parsed.num_rows(), 2);
        let y = parsed.batches[0].column(1);
        assert_eq!(y.data_type(), &DataType::Int64);
        assert_eq!(y.as_primitive::<Int64Type>().value(0), 2);
        assert!(y.is_null(1));
        Ok(())
    }

    #[test]
    fn long_rows_are_an_error() -> Result<()> {
        let tmp = csv_file(b"x\n1,2\n")?;
        assert!(read_csv(tmp.path(), 1000).is_err());
        Ok(())
    }

    #[test]
    fn invalid_utf8_is_an_error() -> Result<()> {
        let tmp = csv_file(b"name\n\xff\xfe\n")?;
        assert!(read_csv(tmp.path(), 1000).is_err());
        Ok(())
    }

    #[test]
    fn impossible_date_keeps_column_as_text() -> Result<()> {
        let tmp = csv_file(b"d,n\n2021-01-01,1\n2021-02-30,2\n")?;
        let parsed = read_csv(tmp.path(), 1)?;

        assert_eq!(parsed.schema.field(0).data_type(), &DataType::Utf8);
        assert_eq!(parsed.schema.field(1).data_type(), &DataType::Int64);
        assert_eq!(parsed.batches.len(), 2);
        assert_eq!(parsed.batches[1].column(0).as_string::<i32>().value(0), "2021-02-30");
        Ok(())
    }

    #[test]
    fn overflowing_integer_keeps_column_as_text() -> Result<()> {
        let tmp = csv_file(b"id\n1\n99999999999999999999999\n")?;
        let parsed = read_csv(tmp.path(), 1000)?;
        assert_eq!(parsed.schema.field(0).data_type(), &DataType::Utf8);
        Ok(())
    }

    #[test]
    fn valid_columns_keep_their_inferred_types() -> Result<()> {
        let tmp = csv_file(b"id,price,seen,at\n1,2.5,true,2021-03-04 10:00:00\n2,,false,\n")?;
        let parsed = read_csv(tmp.path(), 1000)?;

        let types: Vec<&DataType> = parsed.schema.fields().iter().map(|f| f.data_type()).collect();
        assert_eq!(types[0], &DataType::Int64);
        assert_eq!(types[1], &DataType::Float64);
        assert_eq!(types[2], &DataType::Boolean);
        assert!(matches!(types[3], DataType::Timestamp(_, None)));
        assert!(parsed.batches[0].column(1).is_null(1));
        Ok(())
    }
}
