use anyhow::{Context, Result};
use arrow::{array::ArrayRef, datatypes::Schema, record_batch::RecordBatch};
use sqlx::{Any, AnyConnection, QueryBuilder};
use tracing::{debug, trace};

use crate::db::quote_ident;
use crate::load::{
    convert::{cell_at, normalize_batch, Cell},
    schema::create_table_sql,
};

/// Most placeholders a single statement may carry. SQLite caps at 32766,
/// MySQL at 65535; stay under both.
pub const MAX_BIND_PARAMS: usize = 32_766;

/// Drop `table` if it exists and recreate it from `schema`.
pub async fn replace_table(conn: &mut AnyConnection, table: &str, schema: &Schema) -> Result<()> {
    let drop = format!("DROP TABLE IF EXISTS {}", quote_ident(table));
    sqlx::query(&drop)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("dropping table `{}`", table))?;

    let create = create_table_sql(table, schema);
    debug!(table, sql = %create, "creating table");
    sqlx::query(&create)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("creating table `{}`", table))?;
    Ok(())
}

/// Rows per `INSERT` for a table with `num_columns` columns.
pub fn rows_per_statement(num_columns: usize, batch_rows: usize) -> usize {
    let cap = MAX_BIND_PARAMS / num_columns.max(1);
    batch_rows.clamp(1, cap.max(1))
}

/// Insert every row of `batch` into `table`, chunked into multi-row `INSERT`s.
/// Returns the number of rows written.
pub async fn insert_batch(
    conn: &mut AnyConnection,
    table: &str,
    batch: &RecordBatch,
    batch_rows: usize,
) -> Result<u64> {
    if batch.num_rows() == 0 {
        return Ok(0);
    }

    let columns = normalize_batch(batch)?;
    let schema = batch.schema();
    let column_list: Vec<String> = schema.fields().iter().map(|f| quote_ident(f.name())).collect();
    let prefix = format!(
        "INSERT INTO {} ({}) ",
        quote_ident(table),
        column_list.join(", ")
    );

    let chunk = rows_per_statement(columns.len(), batch_rows);
    let mut written = 0u64;
    let mut start = 0;
    while start < batch.num_rows() {
        let end = (start + chunk).min(batch.num_rows());
        let rows = collect_rows(&columns, start, end)?;

        let mut qb: QueryBuilder<Any> = QueryBuilder::new(&prefix);
        qb.push_values(rows, |mut b, row| {
            for cell in row {
                match cell {
                    Cell::Null => b.push_bind(None::<String>),
                    Cell::Int(v) => b.push_bind(v),
                    Cell::Float(v) => b.push_bind(v),
                    Cell::Bool(v) => b.push_bind(v),
                    Cell::Text(v) => b.push_bind(v),
                };
            }
        });
        qb.build()
            .execute(&mut *conn)
            .await
            .with_context(|| format!("inserting rows {}..{} into `{}`", start, end, table))?;

        trace!(table, start, end, "inserted chunk");
        written += (end - start) as u64;
        start = end;
    }
    Ok(written)
}

fn collect_rows(columns: &[ArrayRef], start: usize, end: usize) -> Result<Vec<Vec<Cell>>> {
    (start..end)
        .map(|row| columns.iter().map(|col| cell_at(col, row)).collect())
        .collect()
}
