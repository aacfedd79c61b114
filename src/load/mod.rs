// src/load/mod.rs
pub mod convert;
pub mod read;
pub mod schema;
pub mod write;

use anyhow::{anyhow, bail, Context, Result};
use sqlx::AnyConnection;
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, error, info, warn};

use self::read::read_csv;
use self::write::{insert_batch, replace_table};

pub const DEFAULT_EXTENSION: &str = ".csv";
pub const DEFAULT_BATCH_ROWS: usize = 1000;

/// Knobs for a directory load.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Literal, case-sensitive file name suffix that selects files.
    pub extension: String,
    /// Upper bound on rows per `INSERT` statement.
    pub batch_rows: usize,
    /// Record a failing file and move on instead of stopping the run.
    pub keep_going: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            batch_rows: DEFAULT_BATCH_ROWS,
            keep_going: false,
        }
    }
}

/// A qualifying file and the table it lands in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub file_name: String,
    pub table_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedTable {
    pub file_name: String,
    pub table_name: String,
    pub rows: u64,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<LoadedTable>,
    /// Only populated when `keep_going` is set.
    pub failed: Vec<(String, anyhow::Error)>,
}

/// Table name for `file_name`: the name with the `extension` suffix removed.
/// `None` when the file does not qualify.
pub fn table_name_for<'a>(file_name: &'a str, extension: &str) -> Option<&'a str> {
    file_name.strip_suffix(extension)
}

/// Console line emitted for each loaded file.
pub fn success_line(file_name: &str, table_name: &str) -> String {
    format!(
        "{} uploaded successfully into table '{}'",
        file_name, table_name
    )
}

/// List the qualifying files in `dir`, sorted by name.
///
/// Fails before anything is written if two files would land in tables whose
/// names differ only by ASCII case.
pub fn discover(dir: &Path, extension: &str) -> Result<Vec<SourceFile>> {
    let mut found = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let file_name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                debug!(name = ?raw, "skipping non-UTF-8 file name");
                continue;
            }
        };

        let Some(table_name) = table_name_for(&file_name, extension) else {
            debug!(file = %file_name, "skipping non-matching file");
            continue;
        };
        if table_name.is_empty() {
            warn!(file = %file_name, "file name has no stem; skipping");
            continue;
        }
        if !path.is_file() {
            debug!(file = %file_name, "skipping non-file entry");
            continue;
        }

        found.push(SourceFile {
            table_name: table_name.to_string(),
            file_name,
            path,
        });
    }
    found.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    let mut by_table: HashMap<String, &SourceFile> = HashMap::with_capacity(found.len());
    for src in &found {
        if let Some(prev) = by_table.insert(src.table_name.to_ascii_lowercase(), src) {
            bail!(
                "{} and {} both map to table `{}`",
                prev.file_name,
                src.file_name,
                src.table_name
            );
        }
    }
    Ok(found)
}

/// Parse one file and replace its table. Returns rows written.
///
/// The whole file is parsed before the old table is dropped, so a file that
/// cannot be read leaves the previous contents in place.
#[tracing::instrument(level = "info", skip(conn, src), fields(file = %src.file_name, table = %src.table_name))]
pub async fn load_file(conn: &mut AnyConnection, src: &SourceFile, batch_rows: usize) -> Result<u64> {
    let start = Instant::now();
    let parsed = read_csv(&src.path, batch_rows)?;
    debug!(rows = parsed.num_rows(), batches = parsed.batches.len(), "parsed");

    replace_table(conn, &src.table_name, &parsed.schema).await?;

    let mut rows = 0u64;
    for batch in &parsed.batches {
        rows += insert_batch(conn, &src.table_name, batch, batch_rows).await?;
    }

    info!(rows, elapsed = ?start.elapsed(), "table replaced");
    Ok(rows)
}

/// Load every qualifying file in `dir`, writing a success line to `out` after
/// each one.
pub async fn load_dir<W: Write>(
    conn: &mut AnyConnection,
    dir: &Path,
    opts: &LoadOptions,
    out: &mut W,
) -> Result<LoadReport> {
    let sources = discover(dir, &opts.extension)?;
    info!(dir = %dir.display(), files = sources.len(), "starting load");

    let mut report = LoadReport::default();
    for src in sources {
        match load_file(conn, &src, opts.batch_rows).await {
            Ok(rows) => {
                writeln!(out, "{}", success_line(&src.file_name, &src.table_name))?;
                report.loaded.push(LoadedTable {
                    file_name: src.file_name,
                    table_name: src.table_name,
                    rows,
                });
            }
            Err(e) if opts.keep_going => {
                error!(file = %src.file_name, error = %format!("{:#}", e), "load failed; continuing");
                report.failed.push((src.file_name, e));
            }
            Err(e) => {
                return Err(e.context(format!("loading {}", src.file_name)));
            }
        }
    }
    Ok(report)
}

impl LoadReport {
    /// Turn recorded failures into an error for the caller's exit status.
    pub fn into_result(self) -> Result<Vec<LoadedTable>> {
        if self.failed.is_empty() {
            return Ok(self.loaded);
        }
        let names: Vec<&str> = self.failed.iter().map(|(f, _)| f.as_str()).collect();
        Err(anyhow!(
            "{} of {} files failed: {}",
            self.failed.len(),
            self.failed.len() + self.loaded.len(),
            names.join(", ")
        ))
    }
}
