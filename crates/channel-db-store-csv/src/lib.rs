use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use channel_db_core::{DataStore, LoadError, Row, RowDefect, Table};
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

const EXPORT_SCHEMA_VERSION: i64 = 1;

const CRLF: &str = "\r\n";

/// A directory of `<table>.csv` files.
#[derive(Debug, Clone)]
pub struct CsvStore {
    dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportFileDigest {
    pub path: String,
    pub sha256: String,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportManifest {
    pub schema_version: i64,
    pub exported_at: String,
    pub files: Vec<ExportFileDigest>,
}

impl CsvStore {
    /// # Errors
    /// Returns an error when `dir` does not exist or is not a directory.
    pub fn open(dir: &Path) -> Result<Self> {
        let metadata = fs::metadata(dir)
            .with_context(|| format!("failed to open data directory {}", dir.display()))?;
        if !metadata.is_dir() {
            return Err(anyhow!("data path {} is not a directory", dir.display()));
        }
        Ok(Self { dir: dir.to_path_buf() })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn table_path(&self, table: Table) -> PathBuf {
        self.dir.join(table.file_name())
    }

    /// Load every table. A missing file loads as an empty table.
    ///
    /// # Errors
    /// Returns a [`LoadError`] (reachable through `downcast_ref`) for malformed
    /// files, or an IO error naming the file that could not be read.
    pub fn load(&self) -> Result<DataStore> {
        let mut store = DataStore::new();
        for table in Table::ALL {
            let rows = self.load_table(table)?;
            debug!(table = table.as_str(), rows = rows.len(), "loaded table");
            store.load_rows(table, &rows)?;
        }
        Ok(store)
    }

    /// # Errors
    /// See [`CsvStore::load`].
    pub fn load_table(&self, table: Table) -> Result<Vec<Row>> {
        let path = self.table_path(table);
        if !path.exists() {
            warn!(path = %path.display(), "table file is missing, loading it empty");
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read table file {}", path.display()))?;
        Ok(parse_table(table, &text)?)
    }

    /// Rewrite the given tables from `store`. Immutable tables are never written.
    ///
    /// # Errors
    /// Returns an error when a table cannot be rendered or its file cannot be written.
    pub fn save(&self, store: &DataStore, tables: &[Table]) -> Result<()> {
        for table in tables.iter().copied().filter(|table| table.is_mutable()) {
            let path = self.table_path(table);
            let text = render_table(table, &store.rows(table))?;
            fs::write(&path, text)
                .with_context(|| format!("failed to write table file {}", path.display()))?;
            info!(path = %path.display(), rows = store.len(table), "saved table");
        }
        Ok(())
    }
}

/// Split a table file into rows, enforcing the file conventions first.
///
/// Every physical line is checked for a stray CR or LF and for a quote-aware column
/// count matching the header; a final empty line (file ending in CRLF) is a
/// defect too. All defects of the file are reported together.
///
/// # Errors
/// Returns [`LoadError::MalformedRows`] listing the defective lines, or
/// [`LoadError::Parse`]/[`LoadError::InvalidValue`] when a record cannot be decoded.
pub fn parse_table(table: Table, text: &str) -> Result<Vec<Row>, LoadError> {
    let file = table.file_name();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let lines: Vec<&str> = text.split(CRLF).collect();
    let columns = count_columns(lines[0]);
    let last = lines.len() - 1;
    let mut defects = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            if index == last && index > 0 {
                defects.push(RowDefect {
                    line: index + 1,
                    message: "file must not end with an empty line".to_string(),
                });
            }
            continue;
        }
        if line.contains(['\n', '\r']) {
            defects.push(RowDefect {
                line: index + 1,
                message: "row has the wrong line ending character, should be CRLF".to_string(),
            });
        }
        if count_columns(line) != columns {
            defects.push(RowDefect {
                line: index + 1,
                message: "row has the wrong number of columns".to_string(),
            });
        }
    }
    if !defects.is_empty() {
        return Err(LoadError::MalformedRows { file, defects });
    }

    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|err| LoadError::Parse { file: file.clone(), message: err.to_string() })?
        .clone();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record =
            record.map_err(|err| LoadError::Parse { file: file.clone(), message: err.to_string() })?;
        let line = record
            .position()
            .and_then(|position| usize::try_from(position.line()).ok())
            .unwrap_or(index + 2);
        rows.push(Row::new(table, line, headers.iter().zip(record.iter())));
    }
    Ok(rows)
}

/// Number of comma-separated cells, ignoring commas inside quotes.
fn count_columns(line: &str) -> usize {
    let mut quoted = false;
    let mut count = 1;
    for ch in line.chars() {
        match ch {
            '"' => quoted = !quoted,
            ',' if !quoted => count += 1,
            _ => {}
        }
    }
    count
}

/// Header plus rows, CRLF-separated, quoting only where needed, no final terminator.
///
/// # Errors
/// Returns an error when the CSV writer fails.
pub fn render_table(table: Table, rows: &[Vec<String>]) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::CRLF)
        .quote_style(QuoteStyle::Necessary)
        .from_writer(Vec::new());
    writer
        .write_record(table.columns())
        .with_context(|| format!("failed to write header of {}", table.file_name()))?;
    for row in rows {
        writer
            .write_record(row)
            .with_context(|| format!("failed to write row of {}", table.file_name()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow!("failed to flush {}: {}", table.file_name(), err.error()))?;
    let mut text = String::from_utf8(bytes)
        .with_context(|| format!("rendered {} is not valid UTF-8", table.file_name()))?;
    if text.ends_with(CRLF) {
        text.truncate(text.len() - CRLF.len());
    }
    Ok(text)
}

/// Write every table as `<table>.json` plus a digest manifest into `out_dir`.
///
/// # Errors
/// Returns an error when export files cannot be created, written, or serialized.
pub fn export_json(store: &DataStore, out_dir: &Path) -> Result<ExportManifest> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create export directory {}", out_dir.display()))?;

    let mut files = Vec::new();
    for table in Table::ALL {
        let name = format!("{}.json", table.as_str());
        let path = out_dir.join(&name);
        let value = store
            .to_json(table)
            .with_context(|| format!("failed to serialize table {}", table.as_str()))?;
        let bytes = serde_json::to_vec(&value)
            .with_context(|| format!("failed to serialize table {}", table.as_str()))?;
        fs::write(&path, &bytes)
            .with_context(|| format!("failed to write export file {}", path.display()))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        files.push(ExportFileDigest {
            path: name,
            sha256: format!("{:x}", hasher.finalize()),
            records: store.len(table),
        });
    }

    let manifest =
        ExportManifest { schema_version: EXPORT_SCHEMA_VERSION, exported_at: now_rfc3339()?, files };

    let manifest_path = out_dir.join("manifest.json");
    let manifest_json =
        serde_json::to_vec_pretty(&manifest).context("failed to serialize export manifest")?;
    fs::write(&manifest_path, manifest_json).with_context(|| {
        format!("failed to write export manifest {}", manifest_path.display())
    })?;

    Ok(manifest)
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}
