//! Checkpointing output sink.
//!
//! Records accumulate in memory in extraction order. Every K new records the
//! whole sequence is rewritten to disk, and `finish` rewrites it once more
//! regardless of how many records arrived since the last checkpoint. Each
//! rewrite goes to a temporary file in the target directory that is then
//! renamed over the output, so the file on disk is always a complete
//! snapshot.

mod csv;
mod json;
mod xlsx;

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_CHECKPOINT_INTERVAL;
use crate::models::{ExhibitorRecord, DEFAULT_MISSING_VALUE};

/// Errors raised while writing output files.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XLSX error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
}

/// Tabular output format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Xlsx,
    Csv,
    Tsv,
    Json,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" => Some(OutputFormat::Xlsx),
            "csv" => Some(OutputFormat::Csv),
            "tsv" | "tab" => Some(OutputFormat::Tsv),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }

    fn write(
        self,
        out: &mut dyn Write,
        columns: &[String],
        rows: &[Vec<&str>],
    ) -> Result<(), SinkError> {
        match self {
            OutputFormat::Xlsx => xlsx::write(out, columns, rows),
            OutputFormat::Csv => csv::write(out, b',', columns, rows),
            OutputFormat::Tsv => csv::write(out, b'\t', columns, rows),
            OutputFormat::Json => json::write(out, columns, rows),
        }
    }
}

#[derive(Debug, Clone)]
struct Target {
    path: PathBuf,
    format: OutputFormat,
}

impl Target {
    fn new(path: PathBuf) -> Result<Self, SinkError> {
        let format = OutputFormat::from_path(&path)
            .ok_or_else(|| SinkError::UnsupportedFormat(path.display().to_string()))?;
        Ok(Self { path, format })
    }

    /// Replace the file with a full rewrite via a sibling temp file.
    fn rewrite(&self, columns: &[String], rows: &[Vec<&str>]) -> Result<(), SinkError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        self.format.write(tmp.as_file_mut(), columns, rows)?;
        tmp.as_file_mut().flush()?;
        tmp.persist(&self.path).map_err(|e| SinkError::Io(e.error))?;
        Ok(())
    }
}

/// Accumulates records and persists them with periodic full rewrites.
#[derive(Debug)]
pub struct CheckpointSink {
    primary: Target,
    secondary: Vec<Target>,
    columns: Vec<String>,
    missing: String,
    interval: usize,
    dedup_by: Vec<String>,
    records: Vec<ExhibitorRecord>,
    since_checkpoint: usize,
    checkpoints: usize,
}

impl CheckpointSink {
    /// Create a sink writing `columns` to `path`. Nothing touches the disk
    /// until the first checkpoint.
    pub fn new(path: impl Into<PathBuf>, columns: Vec<String>) -> Result<Self, SinkError> {
        Ok(Self {
            primary: Target::new(path.into())?,
            secondary: Vec::new(),
            columns,
            missing: DEFAULT_MISSING_VALUE.to_string(),
            interval: DEFAULT_CHECKPOINT_INTERVAL,
            dedup_by: Vec::new(),
            records: Vec::new(),
            since_checkpoint: 0,
            checkpoints: 0,
        })
    }

    pub fn missing_value(mut self, missing: impl Into<String>) -> Self {
        self.missing = missing.into();
        self
    }

    /// Rewrite after every `interval` new records (at least 1).
    pub fn checkpoint_every(mut self, interval: usize) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Drop later records whose key columns equal an earlier record's.
    pub fn dedup_by(mut self, columns: Vec<String>) -> Self {
        self.dedup_by = columns;
        self
    }

    /// Also rewrite `path` at every checkpoint.
    pub fn with_secondary(mut self, path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        self.secondary.push(Target::new(path.into())?);
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.primary.path
    }

    pub fn secondary_paths(&self) -> Vec<&Path> {
        self.secondary.iter().map(|t| t.path.as_path()).collect()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn missing(&self) -> &str {
        &self.missing
    }

    pub fn records(&self) -> &[ExhibitorRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of rewrites performed so far.
    pub fn checkpoints(&self) -> usize {
        self.checkpoints
    }

    /// A blank record with every output column set to the sentinel.
    pub fn new_record(&self) -> ExhibitorRecord {
        ExhibitorRecord::with_columns(&self.columns, &self.missing)
    }

    /// Append a record. Returns true when this push triggered a checkpoint.
    pub fn push(&mut self, record: ExhibitorRecord) -> Result<bool, SinkError> {
        self.records.push(record);
        self.since_checkpoint += 1;
        if self.since_checkpoint >= self.interval {
            let rows = self.persist()?;
            debug!("Checkpoint: {} rows -> {}", rows, self.primary.path.display());
            return Ok(true);
        }
        Ok(false)
    }

    fn rows(&self) -> Vec<Vec<&str>> {
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        self.records
            .iter()
            .filter(|r| self.dedup_by.is_empty() || seen.insert(r.key(&self.dedup_by)))
            .map(|r| r.row(&self.columns, &self.missing))
            .collect()
    }

    /// Rewrite every output with the full accumulated sequence.
    /// Returns the number of rows written.
    pub fn persist(&mut self) -> Result<usize, SinkError> {
        let rows = self.rows();
        self.primary.rewrite(&self.columns, &rows)?;
        for target in &self.secondary {
            if let Err(e) = target.rewrite(&self.columns, &rows) {
                warn!("Failed to write {}: {}", target.path.display(), e);
            }
        }
        let written = rows.len();
        self.since_checkpoint = 0;
        self.checkpoints += 1;
        Ok(written)
    }

    /// Final unconditional rewrite. Writes a header-only file when no
    /// records were collected.
    pub fn finish(&mut self) -> Result<usize, SinkError> {
        let written = self.persist()?;
        info!(
            "Saved {} rows ({} collected) to {}",
            written,
            self.records.len(),
            self.primary.path.display()
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        ["Order", "Company Name", "Booth Number"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn record(sink: &CheckpointSink, order: usize, name: &str, booth: &str) -> ExhibitorRecord {
        let mut r = sink.new_record();
        r.set("Order", order.to_string());
        r.set("Company Name", name);
        if !booth.is_empty() {
            r.set("Booth Number", booth);
        }
        r
    }

    fn read_csv(path: &Path) -> Vec<Vec<String>> {
        let mut reader = ::csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            OutputFormat::from_path(Path::new("a/b.XLSX")),
            Some(OutputFormat::Xlsx)
        );
        assert_eq!(
            OutputFormat::from_path(Path::new("b.tsv")),
            Some(OutputFormat::Tsv)
        );
        assert_eq!(OutputFormat::from_path(Path::new("b.pdf")), None);
        assert!(CheckpointSink::new("out.txt", columns()).is_err());
    }

    #[test]
    fn test_checkpoint_every_k_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CheckpointSink::new(&path, columns())
            .unwrap()
            .checkpoint_every(2);

        assert!(!sink.push(record(&sink, 1, "Acme", "A1")).unwrap());
        assert!(!path.exists());
        assert!(sink.push(record(&sink, 2, "Globex", "B2")).unwrap());
        assert_eq!(read_csv(&path).len(), 3);

        assert!(!sink.push(record(&sink, 3, "Initech", "")).unwrap());
        // Third record not yet on disk.
        assert_eq!(read_csv(&path).len(), 3);

        assert_eq!(sink.finish().unwrap(), 3);
        let rows = read_csv(&path);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], vec!["Order", "Company Name", "Booth Number"]);
        assert_eq!(rows[3], vec!["3", "Initech", ""]);
        assert_eq!(sink.checkpoints(), 2);
    }

    #[test]
    fn test_finish_without_records_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("empty.csv");
        let mut sink = CheckpointSink::new(&path, columns()).unwrap();
        assert_eq!(sink.finish().unwrap(), 0);
        assert_eq!(read_csv(&path), vec![columns()]);
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CheckpointSink::new(&path, columns())
            .unwrap()
            .dedup_by(vec!["Company Name".to_string(), "Booth Number".to_string()]);
        sink.push(record(&sink, 1, "Acme", "A1")).unwrap();
        sink.push(record(&sink, 2, "ACME ", "a1")).unwrap();
        sink.push(record(&sink, 3, "Acme", "A2")).unwrap();
        assert_eq!(sink.finish().unwrap(), 2);
        assert_eq!(sink.len(), 3);
        let rows = read_csv(&path);
        assert_eq!(rows[1][0], "1");
        assert_eq!(rows[2][0], "3");
    }

    #[test]
    fn test_secondary_outputs_follow_primary() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("out.xlsx");
        let json = dir.path().join("out.json");
        let tsv = dir.path().join("out.tsv");
        let mut sink = CheckpointSink::new(&primary, columns())
            .unwrap()
            .missing_value("N/A")
            .with_secondary(&json)
            .unwrap()
            .with_secondary(&tsv)
            .unwrap();
        sink.push(record(&sink, 1, "Acme", "")).unwrap();
        sink.finish().unwrap();

        let bytes = std::fs::read(&primary).unwrap();
        assert_eq!(&bytes[..2], b"PK");

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(parsed[0]["Company Name"], "Acme");
        assert_eq!(parsed[0]["Booth Number"], "N/A");

        let text = std::fs::read_to_string(&tsv).unwrap();
        assert_eq!(text.lines().nth(1), Some("1\tAcme\tN/A"));
    }
}
