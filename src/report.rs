//! Hand-off to the reporting layer.
//!
//! Enriched records are appended to `enriched.jsonl`; the latest
//! [`EngineView`] is published as `summary.json`, replaced atomically so a
//! reader never sees a partial document. With a row limit set, the records
//! file is a rolling window over the newest swaps by (timestamp, block).

use crate::errors::Result;
use crate::models::EnrichedRecord;
use crate::state::EngineView;
use crate::utils::write_atomic;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const RECORDS_FILE: &str = "enriched.jsonl";
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone)]
pub struct JsonlReport {
    dir: PathBuf,
    max_rows: Option<usize>,
}

impl JsonlReport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_rows: None,
        }
    }

    /// Bound `enriched.jsonl` to the newest `max_rows` records.
    pub fn with_max_rows(mut self, max_rows: Option<usize>) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn records_path(&self) -> PathBuf {
        self.dir.join(RECORDS_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(SUMMARY_FILE)
    }

    /// Append records, one JSON object per line, and fsync.
    pub fn append(&self, records: &[EnrichedRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.records_path())?;
        file.write_all(&buf)?;
        file.sync_all()?;
        Ok(())
    }

    /// Rewrite the records file keeping only the newest `max_rows` rows.
    ///
    /// Rows are ordered by (timestamp, block_number) and written back oldest
    /// first. Unparsable rows are dropped. Returns how many rows were removed.
    pub fn prune_to_max_rows(&self) -> Result<usize> {
        let Some(max_rows) = self.max_rows else {
            return Ok(0);
        };
        let path = self.records_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if lines.len() <= max_rows {
            return Ok(0);
        }

        let mut rows = Vec::with_capacity(lines.len());
        for line in &lines {
            match serde_json::from_str::<serde_json::Value>(line) {
                Ok(row) => {
                    let ts = row["timestamp"].as_i64().unwrap_or(0);
                    let block = row["block_number"].as_u64().unwrap_or(0);
                    rows.push((ts, block, *line));
                }
                Err(e) => warn!(error = %e, "[REPORT] dropping unparsable enriched row"),
            }
        }
        rows.sort_by_key(|&(ts, block, _)| (ts, block));
        let keep_from = rows.len().saturating_sub(max_rows);

        let mut out = String::new();
        for (_, _, line) in &rows[keep_from..] {
            out.push_str(line);
            out.push('\n');
        }
        write_atomic(&path, out.as_bytes())?;

        let kept = rows.len() - keep_from;
        let dropped = lines.len() - kept;
        info!(dropped, kept, max_rows, "[REPORT] rolling window pruned enriched records");
        Ok(dropped)
    }

    pub fn write_summary(&self, view: &EngineView) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(view)?;
        write_atomic(&self.summary_path(), &bytes)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
