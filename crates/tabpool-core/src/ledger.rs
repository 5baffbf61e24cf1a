//! Run-global ledger: dedup sets, acceptance cap, append-only index
//!
//! One ledger lives for one pipeline run, owned by the driver. Buffered
//! index rows are flushed after every dataset and once more at shutdown, so
//! a crash loses at most one dataset's worth of rows.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use serde::Serialize;

/// Column order of the persistent index.
pub const INDEX_HEADER: [&str; 10] = [
    "filename",
    "rows",
    "cols",
    "size_kb",
    "md5",
    "source",
    "keyword",
    "name_sig",
    "orig_zip_name",
    "fixed_zip_name",
];

/// One accepted file, as recorded in the index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexRow {
    pub filename: String,
    pub rows: usize,
    pub cols: usize,
    pub size_kb: f64,
    pub md5: String,
    pub source: String,
    pub keyword: String,
    pub name_sig: String,
    pub orig_zip_name: String,
    pub fixed_zip_name: String,
}

/// Process-wide curation state for one pipeline run.
#[derive(Debug)]
pub struct Ledger {
    index_path: PathBuf,
    max_accepted: usize,
    accepted: usize,
    seen_hashes: FxHashSet<String>,
    seen_datasets: FxHashSet<String>,
    pending: Vec<IndexRow>,
}

impl Ledger {
    pub fn new(index_path: &Path, max_accepted: usize) -> Self {
        Self {
            index_path: index_path.to_path_buf(),
            max_accepted,
            accepted: 0,
            seen_hashes: FxHashSet::default(),
            seen_datasets: FxHashSet::default(),
            pending: Vec::new(),
        }
    }

    /// Insert a content hash; false if it was already present.
    pub fn register(&mut self, hash: &str) -> bool {
        self.seen_hashes.insert(hash.to_string())
    }

    pub fn is_duplicate(&self, hash: &str) -> bool {
        self.seen_hashes.contains(hash)
    }

    /// Claim a dataset for this run; false if it was already processed.
    pub fn mark_processed(&mut self, dataset_ref: &str) -> bool {
        self.seen_datasets.insert(dataset_ref.to_string())
    }

    pub fn cap_reached(&self) -> bool {
        self.accepted >= self.max_accepted
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Buffer an accepted file; counts toward the global cap immediately.
    pub fn record(&mut self, row: IndexRow) {
        self.accepted += 1;
        self.pending.push(row);
    }

    /// Append buffered rows to the index, writing the header only when the
    /// file does not yet exist. The buffer is cleared on success.
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let fresh = !self.index_path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.index_path)
            .with_context(|| format!("failed to open index {}", self.index_path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if fresh {
            writer
                .write_record(INDEX_HEADER)
                .context("failed to write index header")?;
        }
        for row in &self.pending {
            writer.serialize(row).context("failed to write index row")?;
        }
        writer.flush().context("failed to flush index")?;
        self.pending.clear();
        Ok(())
    }
}
