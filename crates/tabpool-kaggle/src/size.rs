//! Dataset size estimation
//!
//! The registry has no single reliable size field, so estimation walks a
//! fallback chain: declared metadata bytes, then summed per-file size
//! annotations from the listing, then "unknown" for the policy layer to
//! decide on. The actual archive size is re-checked after download either
//! way.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use serde::Deserialize;

use crate::client::RegistryClient;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Filename the registry uses for fetched metadata.
const METADATA_FILE: &str = "dataset-metadata.json";

static SIZE_ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(KB|MB|GB)\s*$").expect("size-annotation regex")
});

/// Result of the estimation chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeEstimate {
    Mb(f64),
    Unknown,
}

impl SizeEstimate {
    /// Apply the download policy: bounded sizes are compared against the
    /// ceiling; unknown sizes pass only when the policy allows them.
    pub fn permits(&self, max_mb: f64, allow_unknown: bool) -> bool {
        match self {
            Self::Mb(mb) => *mb <= max_mb,
            Self::Unknown => allow_unknown,
        }
    }
}

impl std::fmt::Display for SizeEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mb(mb) => write!(f, "{mb:.2} MB"),
            Self::Unknown => write!(f, "unknown size"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DatasetMetadata {
    #[serde(rename = "totalBytes")]
    total_bytes: Option<u64>,
}

/// Estimate a dataset's total size in MB, first strategy to succeed wins.
pub fn estimate_size_mb(
    client: &RegistryClient,
    scratch_dir: &Path,
    dataset_ref: &str,
) -> Result<SizeEstimate> {
    // Strategy 1: declared byte total from structured metadata.
    if client.fetch_metadata(dataset_ref, scratch_dir)? {
        if let Some(mb) = read_declared_total(&scratch_dir.join(METADATA_FILE)) {
            return Ok(SizeEstimate::Mb(mb));
        }
    }
    // Strategy 2: sum per-file size annotations from the listing.
    if let Some(listing) = client.list_files(dataset_ref)? {
        if let Some(mb) = parse_listing_total_mb(&listing) {
            return Ok(SizeEstimate::Mb(mb));
        }
    }
    Ok(SizeEstimate::Unknown)
}

/// Parse `totalBytes` out of a fetched metadata file. Any failure here is a
/// strategy failure, not an error.
fn read_declared_total(path: &Path) -> Option<f64> {
    let content = std::fs::read_to_string(path).ok()?;
    let metadata: DatasetMetadata = serde_json::from_str(&content).ok()?;
    metadata
        .total_bytes
        .map(|bytes| bytes as f64 / BYTES_PER_MB)
}

/// Sum size annotations across listing lines; `None` when no line carries a
/// recognizable `<number><unit>` tail.
pub fn parse_listing_total_mb(listing: &str) -> Option<f64> {
    let mut total_mb = 0.0;
    let mut found = 0usize;
    for line in listing.lines() {
        if is_header_line(line) {
            continue;
        }
        let Some(caps) = SIZE_ANNOTATION.captures(line) else {
            continue;
        };
        let Ok(value) = caps[1].parse::<f64>() else {
            continue;
        };
        total_mb += match caps[2].to_ascii_uppercase().as_str() {
            "KB" => value / 1024.0,
            "GB" => value * 1024.0,
            _ => value,
        };
        found += 1;
    }
    (found > 0).then_some(total_mb)
}

/// Header and separator lines in the listing: a dash run, or the column
/// header starting with "name".
fn is_header_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('-') || trimmed.to_ascii_lowercase().starts_with("name")
}
