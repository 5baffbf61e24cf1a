//! Archive inspection and curation
//!
//! Opens one downloaded archive, extracts candidate tabular entries into a
//! scratch directory, filters them by shape, deduplicates against the run
//! ledger, groups near-duplicates by name signature, and promotes a diverse
//! subset into permanent storage. The scratch directory is removed on every
//! exit path, so no temp file outlives the call.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use zip::ZipArchive;

use crate::hash;
use crate::ledger::{IndexRow, Ledger};
use crate::names;
use crate::tabular;

/// Extension of entries considered tabular.
const TABULAR_EXT: &str = ".csv";

/// Shape and volume bounds applied during curation.
#[derive(Debug, Clone)]
pub struct CurationLimits {
    pub min_rows: usize,
    pub max_rows: usize,
    pub min_cols: usize,
    /// Maximum files promoted from one archive.
    pub per_dataset_cap: usize,
    /// Maximum tabular entries inspected per archive.
    pub scan_cap: usize,
    /// Maximum candidates held per name signature.
    pub group_cap: usize,
}

impl Default for CurationLimits {
    fn default() -> Self {
        Self {
            min_rows: 300,
            max_rows: 50_000,
            min_cols: 4,
            per_dataset_cap: 5,
            scan_cap: 200,
            group_cap: 20,
        }
    }
}

/// Per-archive counters, reported up to the run summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurationStats {
    /// Tabular entries inspected.
    pub scanned: usize,
    /// Entries that could not be extracted or parsed.
    pub unreadable: usize,
    /// Entries outside the row/column bounds.
    pub shape_rejected: usize,
    /// Entries whose content was already in the pool.
    pub duplicates: usize,
    /// Entries promoted to permanent storage.
    pub accepted: usize,
}

/// In-flight record for one extracted entry.
#[derive(Debug)]
struct Candidate {
    temp_path: PathBuf,
    original_name: String,
    repaired_name: String,
    rows: usize,
    cols: usize,
    md5: String,
    signature: String,
    size_kb: f64,
}

/// Curate one downloaded archive.
///
/// Returns per-archive counters; `stats.accepted` is the number of files
/// promoted into `output_dir` and recorded in the ledger. Errors leave no
/// temp files behind; the scratch directory is dropped on every path.
pub fn curate_archive(
    archive_path: &Path,
    dataset_ref: &str,
    keyword: &str,
    limits: &CurationLimits,
    ledger: &mut Ledger,
    output_dir: &Path,
) -> Result<CurationStats> {
    let mut stats = CurationStats::default();
    if ledger.cap_reached() {
        return Ok(stats);
    }

    let file = File::open(archive_path)
        .with_context(|| format!("failed to open archive {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("not a readable archive: {}", archive_path.display()))?;

    // Scratch space lives next to the archive; dropping it removes every
    // unselected temp file no matter how this function exits.
    let scratch_parent = archive_path.parent().unwrap_or_else(|| Path::new("."));
    let scratch = tempfile::Builder::new()
        .prefix("curate-")
        .tempdir_in(scratch_parent)
        .context("failed to create scratch directory")?;

    let mut groups: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();

    for index in 0..archive.len() {
        if stats.scanned >= limits.scan_cap || ledger.cap_reached() {
            break;
        }
        let Ok(mut entry) = archive.by_index(index) else {
            stats.unreadable += 1;
            continue;
        };
        if entry.is_dir() {
            continue;
        }
        let raw_name = entry.name_raw().to_vec();
        let original_name = String::from_utf8_lossy(&raw_name).into_owned();
        if !original_name.to_lowercase().ends_with(TABULAR_EXT) {
            continue;
        }
        stats.scanned += 1;

        let repaired_name = names::repair_entry_name(&raw_name);
        let temp_path = scratch.path().join(format!("entry_{index:05}.csv"));
        let extracted = File::create(&temp_path)
            .and_then(|mut out| io::copy(&mut entry, &mut out))
            .is_ok();
        if !extracted {
            stats.unreadable += 1;
            remove_quietly(&temp_path);
            continue;
        }

        let shape = match tabular::read_shape(&temp_path) {
            Ok(shape) => shape,
            Err(e) => {
                log::debug!("{dataset_ref}: skipping {repaired_name}: {e:#}");
                stats.unreadable += 1;
                remove_quietly(&temp_path);
                continue;
            }
        };
        if shape.rows < limits.min_rows
            || shape.rows > limits.max_rows
            || shape.cols < limits.min_cols
        {
            stats.shape_rejected += 1;
            remove_quietly(&temp_path);
            continue;
        }

        let md5 = match hash::hash_file(&temp_path) {
            Ok(md5) => md5,
            Err(e) => {
                log::debug!("{dataset_ref}: cannot hash {repaired_name}: {e}");
                stats.unreadable += 1;
                remove_quietly(&temp_path);
                continue;
            }
        };
        if ledger.is_duplicate(&md5) {
            stats.duplicates += 1;
            remove_quietly(&temp_path);
            continue;
        }

        let signature = names::name_signature(&repaired_name);
        let members = groups.entry(signature.clone()).or_default();
        if members.len() >= limits.group_cap {
            remove_quietly(&temp_path);
            continue;
        }
        let size_kb = tabular::file_size_kb(&temp_path).unwrap_or(0.0);
        members.push(Candidate {
            temp_path,
            original_name,
            repaired_name,
            rows: shape.rows,
            cols: shape.cols,
            md5,
            signature,
            size_kb,
        });
    }

    for candidate in select_diverse(groups, limits.per_dataset_cap) {
        if ledger.cap_reached() {
            break;
        }
        promote(candidate, dataset_ref, keyword, ledger, output_dir)?;
        stats.accepted += 1;
    }

    Ok(stats)
}

/// Diversity-first selection: one good table from each distinct signature
/// group (largest groups first) before filling remaining slots with the
/// row-richest leftovers.
fn select_diverse(groups: BTreeMap<String, Vec<Candidate>>, cap: usize) -> Vec<Candidate> {
    let mut groups: Vec<(String, Vec<Candidate>)> = groups.into_iter().collect();
    // Largest group first; ties by signature keep selection deterministic.
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));

    let mut selected: Vec<Candidate> = Vec::new();
    let mut picked: FxHashSet<String> = FxHashSet::default();
    let mut leftovers: Vec<Candidate> = Vec::new();

    for (_, mut members) in groups {
        if selected.len() < cap {
            members.sort_by(|a, b| b.rows.cmp(&a.rows));
            if let Some(pos) = members.iter().position(|c| !picked.contains(&c.md5)) {
                let candidate = members.remove(pos);
                picked.insert(candidate.md5.clone());
                selected.push(candidate);
            }
        }
        leftovers.append(&mut members);
    }

    leftovers.sort_by(|a, b| b.rows.cmp(&a.rows));
    for candidate in leftovers {
        if selected.len() >= cap {
            break;
        }
        if picked.contains(&candidate.md5) {
            continue;
        }
        picked.insert(candidate.md5.clone());
        selected.push(candidate);
    }
    selected
}

/// Move one selected candidate into permanent storage and record it.
fn promote(
    candidate: Candidate,
    dataset_ref: &str,
    keyword: &str,
    ledger: &mut Ledger,
    output_dir: &Path,
) -> Result<()> {
    let base = Path::new(&candidate.repaired_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| candidate.repaired_name.clone());

    let mut final_name = names::build_output_name(&base, &candidate.md5);
    if output_dir.join(&final_name).exists() {
        // Same sanitized stem and hash prefix; disambiguate by timestamp.
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        final_name = names::append_suffix(&final_name, &format!("_{nanos}"));
    }
    let target = output_dir.join(&final_name);
    move_file(&candidate.temp_path, &target)
        .with_context(|| format!("failed to store {}", target.display()))?;

    ledger.register(&candidate.md5);
    ledger.record(IndexRow {
        filename: final_name,
        rows: candidate.rows,
        cols: candidate.cols,
        size_kb: candidate.size_kb,
        md5: candidate.md5,
        source: dataset_ref.to_string(),
        keyword: keyword.to_string(),
        name_sig: candidate.signature,
        orig_zip_name: candidate.original_name,
        fixed_zip_name: candidate.repaired_name,
    });
    Ok(())
}

/// Rename, falling back to copy-and-remove when staging and storage sit on
/// different filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            log::debug!("failed to remove temp file {}: {e}", path.display());
        }
    }
}
