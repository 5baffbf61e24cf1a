//! `tabpool harvest` - run the acquisition-and-curation pipeline
//!
//! Iterates search keywords and result pages, and for every unseen dataset:
//! size-check, download, curate, flush the ledger, wipe staging. Every
//! per-dataset failure degrades to skip-and-continue; the run only ends at
//! the global cap or when the search space is exhausted.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use rand::Rng;

use tabpool_core::curate::{CurationLimits, CurationStats, curate_archive};
use tabpool_core::ledger::Ledger;
use tabpool_core::{ProgressContext, fmt_num};
use tabpool_kaggle::client::{RegistryClient, parse_search_output};
use tabpool_kaggle::size::estimate_size_mb;

use crate::config::Config;

#[derive(Args, Debug, Default)]
pub struct HarvestArgs {
    /// Override the global accepted-file cap
    #[arg(long)]
    pub max_files: Option<usize>,

    /// Restrict the run to these search keywords
    #[arg(long)]
    pub keywords: Vec<String>,

    /// Override pages scanned per keyword
    #[arg(long)]
    pub pages: Option<usize>,

    /// Override the storage base directory
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Print the plan without touching the registry
    #[arg(long)]
    pub dry_run: bool,
}

/// Counters for the end-of-run summary.
#[derive(Debug, Default)]
struct HarvestSummary {
    datasets_seen: usize,
    skipped_by_size: usize,
    failed_downloads: usize,
    archives_curated: usize,
    files_accepted: usize,
    elapsed: Duration,
}

impl HarvestSummary {
    fn print(&self) {
        use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Harvest").fg(Color::Cyan),
                Cell::new("Value").fg(Color::Cyan),
            ]);
        table.add_row(vec!["Datasets seen", &fmt_num(self.datasets_seen)]);
        table.add_row(vec!["Skipped by size", &fmt_num(self.skipped_by_size)]);
        table.add_row(vec!["Failed downloads", &fmt_num(self.failed_downloads)]);
        table.add_row(vec!["Archives curated", &fmt_num(self.archives_curated)]);
        table.add_row(vec!["Files accepted", &fmt_num(self.files_accepted)]);
        table.add_row(vec!["Elapsed", &format!("{:.1}s", self.elapsed.as_secs_f64())]);
        eprintln!("\n{table}");
    }

    fn log(&self) {
        log::info!(
            "harvest done: {} datasets seen, {} skipped by size, {} failed downloads, \
             {} archives curated, {} files accepted [{:.1}s]",
            self.datasets_seen,
            self.skipped_by_size,
            self.failed_downloads,
            self.archives_curated,
            fmt_num(self.files_accepted),
            self.elapsed.as_secs_f64()
        );
    }
}

/// What happened to one dataset.
enum DatasetOutcome {
    Curated(CurationStats),
    SkippedSize,
    DownloadFailed,
}

pub fn run(args: HarvestArgs, config: &Config, progress: &ProgressContext) -> Result<()> {
    let mut config = config.clone();
    if let Some(dir) = args.output {
        config.storage.base_dir = dir;
    }
    if !args.keywords.is_empty() {
        config.search.keywords = args.keywords;
    }
    if let Some(pages) = args.pages {
        config.search.pages_per_keyword = pages;
    }
    let max_files = args.max_files.unwrap_or(config.limits.max_total_files);

    if args.dry_run {
        println!("=== Harvest Plan ===");
        println!("{:<20} {}", "Keywords", config.search.keywords.len());
        println!("{:<20} {}", "Pages per keyword", config.search.pages_per_keyword);
        println!("{:<20} {}", "Global cap", max_files);
        println!("{:<20} {}", "Base dir", config.storage.base_dir.display());
        println!("(dry-run mode, no execution)");
        return Ok(());
    }

    let raw_dir = config.storage.raw_dir();
    let output_dir = config.storage.output_dir();
    std::fs::create_dir_all(&raw_dir).context("cannot create staging directory")?;
    std::fs::create_dir_all(&output_dir).context("cannot create output directory")?;

    let client = RegistryClient::new(&config.registry.binary);
    let limits = config.limits.curation();
    let mut ledger = Ledger::new(&config.storage.index_path(), max_files);
    let mut summary = HarvestSummary::default();
    let started = Instant::now();

    log::info!(
        "harvest starting: {} keywords x {} pages, cap {}, rows {}-{}, cols >= {}",
        config.search.keywords.len(),
        config.search.pages_per_keyword,
        max_files,
        config.limits.min_rows,
        config.limits.max_rows,
        config.limits.min_cols
    );

    let status = progress.stage_line("dataset");
    'keywords: for keyword in &config.search.keywords {
        let bar = progress.keyword_bar(keyword, config.search.pages_per_keyword as u64);
        for page in 1..=config.search.pages_per_keyword {
            if ledger.cap_reached() {
                bar.finish_and_clear();
                break 'keywords;
            }
            let Some(listing) = client.search_page(keyword, page)? else {
                log::warn!("{keyword}: search page {page} failed, skipping");
                bar.inc(1);
                continue;
            };
            let refs = parse_search_output(&listing);
            if refs.is_empty() {
                log::debug!("{keyword}: results exhausted at page {page}");
                break;
            }
            for dataset_ref in refs {
                if ledger.cap_reached() {
                    break;
                }
                if !ledger.mark_processed(&dataset_ref) {
                    continue;
                }
                summary.datasets_seen += 1;
                status.set_message(dataset_ref.clone());
                pace(config.pacing.base_sleep_secs, config.pacing.jitter_secs);

                match process_dataset(
                    &client,
                    &dataset_ref,
                    keyword,
                    &config,
                    &limits,
                    &mut ledger,
                    &raw_dir,
                    &output_dir,
                )? {
                    DatasetOutcome::Curated(stats) => {
                        summary.archives_curated += 1;
                        bar.set_message(format!(
                            "{} files, {} dup",
                            fmt_num(ledger.accepted()),
                            stats.duplicates
                        ));
                    }
                    DatasetOutcome::SkippedSize => summary.skipped_by_size += 1,
                    DatasetOutcome::DownloadFailed => summary.failed_downloads += 1,
                }
                ledger.flush()?;
                wipe_dir(&raw_dir);
            }
            bar.inc(1);
        }
        bar.finish_and_clear();
    }
    status.finish_and_clear();

    ledger.flush()?;
    wipe_dir(&raw_dir);

    summary.files_accepted = ledger.accepted();
    summary.elapsed = started.elapsed();
    if progress.is_tty() {
        summary.print();
    } else {
        summary.log();
    }
    Ok(())
}

/// Size-check, download, and curate one dataset. `Err` is reserved for
/// fatal problems (unspawnable client, unwritable index); everything else
/// degrades to a skip.
#[allow(clippy::too_many_arguments)]
fn process_dataset(
    client: &RegistryClient,
    dataset_ref: &str,
    keyword: &str,
    config: &Config,
    limits: &CurationLimits,
    ledger: &mut Ledger,
    raw_dir: &Path,
    output_dir: &Path,
) -> Result<DatasetOutcome> {
    let estimate = estimate_size_mb(client, raw_dir, dataset_ref)?;
    if !estimate.permits(config.limits.max_dataset_mb, config.limits.allow_unknown_size) {
        log::info!(
            "{dataset_ref}: skipped ({estimate}, ceiling {} MB)",
            config.limits.max_dataset_mb
        );
        return Ok(DatasetOutcome::SkippedSize);
    }

    if !client.download(dataset_ref, raw_dir)? {
        log::warn!("{dataset_ref}: download failed");
        return Ok(DatasetOutcome::DownloadFailed);
    }
    let Some(archive) = find_archive(raw_dir, dataset_ref) else {
        log::warn!("{dataset_ref}: no archive found after download");
        return Ok(DatasetOutcome::DownloadFailed);
    };

    // The estimate may have been unknown or wrong; re-check the real size.
    if let Ok(meta) = std::fs::metadata(&archive) {
        let mb = meta.len() as f64 / (1024.0 * 1024.0);
        if mb > config.limits.max_dataset_mb {
            log::info!("{dataset_ref}: archive is {mb:.1} MB, over the ceiling; discarded");
            return Ok(DatasetOutcome::SkippedSize);
        }
    }

    let stats = match curate_archive(&archive, dataset_ref, keyword, limits, ledger, output_dir) {
        Ok(stats) => stats,
        Err(e) => {
            log::warn!("{dataset_ref}: curation failed: {e:#}");
            CurationStats::default()
        }
    };
    log::info!(
        "{dataset_ref}: scanned {}, accepted {} ({} total)",
        stats.scanned,
        stats.accepted,
        ledger.accepted()
    );
    Ok(DatasetOutcome::Curated(stats))
}

/// Locate the downloaded archive: `<slug>.zip` first, else the newest zip
/// in staging (the registry names archives after the slug, but that is not
/// contractual).
fn find_archive(raw_dir: &Path, dataset_ref: &str) -> Option<PathBuf> {
    if let Some(slug) = dataset_ref.rsplit('/').next() {
        let direct = raw_dir.join(format!("{slug}.zip"));
        if direct.exists() {
            return Some(direct);
        }
    }
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(raw_dir).ok()?.flatten() {
        let path = entry.path();
        if !path.extension().is_some_and(|ext| ext == "zip") {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
                newest = Some((modified, path));
            }
        }
    }
    newest.map(|(_, path)| path)
}

/// Remove everything inside the staging directory, best-effort.
fn wipe_dir(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        if let Err(e) = result {
            log::debug!("failed to clean {}: {e}", path.display());
        }
    }
}

/// Inter-request pacing: base sleep plus uniform jitter.
fn pace(base_secs: f64, jitter_secs: f64) {
    let jitter = if jitter_secs > 0.0 {
        rand::thread_rng().gen_range(0.0..jitter_secs)
    } else {
        0.0
    };
    let total = base_secs + jitter;
    if total > 0.0 {
        std::thread::sleep(Duration::from_secs_f64(total));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::os::unix::fs::PermissionsExt;

    /// Zip with one qualifying CSV (12 rows x 4 cols) and one reject.
    fn write_bundle(path: &Path) {
        use zip::write::SimpleFileOptions;
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);

        let mut table = String::from("a,b,c,d\n");
        for r in 0..12 {
            table.push_str(&format!("{r},1,2,3\n"));
        }
        writer
            .start_file("measurements.csv", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(table.as_bytes()).unwrap();

        writer
            .start_file("tiny.csv", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"a,b,c,d\n1,2,3,4\n").unwrap();
        writer.finish().unwrap();
    }

    /// Stub registry: one result on page 1, empty pages after, downloads a
    /// prepared bundle.
    fn write_stub(dir: &Path, bundle: &Path) -> PathBuf {
        let path = dir.join("registry-stub.sh");
        let body = format!(
            r#"#!/bin/sh
case "$2" in
  list)
    echo "ref,title,size"
    echo "----"
    [ "$6" = "1" ] && echo "alice/sensor-pool,Sensor Pool,1MB"
    exit 0
    ;;
  metadata) printf '{{"totalBytes": 1048576}}' > "$6/dataset-metadata.json"; exit 0 ;;
  files) echo "measurements.csv 1KB"; exit 0 ;;
  download) cp "{bundle}" "$6/sensor-pool.zip"; exit 0 ;;
  *) exit 1 ;;
esac
"#,
            bundle = bundle.display()
        );
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn test_config(base: &Path, stub: &Path) -> Config {
        let mut config = Config::default();
        config.storage.base_dir = base.to_path_buf();
        config.registry.binary = stub.to_string_lossy().into_owned();
        config.search.keywords = vec!["sensors".to_string()];
        config.search.pages_per_keyword = 3;
        config.pacing.base_sleep_secs = 0.0;
        config.pacing.jitter_secs = 0.0;
        config.limits.min_rows = 10;
        config.limits.min_cols = 4;
        config
    }

    #[test]
    fn full_run_against_stub_registry() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("bundle.zip");
        write_bundle(&bundle);
        let stub = write_stub(dir.path(), &bundle);
        let base = dir.path().join("pool");
        let config = test_config(&base, &stub);

        let progress = ProgressContext::new();
        run(HarvestArgs::default(), &config, &progress).unwrap();

        // One qualifying file promoted, index written, staging wiped.
        let accepted: Vec<_> = std::fs::read_dir(base.join("all_csv"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(accepted.len(), 1);
        assert!(accepted[0].starts_with("measurements_"));

        let index = std::fs::read_to_string(base.join("index.csv")).unwrap();
        assert_eq!(index.lines().count(), 2);
        assert!(index.lines().nth(1).unwrap().contains("alice/sensor-pool"));

        assert_eq!(std::fs::read_dir(base.join("raw_datasets")).unwrap().count(), 0);
    }

    #[test]
    fn rerun_keeps_a_single_index_header() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("bundle.zip");
        write_bundle(&bundle);
        let stub = write_stub(dir.path(), &bundle);
        let base = dir.path().join("pool");
        let config = test_config(&base, &stub);
        let progress = ProgressContext::new();

        run(HarvestArgs::default(), &config, &progress).unwrap();
        // A fresh run starts with an empty hash set, so the same content is
        // accepted again under a collision-suffixed name; the index header
        // must still appear exactly once.
        run(HarvestArgs::default(), &config, &progress).unwrap();
        let index = std::fs::read_to_string(base.join("index.csv")).unwrap();
        let headers = index.lines().filter(|l| l.starts_with("filename,")).count();
        assert_eq!(headers, 1);
    }

    #[test]
    fn dry_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("pool");
        let mut config = Config::default();
        config.storage.base_dir = base.clone();

        let args = HarvestArgs {
            dry_run: true,
            ..HarvestArgs::default()
        };
        run(args, &config, &ProgressContext::new()).unwrap();
        assert!(!base.exists());
    }

    #[test]
    fn find_archive_prefers_the_slug() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("other.zip"), b"x").unwrap();
        std::fs::write(dir.path().join("sensor-pool.zip"), b"x").unwrap();
        let found = find_archive(dir.path(), "alice/sensor-pool").unwrap();
        assert_eq!(found, dir.path().join("sensor-pool.zip"));
    }

    #[test]
    fn find_archive_falls_back_to_any_zip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("whatever.zip"), b"x").unwrap();
        let found = find_archive(dir.path(), "alice/sensor-pool").unwrap();
        assert_eq!(found, dir.path().join("whatever.zip"));
    }

    #[test]
    fn find_archive_empty_staging() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_archive(dir.path(), "alice/sensor-pool").is_none());
    }
}
