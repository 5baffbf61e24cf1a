//! tabpool - curated tabular-data pool from a remote dataset registry
//!
//! Searches the registry by keyword, downloads candidate datasets, and
//! curates a deduplicated, shape-bounded pool of CSV files with an
//! append-only index.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "tabpool")]
#[command(about = "Curated tabular-data pool from a remote dataset registry")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./tabpool.toml or ~/.config/tabpool/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest datasets and curate the pool
    Harvest(cmd::harvest::HarvestArgs),
    /// Estimate one dataset's size through the fallback chain
    Estimate(cmd::estimate::EstimateArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(tabpool_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug  — progress bars show activity
    //   non-TTY: info unless --debug          — logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    tabpool_core::init_logging(quiet, cli.debug, multi);

    // Load configuration
    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    match cli.command {
        Command::Harvest(args) => cmd::harvest::run(args, &config, &progress),
        Command::Estimate(args) => cmd::estimate::run(args, &config),
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec![
                "Base directory",
                &config.storage.base_dir.display().to_string(),
            ]);
            table.add_row(vec!["Registry binary", &config.registry.binary]);
            table.add_row(vec![
                "Global cap",
                &config.limits.max_total_files.to_string(),
            ]);
            table.add_row(vec![
                "Rows",
                &format!("{}-{}", config.limits.min_rows, config.limits.max_rows),
            ]);
            table.add_row(vec!["Cols", &format!(">= {}", config.limits.min_cols)]);
            table.add_row(vec![
                "Per-dataset cap",
                &config.limits.per_dataset_cap.to_string(),
            ]);
            table.add_row(vec!["Scan cap", &config.limits.scan_cap.to_string()]);
            table.add_row(vec![
                "Dataset size ceiling",
                &format!("{} MB", config.limits.max_dataset_mb),
            ]);
            table.add_row(vec![
                "Unknown-size downloads",
                if config.limits.allow_unknown_size {
                    "allowed"
                } else {
                    "denied"
                },
            ]);
            table.add_row(vec![
                "Keywords",
                &config.search.keywords.len().to_string(),
            ]);
            table.add_row(vec![
                "Pages per keyword",
                &config.search.pages_per_keyword.to_string(),
            ]);
            table.add_row(vec![
                "Pacing",
                &format!(
                    "{}s + 0-{}s jitter",
                    config.pacing.base_sleep_secs, config.pacing.jitter_secs
                ),
            ]);

            eprintln!("\n{table}");
            Ok(())
        }
    }
}
