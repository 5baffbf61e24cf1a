//! `tabpool estimate` - one-shot size estimate for a dataset

use anyhow::{Context, Result};
use clap::Args;

use tabpool_kaggle::client::RegistryClient;
use tabpool_kaggle::size::estimate_size_mb;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct EstimateArgs {
    /// Dataset reference (owner/slug)
    pub dataset_ref: String,
}

pub fn run(args: EstimateArgs, config: &Config) -> Result<()> {
    let scratch = tempfile::tempdir().context("cannot create scratch directory")?;
    let client = RegistryClient::new(&config.registry.binary);
    let estimate = estimate_size_mb(&client, scratch.path(), &args.dataset_ref)?;
    println!("{}: {estimate}", args.dataset_ref);
    Ok(())
}
