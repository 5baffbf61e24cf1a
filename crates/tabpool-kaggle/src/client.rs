//! Registry client: thin wrappers over the external dataset CLI
//!
//! Four operations are consumed: keyword search, file listing, metadata
//! fetch, and archive download. Each is one retried command invocation
//! whose exit status is the success signal and whose textual output is the
//! only result channel.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tabpool_core::exec::{CmdOutcome, CommandRunner};

/// Lines of fixed header at the top of search output.
const SEARCH_HEADER_LINES: usize = 2;

/// Timeout for listing-style commands. Downloads run without one.
const LIST_TIMEOUT: Duration = Duration::from_secs(90);

/// Client for the dataset registry's command-line interface.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    binary: String,
    backoff_override: Option<(Duration, Duration)>,
}

impl RegistryClient {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
            backoff_override: None,
        }
    }

    /// Replace the per-operation retry pacing (tests run with zero delays).
    pub fn with_backoff(mut self, base_delay: Duration, jitter: Duration) -> Self {
        self.backoff_override = Some((base_delay, jitter));
        self
    }

    /// One page of keyword search results, as raw text.
    ///
    /// `None` is a soft failure (the page is skipped); `Err` means the
    /// client binary could not be invoked at all.
    pub fn search_page(&self, keyword: &str, page: usize) -> Result<Option<String>> {
        let runner = self.runner(3, Duration::from_secs(2), Duration::from_secs(1));
        let page = page.to_string();
        self.capture(
            &runner,
            &["datasets", "list", "-s", keyword, "-p", &page, "-v"],
        )
    }

    /// Raw file listing for a dataset, with free-text size annotations.
    pub fn list_files(&self, dataset_ref: &str) -> Result<Option<String>> {
        let runner = self.runner(3, Duration::from_secs(2), Duration::from_secs(1));
        self.capture(&runner, &["datasets", "files", "-d", dataset_ref])
    }

    /// Fetch dataset metadata; the registry writes `dataset-metadata.json`
    /// into `dir`. Returns whether the command succeeded.
    pub fn fetch_metadata(&self, dataset_ref: &str, dir: &Path) -> Result<bool> {
        let runner = self.runner(2, Duration::from_secs(2), Duration::from_secs(1));
        let dir = dir.to_string_lossy();
        self.status(
            &runner,
            &["datasets", "metadata", "-d", dataset_ref, "-p", &dir],
        )
    }

    /// Download a dataset's archive into `dir`. No per-attempt timeout:
    /// large archives legitimately take a while.
    pub fn download(&self, dataset_ref: &str, dir: &Path) -> Result<bool> {
        let mut runner = self.runner(2, Duration::from_secs(3), Duration::from_secs(2));
        runner.timeout = None;
        runner.suppress_stdout = true;
        let dir = dir.to_string_lossy();
        self.status(
            &runner,
            &["datasets", "download", "-d", dataset_ref, "-p", &dir],
        )
    }

    fn runner(&self, retries: u32, base_delay: Duration, jitter: Duration) -> CommandRunner {
        let (base_delay, jitter) = self.backoff_override.unwrap_or((base_delay, jitter));
        CommandRunner {
            retries,
            base_delay,
            jitter,
            timeout: Some(LIST_TIMEOUT),
            suppress_stdout: false,
        }
    }

    fn capture(&self, runner: &CommandRunner, args: &[&str]) -> Result<Option<String>> {
        match runner.run(&self.binary, args)? {
            CmdOutcome::Success { stdout } => Ok(Some(stdout)),
            outcome => {
                log::warn!("{} {}: {outcome}", self.binary, args.join(" "));
                Ok(None)
            }
        }
    }

    fn status(&self, runner: &CommandRunner, args: &[&str]) -> Result<bool> {
        match runner.run(&self.binary, args)? {
            CmdOutcome::Success { .. } => Ok(true),
            outcome => {
                log::warn!("{} {}: {outcome}", self.binary, args.join(" "));
                Ok(false)
            }
        }
    }
}

/// Parse one page of search output: a fixed two-line header followed by one
/// comma-delimited row per dataset, reference in the first field.
///
/// Anything without a `/` in the first field is header noise and dropped.
pub fn parse_search_output(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(SEARCH_HEADER_LINES)
        .filter_map(|line| line.split(',').next())
        .map(str::trim)
        .filter(|field| field.contains('/'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PAGE: &str = "\
ref,title,size,lastUpdated,downloadCount,voteCount,usabilityRating
------------------------------------------------------------------
alice/retail-sales,Retail Sales 2024,12MB,2024-05-01,120,14,0.88
bob/city-census,City Census,450KB,2023-11-20,89,7,0.75
";

    #[test]
    fn parse_skips_the_two_header_lines() {
        let refs = parse_search_output(SAMPLE_PAGE);
        assert_eq!(refs, vec!["alice/retail-sales", "bob/city-census"]);
    }

    #[test]
    fn parse_drops_noise_lines() {
        let page = "ref,title\n----\nWarning: something\nowner/data,Data\n";
        assert_eq!(parse_search_output(page), vec!["owner/data"]);
    }

    #[test]
    fn parse_empty_page() {
        assert!(parse_search_output("ref,title\n----\n").is_empty());
        assert!(parse_search_output("").is_empty());
    }
}
