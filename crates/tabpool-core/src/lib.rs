//! Tabpool Core - Infrastructure for the tabular harvesting pipeline
//!
//! This crate provides the pieces shared by the registry client and the
//! pipeline driver: retrying command execution, filename repair, content
//! hashing, archive curation, and the run-global ledger.

pub mod curate;
pub mod exec;
pub mod hash;
pub mod ledger;
pub mod logging;
pub mod names;
pub mod progress;
pub mod tabular;

// Re-exports for convenience
pub use curate::{CurationLimits, CurationStats, curate_archive};
pub use exec::{CmdOutcome, CommandRunner, backoff_delay};
pub use ledger::{INDEX_HEADER, IndexRow, Ledger};
pub use logging::{LogBridge, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use tabular::{TableShape, read_shape};
