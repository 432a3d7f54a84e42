//! rigwatch-tail — file IO for rigwatch.
//!
//! Two consumers of the same log files live here: the [`history`]
//! reconstructor, which walks dated files backward once at startup to build
//! a baseline, and the [`tailer`], which follows the current file forever.
//! Both parse with the shared `PatternLibrary` and fold through the shared
//! `StateStore`, so bootstrap and live updates can never disagree on
//! semantics.
//!
//! Every error here is local to one source and absorbed by its own loop:
//! a missing or rotating log file never affects another source or the
//! process as a whole.

pub mod cursor;
pub mod history;
pub mod tailer;

use std::path::PathBuf;

pub use cursor::Cursor;
pub use history::reconstruct;
pub use tailer::Tailer;

/// IO failures a tailer can hit. All of them are retried on the next poll;
/// none terminate the task.
#[derive(Debug, thiserror::Error)]
pub enum TailError {
    /// The log file is missing or unreadable. The source stays Unknown and
    /// the tailer retries after its error backoff.
    #[error("log file unavailable: {path}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("error reading {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
