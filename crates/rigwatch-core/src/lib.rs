//! rigwatch-core — log-interpretation and state-reconstruction engine.
//!
//! The MMDVM suite's programs expose no control API; everything rigwatch
//! knows, it reads out of their append-only log files. This crate holds the
//! pieces that interpret those files and maintain the status model:
//!
//! ```text
//! Reconstructor ──seed──► StateStore ◄──fold── Tailers
//!                             │
//!                   snapshot / subscribe
//! ```
//!
//! File IO (live tailing, historical scans) lives in `rigwatch-tail`; this
//! crate is pure interpretation and state. Both the bootstrap scan and live
//! tailing fold events through the same [`store::StateStore::apply`] path.

pub mod config;
pub mod event;
pub mod notify;
pub mod patterns;
pub mod ring;
pub mod store;
pub mod types;

pub use event::{Event, EventKind};
pub use patterns::PatternLibrary;
pub use store::{Baseline, Change, Snapshot, StateStore, Transmission};
pub use types::{Confidence, LinkKind, LinkState, LogLevel, Mode, Origin, SourceKind};
