//! Test builders — log-line constructors and config shorthand.
//!
//! Log lines are built in the suite's header format
//! (`M: 2025-08-06 12:00:00.000 message`) with an offset-in-seconds knob so
//! scenarios can express "4.2 seconds later" without repeating timestamps.

use std::path::Path;

use rigwatch_core::config::{LinkConfig, MonitorConfig, SourceConfig};
use rigwatch_core::types::{LinkKind, SourceKind};

/// Base instant every builder offsets from: 2025-08-06 12:00:00.000 UTC.
pub const BASE_TS: &str = "2025-08-06 12:00:00.000";

/// A log line `offset_ms` after [`BASE_TS`], at the suite's `M:` level.
pub fn line_at(offset_ms: i64, message: &str) -> String {
    line_with_level('M', offset_ms, message)
}

/// Same, with an explicit header level character.
pub fn line_with_level(level: char, offset_ms: i64, message: &str) -> String {
    let base: chrono::DateTime<chrono::Utc> = "2025-08-06T12:00:00Z".parse().unwrap();
    let ts = base + chrono::Duration::milliseconds(offset_ms);
    format!("{level}: {} {message}", ts.format("%Y-%m-%d %H:%M:%S%.3f"))
}

/// The base instant as a `DateTime<Utc>`, for asserting against parsed
/// timestamps and for driving sweeps.
pub fn base_time() -> chrono::DateTime<chrono::Utc> {
    "2025-08-06T12:00:00Z".parse().unwrap()
}

// ---------------------------------------------------------------------------
// Config shorthand
// ---------------------------------------------------------------------------

/// Default config with every source's log directory pointed at `dir`.
/// Capacities, hang times, and link lists stay at their defaults.
pub fn config_in(dir: &Path) -> MonitorConfig {
    let mut cfg = MonitorConfig::defaults();
    for source in cfg.sources.values_mut() {
        source.dir = dir.to_path_buf();
    }
    cfg
}

/// A single-source config for `kind` logging into `dir`, with one enabled
/// network link named `link`.
pub fn single_source(dir: &Path, kind: SourceKind, file_root: &str, link: &str) -> SourceConfig {
    SourceConfig {
        enabled: true,
        kind,
        dir: dir.to_path_buf(),
        file_root: file_root.to_string(),
        horizon_days: None,
        links: vec![LinkConfig {
            name: link.to_string(),
            kind: LinkKind::Network,
            enabled: true,
            assume_connected: false,
        }],
    }
}
