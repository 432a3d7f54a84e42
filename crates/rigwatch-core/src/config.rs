//! Configuration types for rigwatch.
//!
//! [`MonitorConfig::load`] layers an optional on-disk TOML file over the
//! built-in defaults. [`MonitorConfig::defaults`] returns the same defaults
//! without touching the filesystem (useful in tests).
//!
//! The `[sources.<id>]` tables — including each source's link list — are the
//! product of the external gateway-INI merge. rigwatch consumes them
//! verbatim: `enabled` flags label and enumerate links for display, and are
//! never used to infer connection state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::types::{LinkKind, Mode, SourceKind};

/// Default location probed when no `--config` path is given.
pub const DEFAULT_PATH: &str = "/etc/rigwatch.toml";

// ---------------------------------------------------------------------------
// Embedded defaults
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"
[monitor]
poll_interval_ms   = 500
error_backoff_ms   = 5000
horizon_days       = 7
reconstruct        = true
coalesce_window_ms = 250

[capacities]
transmissions = 50
events        = 100
raw_lines     = 500

[hang_time]
default_secs = 5

[hang_time.by_mode]
dmr = 4
fm  = 10

[sources.mmdvmhost]
enabled   = true
kind      = "mmdvmhost"
dir       = "/var/log/mmdvm"
file_root = "MMDVM"

[[sources.mmdvmhost.links]]
name = "DMR"
kind = "network"

[sources.dmrgateway]
enabled   = true
kind      = "dmrgateway"
dir       = "/var/log/mmdvm"
file_root = "DMRGateway"

[[sources.dmrgateway.links]]
name = "BrandMeister"
kind = "network"

[sources.ysfgateway]
enabled   = true
kind      = "ysfgateway"
dir       = "/var/log/mmdvm"
file_root = "YSFGateway"

[[sources.ysfgateway.links]]
name = "YSF Network"
kind = "network"

[[sources.ysfgateway.links]]
name = "APRS"
kind = "feature"

[sources.p25gateway]
enabled   = true
kind      = "p25gateway"
dir       = "/var/log/mmdvm"
file_root = "P25Gateway"

[[sources.p25gateway.links]]
name = "P25 Network"
kind = "network"
assume_connected = true

[sources.nxdngateway]
enabled   = false
kind      = "nxdngateway"
dir       = "/var/log/mmdvm"
file_root = "NXDNGateway"

[[sources.nxdngateway.links]]
name = "NXDN Network"
kind = "network"
"#;

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    pub monitor: MonitorSection,
    pub capacities: Capacities,
    pub hang_time: HangTime,
    /// Source id → source table. The id is the stable key used across the
    /// store, the snapshot, and change notifications.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

/// `[monitor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSection {
    pub poll_interval_ms: u64,
    pub error_backoff_ms: u64,
    /// Default reconstruction horizon; per-source tables may override.
    pub horizon_days: u32,
    /// `false` skips historical reconstruction entirely for a fast,
    /// all-Unknown startup.
    pub reconstruct: bool,
    pub coalesce_window_ms: u64,
}

impl MonitorSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }
}

/// `[capacities]` section — the ring-buffer bounds. These are the memory
/// ceiling of the whole status model.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Capacities {
    pub transmissions: usize,
    pub events: usize,
    pub raw_lines: usize,
}

/// `[hang_time]` section — seconds of inactivity after which an active
/// transmission is implicitly closed, per mode. Hardware frequently omits
/// the explicit end line, so this is load-bearing, not a safety net.
#[derive(Debug, Clone, Deserialize)]
pub struct HangTime {
    pub default_secs: u64,
    /// Lowercased mode name → seconds ("dmr", "d-star", "fm", …).
    #[serde(default)]
    pub by_mode: BTreeMap<String, u64>,
}

impl HangTime {
    pub fn for_mode(&self, mode: Mode) -> Duration {
        let key = mode.to_string().to_ascii_lowercase();
        Duration::from_secs(*self.by_mode.get(&key).unwrap_or(&self.default_secs))
    }
}

/// One `[sources.<id>]` table: a monitored program and its log location.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub kind: SourceKind,
    /// Directory holding the program's dated log files.
    pub dir: PathBuf,
    /// Filename stem; the program writes `<file_root>-<YYYY-MM-DD>.log`.
    pub file_root: String,
    /// Per-source override of `[monitor] horizon_days`.
    pub horizon_days: Option<u32>,
    #[serde(default)]
    pub links: Vec<LinkConfig>,
}

fn default_enabled() -> bool {
    true
}

impl SourceConfig {
    /// The dated log file this source writes on `date`.
    pub fn dated_path(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}-{}.log", self.file_root, date.format("%Y-%m-%d")))
    }

    pub fn horizon(&self, default_days: u32) -> u32 {
        self.horizon_days.unwrap_or(default_days)
    }
}

/// One configured link of a source, as produced by the external INI merge.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    pub name: String,
    pub kind: LinkKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lower-confidence tier for protocols without a trustworthy disconnect
    /// signal: report Connected (Assumed) instead of Unknown when no
    /// defining event exists.
    #[serde(default)]
    pub assume_connected: bool,
}

impl MonitorConfig {
    /// Load from `path` (or probe [`DEFAULT_PATH`]), layered on top of the
    /// built-in defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml));

        builder = match path {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(
                config::File::with_name(DEFAULT_PATH)
                    .format(config::FileFormat::Toml)
                    .required(false),
            ),
        };

        builder.build()?.try_deserialize().map_err(Into::into)
    }

    /// Return the built-in defaults without touching the filesystem.
    pub fn defaults() -> Self {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .build()
            .expect("built-in default config must be valid TOML")
            .try_deserialize()
            .expect("built-in default config must deserialize correctly")
    }

    /// Sources the daemon should actually monitor.
    pub fn enabled_sources(&self) -> impl Iterator<Item = (&str, &SourceConfig)> {
        self.sources
            .iter()
            .filter(|(_, src)| src.enabled)
            .map(|(id, src)| (id.as_str(), src))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
