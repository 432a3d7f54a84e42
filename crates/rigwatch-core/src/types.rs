//! Core vocabulary for rigwatch-core.
//!
//! This module defines the closed sets the rest of the crate is built on: the
//! [`SourceKind`] discriminant for the five monitored programs, the
//! [`LogLevel`] decoded from the MMDVM log header, the canonical [`Mode`]
//! ontology with its vendor-spelling alias table, and the link-state types
//! used by the status model.

use serde::Serialize;

/// Which monitored program produced a log line or event.
///
/// The set is closed: the suite consists of MMDVMHost plus one gateway
/// process per network protocol, and each has its own log grammar. There is
/// no runtime registration of new kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    MmdvmHost,
    DmrGateway,
    YsfGateway,
    P25Gateway,
    NxdnGateway,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::MmdvmHost => write!(f, "mmdvmhost"),
            SourceKind::DmrGateway => write!(f, "dmrgateway"),
            SourceKind::YsfGateway => write!(f, "ysfgateway"),
            SourceKind::P25Gateway => write!(f, "p25gateway"),
            SourceKind::NxdnGateway => write!(f, "nxdngateway"),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = UnknownSourceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mmdvm" | "mmdvmhost" => Ok(SourceKind::MmdvmHost),
            "dmrgateway" => Ok(SourceKind::DmrGateway),
            "ysfgateway" => Ok(SourceKind::YsfGateway),
            "p25gateway" => Ok(SourceKind::P25Gateway),
            "nxdngateway" => Ok(SourceKind::NxdnGateway),
            other => Err(UnknownSourceKind(other.to_string())),
        }
    }
}

impl<'de> serde::Deserialize<'de> for SourceKind {
    fn deserialize<D: serde::Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let raw = <String as serde::Deserialize>::deserialize(de)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A source kind string in the configuration that names no known program.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown source kind: {0}")]
pub struct UnknownSourceKind(pub String);

/// Log severity, decoded from the single-character level field the whole
/// suite writes at the front of every line (`M: 2025-08-06 12:00:00.000 …`).
///
/// `M` (message), `I` (info), and `S` (status) all fold into `Info`; the
/// remaining characters map one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl LogLevel {
    /// Decode the header level character. Returns `None` for characters the
    /// suite never emits, which makes the caller treat the line as unmatched.
    pub fn from_header_char(c: char) -> Option<LogLevel> {
        match c {
            'D' => Some(LogLevel::Debug),
            'M' | 'I' | 'S' => Some(LogLevel::Info),
            'W' => Some(LogLevel::Warning),
            'E' => Some(LogLevel::Error),
            'F' => Some(LogLevel::Fatal),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Fatal => write!(f, "FATAL"),
        }
    }
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// Canonical digital/analog mode names.
///
/// The repeater's "Mode set to …" lines and the per-mode transmission
/// grammars spell these several ways ("D-Star", "DStar", "System Fusion",
/// "YSF"). [`Mode::canonical`] maps every vendor spelling onto one variant so
/// callers never compare raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    Idle,
    Dmr,
    #[serde(rename = "D-STAR")]
    DStar,
    Ysf,
    P25,
    Nxdn,
    Fm,
    Pocsag,
    Cw,
    Lockout,
    Error,
}

/// Vendor spellings → canonical mode. Keys are matched after trimming and
/// lowercasing the captured text.
static MODE_ALIASES: phf::Map<&'static str, Mode> = phf::phf_map! {
    "idle" => Mode::Idle,
    "dmr" => Mode::Dmr,
    "d-star" => Mode::DStar,
    "dstar" => Mode::DStar,
    "system fusion" => Mode::Ysf,
    "ysf" => Mode::Ysf,
    "p25" => Mode::P25,
    "nxdn" => Mode::Nxdn,
    "fm" => Mode::Fm,
    "pocsag" => Mode::Pocsag,
    "cw" => Mode::Cw,
    "lockout" => Mode::Lockout,
    "error" => Mode::Error,
};

impl Mode {
    /// Resolve a raw mode name from a log line to its canonical variant.
    /// Returns `None` for names outside the suite's vocabulary; callers drop
    /// the line rather than guessing.
    pub fn canonical(raw: &str) -> Option<Mode> {
        MODE_ALIASES.get(raw.trim().to_ascii_lowercase().as_str()).copied()
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Idle => write!(f, "IDLE"),
            Mode::Dmr => write!(f, "DMR"),
            Mode::DStar => write!(f, "D-Star"),
            Mode::Ysf => write!(f, "YSF"),
            Mode::P25 => write!(f, "P25"),
            Mode::Nxdn => write!(f, "NXDN"),
            Mode::Fm => write!(f, "FM"),
            Mode::Pocsag => write!(f, "POCSAG"),
            Mode::Cw => write!(f, "CW"),
            Mode::Lockout => write!(f, "Lockout"),
            Mode::Error => write!(f, "Error"),
        }
    }
}

/// Whether a transmission was heard over the air or arrived from the
/// network side. Grammars that don't distinguish leave it unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Rf,
    Network,
}

impl Origin {
    /// Decode the `(network|RF)` capture group the MMDVMHost grammars share.
    pub fn from_capture(raw: &str) -> Option<Origin> {
        match raw {
            "RF" => Some(Origin::Rf),
            "network" => Some(Origin::Network),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Link state
// ---------------------------------------------------------------------------

/// Connection state of one network link or feature, as evidenced by log
/// lines. `Unknown` is an honest answer: it means no defining event was
/// found, never a guess in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Connected,
    Disconnected,
    Unknown,
}

/// How much to trust a link's `Connected` state.
///
/// `Confirmed` means a reliable log phrase established it. `Assumed` is the
/// lower-confidence tier for links whose protocol offers no trustworthy
/// disconnect signal: configuration may declare them assumed-connected while
/// the owning process runs, and that assumption is kept distinct from
/// event-derived state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Confirmed,
    Assumed,
}

/// Whether a configured link is a network connection or a local feature
/// (APRS, remote control, …). Features are displayed but carry no
/// connection-state semantics beyond their enabled flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Network,
    Feature,
}

// ---------------------------------------------------------------------------
// Timestamp serialization
// ---------------------------------------------------------------------------

/// Serde adapter fixing the one textual timestamp representation used across
/// the snapshot boundary: millisecond-precision UTC, `2025-08-06T12:34:56.789Z`.
pub mod ts_millis {
    use chrono::{DateTime, Utc};
    use serde::Serializer;

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&ts.format(FORMAT).to_string())
    }

    /// Variant for `Option<DateTime<Utc>>` fields.
    pub mod opt {
        use chrono::{DateTime, Utc};
        use serde::Serializer;

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            ser: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => ser.serialize_str(&ts.format(super::FORMAT).to_string()),
                None => ser.serialize_none(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
