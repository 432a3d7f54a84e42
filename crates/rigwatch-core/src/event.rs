//! Typed events produced by the line parser.
//!
//! An [`Event`] is immutable once built: the parser creates it, the store
//! folds it exactly once, and buffers keep clones for display. Everything a
//! folding rule needs is on the event itself — the store never re-parses raw
//! text.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{ts_millis, LogLevel, Mode, Origin, SourceKind};

/// One parsed log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Program kind whose grammar matched the line.
    pub source_kind: SourceKind,
    /// Timestamp from the log header, millisecond precision, UTC.
    #[serde(with = "ts_millis")]
    pub timestamp: DateTime<Utc>,
    /// Severity from the header level character.
    pub level: LogLevel,
    /// What the line means.
    pub kind: EventKind,
    /// The raw line as it appeared in the file.
    pub raw: String,
}

/// The closed set of things a log line can mean to the status model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// The repeater switched operating mode ("Mode set to DMR").
    ModeChanged { mode: Mode },
    /// A voice transmission opened on a `(mode, slot)` key.
    TransmissionStarted {
        mode: Mode,
        slot: Option<u8>,
        source: Option<String>,
        destination: Option<String>,
        origin: Option<Origin>,
    },
    /// A voice transmission closed on a `(mode, slot)` key.
    TransmissionEnded {
        mode: Mode,
        slot: Option<u8>,
        source: Option<String>,
        destination: Option<String>,
        origin: Option<Origin>,
    },
    /// A network link reported itself up. `reliable` is stamped from the
    /// matching rule: only reliable events may flip link state; the rest are
    /// display-only.
    NetworkConnected {
        link: String,
        detail: Option<String>,
        reliable: bool,
    },
    /// A network link reported itself down.
    NetworkDisconnected {
        link: String,
        detail: Option<String>,
        reliable: bool,
    },
    /// The program established its primary upstream attachment — a gateway
    /// linking to MMDVMHost, or MMDVMHost completing the modem handshake.
    ProcessLogin { detail: Option<String> },
    /// An error/fatal line that matched no specific grammar rule.
    ErrorRaised { message: String },
}

impl Event {
    /// The `(mode, slot)` transmission key, if this event opens or closes one.
    pub fn tx_key(&self) -> Option<(Mode, Option<u8>)> {
        match &self.kind {
            EventKind::TransmissionStarted { mode, slot, .. }
            | EventKind::TransmissionEnded { mode, slot, .. } => Some((*mode, *slot)),
            _ => None,
        }
    }
}
