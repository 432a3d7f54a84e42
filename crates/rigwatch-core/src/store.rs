//! State store — the authoritative in-memory status model.
//!
//! The store is the single source of truth; consumers read from it, never
//! from the tailers directly. Historical reconstruction seeds it once per
//! source at startup, then live tailers fold events through [`StateStore::apply`]
//! — one folding path shared by both.
//!
//! Mutations are serialized behind a mutex with short, never-awaiting
//! critical sections. Every buffer is a fixed-capacity [`Ring`], so the
//! model's memory is bounded no matter how long the daemon runs. Folding
//! never returns an error: an event that cannot cleanly apply degrades to a
//! best-effort record instead of aborting.
//!
//! Change notifications go out on a `tokio::sync::broadcast` channel. A slow
//! or vanished subscriber drops messages instead of blocking the folding
//! path; a later [`StateStore::snapshot`] recovers full fidelity.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::MonitorConfig;
use crate::event::{Event, EventKind};
use crate::ring::Ring;
use crate::types::{ts_millis, Confidence, LinkKind, LinkState, Mode, Origin, SourceKind};

/// Buffered change notifications per subscriber before lag-dropping begins.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Model types
// ---------------------------------------------------------------------------

/// The single slot a transmission may occupy: at most one active
/// transmission exists per key at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxKey {
    pub mode: Mode,
    pub slot: Option<u8>,
}

/// One voice transmission, active or closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transmission {
    pub mode: Mode,
    pub slot: Option<u8>,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub origin: Option<Origin>,
    #[serde(with = "ts_millis")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "ts_millis::opt")]
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    /// `None` while active.
    pub closure: Option<Closure>,
}

impl Transmission {
    pub fn key(&self) -> TxKey {
        TxKey {
            mode: self.mode,
            slot: self.slot,
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    fn close(&mut self, at: DateTime<Utc>, closure: Closure) {
        self.duration_ms = Some((at - self.started_at).num_milliseconds().max(0));
        self.ended_at = Some(at);
        self.closure = Some(closure);
    }
}

/// How a transmission record was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Closure {
    /// The log carried an explicit end line.
    Reported,
    /// Force-closed because a new start claimed the same key.
    Preempted,
    /// Closed by the hang-time sweep; the hardware omitted the end line.
    HangTimeout,
    /// Synthetic record for an end with no matching start.
    InferredStart,
}

/// Status of one configured network link or feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkLink {
    pub name: String,
    pub kind: LinkKind,
    /// From configuration; display-only, never evidence of connection.
    pub enabled: bool,
    pub state: LinkState,
    pub confidence: Confidence,
    /// Display context (reflector name, master address).
    pub detail: Option<String>,
    #[serde(with = "ts_millis::opt")]
    pub last_changed_at: Option<DateTime<Utc>>,
}

impl NetworkLink {
    fn unknown(name: &str, kind: LinkKind, enabled: bool) -> NetworkLink {
        NetworkLink {
            name: name.to_string(),
            kind,
            enabled,
            state: LinkState::Unknown,
            confidence: Confidence::Confirmed,
            detail: None,
            last_changed_at: None,
        }
    }
}

/// Liveness as evidenced by log output alone. Real process-liveness checks
/// belong to the host's service manager, outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessStatus {
    Unknown,
    Active {
        #[serde(with = "ts_millis")]
        last_seen: DateTime<Utc>,
    },
}

/// One raw line kept for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawLine {
    #[serde(with = "ts_millis")]
    pub received_at: DateTime<Utc>,
    pub text: String,
}

struct SourceState {
    kind: SourceKind,
    current_mode: Option<Mode>,
    process_status: ProcessStatus,
    login_detail: Option<String>,
    links: BTreeMap<String, NetworkLink>,
    events: Ring<Event>,
    raw: Ring<RawLine>,
}

// ---------------------------------------------------------------------------
// Baseline (reconstruction output)
// ---------------------------------------------------------------------------

/// What historical reconstruction resolved for one source. Applied once via
/// [`StateStore::seed`] before any subscriber attaches; seeding emits no
/// change notifications.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Baseline {
    pub current_mode: Option<(Mode, DateTime<Utc>)>,
    pub links: BTreeMap<String, LinkResolution>,
    pub login: Option<(Option<String>, DateTime<Utc>)>,
    /// Recently closed transmissions recovered from the newest scanned day.
    pub recent_transmissions: Vec<Transmission>,
}

/// Resolved state of one link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkResolution {
    pub state: LinkState,
    pub confidence: Confidence,
    pub detail: Option<String>,
    pub changed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// Immutable point-in-time copy of the whole status model.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    #[serde(with = "ts_millis")]
    pub taken_at: DateTime<Utc>,
    pub sources: BTreeMap<String, SourceSnapshot>,
    pub active_transmissions: Vec<Transmission>,
    pub recent_transmissions: Vec<Transmission>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSnapshot {
    pub kind: SourceKind,
    pub current_mode: Option<Mode>,
    pub process_status: ProcessStatus,
    pub login_detail: Option<String>,
    pub links: BTreeMap<String, NetworkLink>,
}

// ---------------------------------------------------------------------------
// Change notifications
// ---------------------------------------------------------------------------

/// One mutation of the status model, for external fan-out.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change {
    ModeChanged {
        source: String,
        mode: Mode,
    },
    TransmissionStarted {
        transmission: Transmission,
    },
    TransmissionEnded {
        transmission: Transmission,
    },
    LinkStateChanged {
        source: String,
        link: String,
        state: LinkState,
        confidence: Confidence,
    },
    RawLineAppended {
        source: String,
        text: String,
    },
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

struct Inner {
    sources: BTreeMap<String, SourceState>,
    active: HashMap<TxKey, Transmission>,
    recent: Ring<Transmission>,
}

/// The shared status model. One instance per daemon, passed explicitly to
/// every tailer and every read path.
pub struct StateStore {
    inner: Mutex<Inner>,
    changes: broadcast::Sender<Change>,
    config: MonitorConfig,
}

impl StateStore {
    /// Build the store with one [`SourceState`] per enabled configured
    /// source, everything Unknown until seeded or folded.
    pub fn new(config: &MonitorConfig) -> StateStore {
        let caps = config.capacities;
        let sources = config
            .enabled_sources()
            .map(|(id, src)| {
                let links = src
                    .links
                    .iter()
                    .map(|l| (l.name.clone(), NetworkLink::unknown(&l.name, l.kind, l.enabled)))
                    .collect();
                (
                    id.to_string(),
                    SourceState {
                        kind: src.kind,
                        current_mode: None,
                        process_status: ProcessStatus::Unknown,
                        login_detail: None,
                        links,
                        events: Ring::new(caps.events),
                        raw: Ring::new(caps.raw_lines),
                    },
                )
            })
            .collect();

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        StateStore {
            inner: Mutex::new(Inner {
                sources,
                active: HashMap::new(),
                recent: Ring::new(caps.transmissions),
            }),
            changes,
            config: config.clone(),
        }
    }

    /// Subscribe to change notifications. Receivers that fall behind drop
    /// messages rather than slowing the folding path.
    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    fn emit(&self, change: Change) {
        // Err just means nobody is listening right now.
        let _ = self.changes.send(change);
    }

    // -- write paths --------------------------------------------------------

    /// Apply a reconstruction baseline. Runs before subscribers attach and
    /// emits nothing; the first snapshot carries the result.
    pub fn seed(&self, source_id: &str, baseline: Baseline) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(state) = inner.sources.get_mut(source_id) else {
            tracing::debug!(source = source_id, "seed for unknown source ignored");
            return;
        };

        if let Some((mode, _)) = baseline.current_mode {
            state.current_mode = Some(mode);
        }
        for (name, resolution) in baseline.links {
            if let Some(link) = state.links.get_mut(&name) {
                link.state = resolution.state;
                link.confidence = resolution.confidence;
                link.detail = resolution.detail;
                link.last_changed_at = resolution.changed_at;
            }
        }
        if let Some((detail, at)) = baseline.login {
            state.process_status = ProcessStatus::Active { last_seen: at };
            state.login_detail = detail;
        }
        for tx in baseline.recent_transmissions {
            inner.recent.push(tx);
        }
    }

    /// Record a raw line into the source's display buffer. Every tailed
    /// line lands here whether or not it parses.
    pub fn record_line(&self, source_id: &str, text: &str) {
        {
            let mut inner = self.lock();
            let Some(state) = inner.sources.get_mut(source_id) else {
                return;
            };
            state.raw.push(RawLine {
                received_at: Utc::now(),
                text: text.to_string(),
            });
        }
        self.emit(Change::RawLineAppended {
            source: source_id.to_string(),
            text: text.to_string(),
        });
    }

    /// Fold one parsed event into the model. Never fails: inconsistent
    /// folds degrade to best-effort records, unknown sources are ignored.
    pub fn apply(&self, source_id: &str, event: Event) {
        let mut pending = Vec::new();
        {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let Some(state) = inner.sources.get_mut(source_id) else {
                tracing::debug!(source = source_id, "event for unknown source dropped");
                return;
            };

            // Source isolation: an event from a different program kind may
            // sit in the buffers but never mutates status fields.
            if event.source_kind != state.kind {
                tracing::debug!(
                    source = source_id,
                    event_kind = %event.source_kind,
                    "source-kind mismatch, event buffered without folding"
                );
                state.events.push(event);
                return;
            }

            state.process_status = ProcessStatus::Active {
                last_seen: event.timestamp,
            };

            match &event.kind {
                EventKind::ModeChanged { mode } => {
                    state.current_mode = Some(*mode);
                    pending.push(Change::ModeChanged {
                        source: source_id.to_string(),
                        mode: *mode,
                    });
                }
                EventKind::TransmissionStarted {
                    mode,
                    slot,
                    source,
                    destination,
                    origin,
                } => {
                    let key = TxKey {
                        mode: *mode,
                        slot: *slot,
                    };
                    if let Some(mut prev) = inner.active.remove(&key) {
                        // Occupied key: the previous carrier never ended
                        // cleanly. Close it against the new start time.
                        prev.close(event.timestamp, Closure::Preempted);
                        pending.push(Change::TransmissionEnded {
                            transmission: prev.clone(),
                        });
                        inner.recent.push(prev);
                    }
                    let tx = Transmission {
                        mode: *mode,
                        slot: *slot,
                        source: source.clone(),
                        destination: destination.clone(),
                        origin: *origin,
                        started_at: event.timestamp,
                        ended_at: None,
                        duration_ms: None,
                        closure: None,
                    };
                    pending.push(Change::TransmissionStarted {
                        transmission: tx.clone(),
                    });
                    inner.active.insert(key, tx);
                }
                EventKind::TransmissionEnded {
                    mode,
                    slot,
                    source,
                    destination,
                    origin,
                } => {
                    let key = TxKey {
                        mode: *mode,
                        slot: *slot,
                    };
                    let closed = match inner.active.remove(&key) {
                        Some(mut tx) => {
                            tx.close(event.timestamp, Closure::Reported);
                            tx
                        }
                        None => {
                            // End with no matching start: keep a synthetic
                            // zero-length record flagged as inferred.
                            tracing::debug!(source = source_id, ?key, "end without start");
                            Transmission {
                                mode: *mode,
                                slot: *slot,
                                source: source.clone(),
                                destination: destination.clone(),
                                origin: *origin,
                                started_at: event.timestamp,
                                ended_at: Some(event.timestamp),
                                duration_ms: Some(0),
                                closure: Some(Closure::InferredStart),
                            }
                        }
                    };
                    pending.push(Change::TransmissionEnded {
                        transmission: closed.clone(),
                    });
                    inner.recent.push(closed);
                }
                EventKind::NetworkConnected {
                    link,
                    detail,
                    reliable,
                } => {
                    if let Some(change) = fold_link(
                        state,
                        source_id,
                        link,
                        LinkState::Connected,
                        detail,
                        *reliable,
                        event.timestamp,
                    ) {
                        pending.push(change);
                    }
                }
                EventKind::NetworkDisconnected {
                    link,
                    detail,
                    reliable,
                } => {
                    if let Some(change) = fold_link(
                        state,
                        source_id,
                        link,
                        LinkState::Disconnected,
                        detail,
                        *reliable,
                        event.timestamp,
                    ) {
                        pending.push(change);
                    }
                }
                EventKind::ProcessLogin { detail } => {
                    if detail.is_some() {
                        state.login_detail = detail.clone();
                    }
                }
                EventKind::ErrorRaised { .. } => {}
            }

            state.events.push(event);
        }

        for change in pending {
            self.emit(change);
        }
    }

    /// Close every active transmission whose key has been quiet longer than
    /// its mode's hang time. Scheduled periodically by the daemon; `now` is
    /// injected for determinism.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let mut pending = Vec::new();
        {
            let mut inner = self.lock();
            let hang = &self.config.hang_time;
            let hung: Vec<TxKey> = inner
                .active
                .iter()
                .filter(|(key, tx)| {
                    let threshold = chrono::Duration::from_std(hang.for_mode(key.mode))
                        .unwrap_or_else(|_| chrono::Duration::seconds(5));
                    now - tx.started_at > threshold
                })
                .map(|(key, _)| *key)
                .collect();

            for key in hung {
                if let Some(mut tx) = inner.active.remove(&key) {
                    let at = tx.started_at
                        + chrono::Duration::from_std(hang.for_mode(key.mode))
                            .unwrap_or_else(|_| chrono::Duration::seconds(5));
                    tx.close(at, Closure::HangTimeout);
                    tracing::debug!(mode = %key.mode, "transmission closed by hang sweep");
                    pending.push(Change::TransmissionEnded {
                        transmission: tx.clone(),
                    });
                    inner.recent.push(tx);
                }
            }
        }

        for change in pending {
            self.emit(change);
        }
    }

    // -- read paths ---------------------------------------------------------

    /// Immutable copy of status across all sources.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            taken_at: Utc::now(),
            sources: inner
                .sources
                .iter()
                .map(|(id, s)| {
                    (
                        id.clone(),
                        SourceSnapshot {
                            kind: s.kind,
                            current_mode: s.current_mode,
                            process_status: s.process_status,
                            login_detail: s.login_detail.clone(),
                            links: s.links.clone(),
                        },
                    )
                })
                .collect(),
            active_transmissions: inner.active.values().cloned().collect(),
            recent_transmissions: inner.recent.newest(inner.recent.capacity()).cloned().collect(),
        }
    }

    /// Closed transmissions, newest first.
    pub fn recent_transmissions(&self, limit: usize) -> Vec<Transmission> {
        let inner = self.lock();
        inner.recent.newest(limit).cloned().collect()
    }

    /// Parsed events across all sources, newest first.
    pub fn recent_events(&self, limit: usize) -> Vec<Event> {
        let inner = self.lock();
        let mut events: Vec<Event> = inner
            .sources
            .values()
            .flat_map(|s| s.events.iter().cloned())
            .collect();
        events.sort_by_key(|e| std::cmp::Reverse(e.timestamp));
        events.truncate(limit);
        events
    }

    /// Raw display lines for one source, newest first.
    pub fn recent_raw_lines(&self, source_id: &str, limit: usize) -> Vec<RawLine> {
        let inner = self.lock();
        inner
            .sources
            .get(source_id)
            .map(|s| s.raw.newest(limit).cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned mutex means a panic mid-fold; the model is still
        // structurally sound (rings and maps), so keep serving.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Apply a connect/disconnect event to a link. Only reliable events touch
/// state; only configured links exist. Returns the change to emit, if any.
fn fold_link(
    state: &mut SourceState,
    source_id: &str,
    link: &str,
    new_state: LinkState,
    detail: &Option<String>,
    reliable: bool,
    at: DateTime<Utc>,
) -> Option<Change> {
    if !reliable {
        return None;
    }
    let Some(entry) = state.links.get_mut(link) else {
        tracing::debug!(source = source_id, link, "event for unconfigured link buffered");
        return None;
    };

    let detail_changed = detail.is_some() && *detail != entry.detail;
    if entry.state == new_state && entry.confidence == Confidence::Confirmed && !detail_changed {
        return None;
    }

    entry.state = new_state;
    entry.confidence = Confidence::Confirmed;
    if detail.is_some() {
        entry.detail = detail.clone();
    }
    entry.last_changed_at = Some(at);

    Some(Change::LinkStateChanged {
        source: source_id.to_string(),
        link: link.to_string(),
        state: new_state,
        confidence: Confidence::Confirmed,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
