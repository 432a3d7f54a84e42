//! Pattern library and line parser.
//!
//! Every program in the suite logs through the same header grammar
//! (`L: YYYY-MM-DD hh:mm:ss.mmm message`) but speaks its own message grammar
//! behind it. This module holds one priority-ordered rule table per
//! [`SourceKind`] and turns raw lines into typed [`Event`]s.
//!
//! Rules are data: a compiled regex, a [`Shape`] describing how captures map
//! onto an event kind, and a reliability flag. Tables are declared
//! most-specific-first — end-of-transmission phrases before the looser start
//! phrases — so a line is never claimed by the wrong rule. All regexes
//! compile once in [`PatternLibrary::new`]; parsing a line allocates only for
//! the captured fields.
//!
//! Unmatched lines are not errors. The overwhelming majority of log volume
//! is irrelevant to the status model and [`PatternLibrary::parse`] simply
//! returns `None` for it.

use chrono::NaiveDateTime;
use regex::{Captures, Regex};

use crate::event::{Event, EventKind};
use crate::types::{LogLevel, Mode, Origin, SourceKind};

/// Shared header grammar: level character, millisecond timestamp, message.
const HEADER: &str = r"^([A-Z]): (\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3})\s+(.*)$";

/// Timestamp layout inside the header.
const HEADER_TS: &str = "%Y-%m-%d %H:%M:%S%.3f";

// ---------------------------------------------------------------------------
// Rule shapes
// ---------------------------------------------------------------------------

/// How a rule's captures map onto an [`EventKind`].
#[derive(Debug, Clone, Copy)]
enum Shape {
    /// Capture 1 is a raw mode name ("Mode set to DMR").
    ModeChange,
    TxStart(TxLayout),
    TxEnd(TxLayout),
    Linked(LinkSpec),
    Unlinked(LinkSpec),
    /// Primary upstream attachment; optional capture index for detail text.
    Login(Option<usize>),
}

/// Capture layout of the per-protocol transmission grammars.
#[derive(Debug, Clone, Copy)]
enum TxLayout {
    /// slot, origin, source, talkgroup
    Dmr,
    /// origin, source, DG-ID
    Ysf,
    /// origin, source, talkgroup
    P25,
    /// origin, source, talkgroup
    Nxdn,
    /// source callsign, suffix, destination
    DStarHeader,
    /// no captures
    DStarEnd,
    /// no captures
    Fm,
}

/// Which link a connect/disconnect phrase refers to, and where its
/// display detail comes from.
#[derive(Debug, Clone, Copy)]
struct LinkSpec {
    name: LinkName,
    detail: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
enum LinkName {
    /// The link name is captured from the line (DMRGateway logs the network
    /// name it is talking to).
    Capture(usize),
    /// The grammar implies a single well-known link.
    Fixed(&'static str),
}

struct Rule {
    re: Regex,
    shape: Shape,
    /// Reliable rules may flip link state; advisory rules are retained for
    /// the event buffer only. Curated per source kind.
    reliable: bool,
}

impl Rule {
    fn new(pattern: &str, shape: Shape) -> Rule {
        Rule {
            re: Regex::new(pattern).expect("static pattern must compile"),
            shape,
            reliable: true,
        }
    }

    /// A phrase that announces intent or ambiguity rather than a settled
    /// state transition ("Connect … has been requested").
    fn advisory(pattern: &str, shape: Shape) -> Rule {
        Rule {
            reliable: false,
            ..Rule::new(pattern, shape)
        }
    }
}

// ---------------------------------------------------------------------------
// PatternLibrary
// ---------------------------------------------------------------------------

/// Prepared rule tables for every source kind. Build once at startup and
/// share behind `Arc`; [`parse`](PatternLibrary::parse) is `&self` and
/// thread-safe.
pub struct PatternLibrary {
    header: Regex,
    mmdvmhost: Vec<Rule>,
    dmr_gateway: Vec<Rule>,
    ysf_gateway: Vec<Rule>,
    p25_gateway: Vec<Rule>,
    nxdn_gateway: Vec<Rule>,
}

impl Default for PatternLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternLibrary {
    pub fn new() -> Self {
        PatternLibrary {
            header: Regex::new(HEADER).expect("static pattern must compile"),
            mmdvmhost: mmdvmhost_rules(),
            dmr_gateway: dmr_gateway_rules(),
            ysf_gateway: ysf_gateway_rules(),
            p25_gateway: p25_gateway_rules(),
            nxdn_gateway: nxdn_gateway_rules(),
        }
    }

    fn rules(&self, kind: SourceKind) -> &[Rule] {
        match kind {
            SourceKind::MmdvmHost => &self.mmdvmhost,
            SourceKind::DmrGateway => &self.dmr_gateway,
            SourceKind::YsfGateway => &self.ysf_gateway,
            SourceKind::P25Gateway => &self.p25_gateway,
            SourceKind::NxdnGateway => &self.nxdn_gateway,
        }
    }

    /// Parse one raw line against `kind`'s rule table.
    ///
    /// Returns `None` for: lines without the suite's header (ParseMiss),
    /// headers whose timestamp fails to parse (MalformedTimestamp — the
    /// caller keeps the raw line), and informational lines no rule claims.
    /// Error/fatal-level lines that match no rule still surface as
    /// [`EventKind::ErrorRaised`] so problems are visible in the event feed.
    pub fn parse(&self, kind: SourceKind, line: &str) -> Option<Event> {
        let caps = self.header.captures(line.trim_end())?;
        let level_char = caps.get(1)?.as_str().chars().next()?;
        let level = LogLevel::from_header_char(level_char)?;

        let timestamp = match NaiveDateTime::parse_from_str(&caps[2], HEADER_TS) {
            Ok(naive) => naive.and_utc(),
            Err(err) => {
                tracing::debug!(source = %kind, %err, "malformed timestamp, line dropped");
                return None;
            }
        };

        let message = caps.get(3)?.as_str();

        for rule in self.rules(kind) {
            if let Some(caps) = rule.re.captures(message) {
                let kind_built = build_kind(rule, &caps)?;
                return Some(Event {
                    source_kind: kind,
                    timestamp,
                    level,
                    kind: kind_built,
                    raw: line.trim_end().to_string(),
                });
            }
        }

        if level >= LogLevel::Error {
            return Some(Event {
                source_kind: kind,
                timestamp,
                level,
                kind: EventKind::ErrorRaised {
                    message: message.to_string(),
                },
                raw: line.trim_end().to_string(),
            });
        }

        None
    }
}

// ---------------------------------------------------------------------------
// Capture → EventKind
// ---------------------------------------------------------------------------

fn cap(caps: &Captures<'_>, i: usize) -> Option<String> {
    caps.get(i).map(|m| m.as_str().trim().to_string())
}

fn build_kind(rule: &Rule, caps: &Captures<'_>) -> Option<EventKind> {
    match rule.shape {
        Shape::ModeChange => {
            let mode = Mode::canonical(caps.get(1)?.as_str())?;
            Some(EventKind::ModeChanged { mode })
        }
        Shape::TxStart(layout) => build_tx(layout, caps, true),
        Shape::TxEnd(layout) => build_tx(layout, caps, false),
        Shape::Linked(spec) => Some(EventKind::NetworkConnected {
            link: link_name(spec, caps)?,
            detail: spec.detail.and_then(|i| cap(caps, i)),
            reliable: rule.reliable,
        }),
        Shape::Unlinked(spec) => Some(EventKind::NetworkDisconnected {
            link: link_name(spec, caps)?,
            detail: spec.detail.and_then(|i| cap(caps, i)),
            reliable: rule.reliable,
        }),
        Shape::Login(detail) => Some(EventKind::ProcessLogin {
            detail: detail.and_then(|i| cap(caps, i)),
        }),
    }
}

fn link_name(spec: LinkSpec, caps: &Captures<'_>) -> Option<String> {
    match spec.name {
        LinkName::Capture(i) => cap(caps, i),
        LinkName::Fixed(name) => Some(name.to_string()),
    }
}

fn build_tx(layout: TxLayout, caps: &Captures<'_>, start: bool) -> Option<EventKind> {
    let (mode, slot, source, destination, origin) = match layout {
        TxLayout::Dmr => (
            Mode::Dmr,
            cap(caps, 1).and_then(|s| s.parse().ok()),
            cap(caps, 3),
            cap(caps, 4).map(|tg| format!("TG {tg}")),
            caps.get(2).and_then(|m| Origin::from_capture(m.as_str())),
        ),
        TxLayout::Ysf => (
            Mode::Ysf,
            None,
            cap(caps, 2),
            cap(caps, 3).map(|id| format!("DG-ID {id}")),
            caps.get(1).and_then(|m| Origin::from_capture(m.as_str())),
        ),
        TxLayout::P25 => (
            Mode::P25,
            None,
            cap(caps, 2),
            cap(caps, 3).map(|tg| format!("TG {tg}")),
            caps.get(1).and_then(|m| Origin::from_capture(m.as_str())),
        ),
        TxLayout::Nxdn => (
            Mode::Nxdn,
            None,
            cap(caps, 2),
            cap(caps, 3).map(|tg| format!("TG {tg}")),
            caps.get(1).and_then(|m| Origin::from_capture(m.as_str())),
        ),
        TxLayout::DStarHeader => (
            Mode::DStar,
            None,
            match (cap(caps, 1), cap(caps, 2)) {
                (Some(call), Some(sfx)) if !sfx.is_empty() => Some(format!("{call}/{sfx}")),
                (call, _) => call,
            },
            cap(caps, 3),
            None,
        ),
        TxLayout::DStarEnd => (Mode::DStar, None, None, None, None),
        TxLayout::Fm => (Mode::Fm, None, None, None, None),
    };

    Some(if start {
        EventKind::TransmissionStarted {
            mode,
            slot,
            source,
            destination,
            origin,
        }
    } else {
        EventKind::TransmissionEnded {
            mode,
            slot,
            source,
            destination,
            origin,
        }
    })
}

// ---------------------------------------------------------------------------
// Rule tables
// ---------------------------------------------------------------------------
//
// Transcribed from the gateway programs' actual log output. Keep end
// phrases above start phrases and specific phrases above general ones.

fn mmdvmhost_rules() -> Vec<Rule> {
    vec![
        Rule::new(r"^Mode set to (.+)$", Shape::ModeChange),
        Rule::new(
            r"^DMR Slot ([12]), received (network|RF) end of voice transmission from ([A-Z0-9]+) to TG\s*(\d+)",
            Shape::TxEnd(TxLayout::Dmr),
        ),
        Rule::new(
            r"^DMR Slot ([12]), received (network|RF) voice header from ([A-Z0-9]+) to TG\s*(\d+)",
            Shape::TxStart(TxLayout::Dmr),
        ),
        Rule::new(r"^D-Star, end of transmission", Shape::TxEnd(TxLayout::DStarEnd)),
        Rule::new(
            r"^D-Star, received (?:header|data) from ([A-Z0-9]+)\s*/([A-Z0-9 ]*?)\s+to\s+([A-Z0-9/ ]+)",
            Shape::TxStart(TxLayout::DStarHeader),
        ),
        Rule::new(
            r"^YSF, received (network|RF) end of transmission from ([A-Z0-9\s]+?)\s+to DG-ID\s+(\d+)",
            Shape::TxEnd(TxLayout::Ysf),
        ),
        Rule::new(
            r"^YSF, received (network|RF) header from ([A-Z0-9\s]+?)\s+to DG-ID\s+(\d+)",
            Shape::TxStart(TxLayout::Ysf),
        ),
        Rule::new(
            r"^P25, received (network|RF) end of voice transmission from ([A-Z0-9]+) to TG\s*(\d+)",
            Shape::TxEnd(TxLayout::P25),
        ),
        Rule::new(
            r"^P25, received (network|RF) (?:voice transmission|header) from ([A-Z0-9]+) to TG\s*(\d+)",
            Shape::TxStart(TxLayout::P25),
        ),
        Rule::new(
            r"^NXDN, received (network|RF) end of transmission from ([A-Z0-9]+) to (?:TG\s*)?(\d+)",
            Shape::TxEnd(TxLayout::Nxdn),
        ),
        Rule::new(
            r"^NXDN, received (network|RF) (?:voice|data) (?:header|transmission) from ([A-Z0-9]+) to (?:TG\s*)?(\d+)",
            Shape::TxStart(TxLayout::Nxdn),
        ),
        Rule::new(r"^FM, received (?:header|transmission)", Shape::TxStart(TxLayout::Fm)),
        // MMDVMHost's own protocol-network sockets ("DMR, Connection to
        // 44.131.4.1 opened"). The link name is the protocol itself.
        Rule::new(
            r"^(DMR|P25|YSF|NXDN), Connection to (\S+) opened",
            Shape::Linked(LinkSpec {
                name: LinkName::Capture(1),
                detail: Some(2),
            }),
        ),
        // Modem handshake doubles as the host's upstream attachment.
        Rule::new(
            r"^MMDVM protocol version: (\d+), description: (.+)$",
            Shape::Login(Some(2)),
        ),
    ]
}

fn dmr_gateway_rules() -> Vec<Rule> {
    vec![
        Rule::new(r"^MMDVM has connected$", Shape::Login(None)),
        Rule::new(
            r"^(.+?), Logged into the master successfully$",
            Shape::Linked(LinkSpec {
                name: LinkName::Capture(1),
                detail: None,
            }),
        ),
        Rule::new(
            r"^(.+?), Closing DMR Network",
            Shape::Unlinked(LinkSpec {
                name: LinkName::Capture(1),
                detail: None,
            }),
        ),
        Rule::new(
            r"^(.+?), Connection to the master has timed out",
            Shape::Unlinked(LinkSpec {
                name: LinkName::Capture(1),
                detail: None,
            }),
        ),
    ]
}

fn ysf_gateway_rules() -> Vec<Rule> {
    vec![
        Rule::new(r"^Link successful to MMDVM$", Shape::Login(None)),
        Rule::new(
            r"^Linked to (.+?)\s*$",
            Shape::Linked(LinkSpec {
                name: LinkName::Fixed("YSF Network"),
                detail: Some(1),
            }),
        ),
        // Announces the intent to reconnect, not a settled link.
        Rule::advisory(
            r#"^Automatic \(re-\)connection to (\d+) - "(.+?)""#,
            Shape::Linked(LinkSpec {
                name: LinkName::Fixed("YSF Network"),
                detail: Some(2),
            }),
        ),
        Rule::advisory(
            r"^Connect to (.+?) has been requested",
            Shape::Linked(LinkSpec {
                name: LinkName::Fixed("YSF Network"),
                detail: Some(1),
            }),
        ),
        Rule::new(
            r"^Disconnect has been requested",
            Shape::Unlinked(LinkSpec {
                name: LinkName::Fixed("YSF Network"),
                detail: None,
            }),
        ),
        // Poll loss; the gateway gives up the reflector.
        Rule::new(
            r"^Link has failed",
            Shape::Unlinked(LinkSpec {
                name: LinkName::Fixed("YSF Network"),
                detail: None,
            }),
        ),
    ]
}

fn p25_gateway_rules() -> Vec<Rule> {
    vec![
        Rule::new(r"^Opening Rpt network connection$", Shape::Login(None)),
        Rule::new(
            r"^[Ll]inked to reflector (\d+)",
            Shape::Linked(LinkSpec {
                name: LinkName::Fixed("P25 Network"),
                detail: Some(1),
            }),
        ),
        Rule::advisory(
            r"^Opening P25 network connection$",
            Shape::Linked(LinkSpec {
                name: LinkName::Fixed("P25 Network"),
                detail: None,
            }),
        ),
        Rule::new(
            r"^Closing P25 network connection$",
            Shape::Unlinked(LinkSpec {
                name: LinkName::Fixed("P25 Network"),
                detail: None,
            }),
        ),
        // recvfrom errors correlate with reflector loss but the protocol has
        // no trustworthy disconnect signal; kept advisory so the assumed
        // tier stays in charge of this link's state.
        Rule::advisory(
            r"^Error returned from recvfrom",
            Shape::Unlinked(LinkSpec {
                name: LinkName::Fixed("P25 Network"),
                detail: None,
            }),
        ),
    ]
}

fn nxdn_gateway_rules() -> Vec<Rule> {
    vec![
        Rule::new(r"^Link successful to MMDVM$", Shape::Login(None)),
        Rule::new(
            r"^Linked to (.+?)\s*$",
            Shape::Linked(LinkSpec {
                name: LinkName::Fixed("NXDN Network"),
                detail: Some(1),
            }),
        ),
        Rule::advisory(
            r#"^Automatic \(re-\)connection to (\d+) - "(.+?)""#,
            Shape::Linked(LinkSpec {
                name: LinkName::Fixed("NXDN Network"),
                detail: Some(2),
            }),
        ),
        Rule::new(
            r"^Disconnect has been requested",
            Shape::Unlinked(LinkSpec {
                name: LinkName::Fixed("NXDN Network"),
                detail: None,
            }),
        ),
        Rule::new(
            r"^Link has failed",
            Shape::Unlinked(LinkSpec {
                name: LinkName::Fixed("NXDN Network"),
                detail: None,
            }),
        ),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
