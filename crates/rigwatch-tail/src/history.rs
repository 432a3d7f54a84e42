//! Historical reconstructor — baseline status from dated log files.
//!
//! At startup nothing is known about a source, but its old logs are still on
//! disk. [`reconstruct`] walks the dated files as an explicit two-level
//! scan: an outer descending sequence over candidate days starting at
//! "today", an inner ascending sequence over the lines of each file. Within
//! a file the latest definitive event per field wins; across files a field
//! resolved by a newer day is never overwritten by an older one. The outer
//! walk short-circuits once every required field — the current mode (host
//! only) and each enabled link's state — is resolved, bounding the cost to
//! `horizon_days` file scans.
//!
//! Only reliable rules resolve link state here; advisory matches are
//! ignored outright. A field still unresolved at horizon exhaustion is
//! explicitly Unknown — or Connected at the Assumed confidence tier when
//! the link is configured `assume_connected` — never guessed.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use rigwatch_core::config::SourceConfig;
use rigwatch_core::event::EventKind;
use rigwatch_core::store::{Baseline, Closure, LinkResolution, Transmission, TxKey};
use rigwatch_core::types::{Confidence, LinkState, Mode, SourceKind};
use rigwatch_core::PatternLibrary;

/// Reconstruct a source's baseline by scanning up to `horizon_days` dated
/// files backward from `now`. Deterministic for a fixed set of files and a
/// fixed `now`; missing or unreadable files are skipped, never fatal.
pub async fn reconstruct(
    spec: &SourceConfig,
    patterns: &PatternLibrary,
    horizon_days: u32,
    now: DateTime<Utc>,
) -> Baseline {
    let today = now.date_naive();
    let mut baseline = Baseline::default();

    let mut seeking_mode = spec.kind == SourceKind::MmdvmHost;
    let mut seeking_links: BTreeSet<String> = spec
        .links
        .iter()
        .filter(|l| l.enabled)
        .map(|l| l.name.clone())
        .collect();

    for days_back in 0..horizon_days {
        if days_back > 0 && !seeking_mode && seeking_links.is_empty() {
            break;
        }
        let Some(date) = today.checked_sub_days(chrono::Days::new(days_back as u64)) else {
            break;
        };

        let path = spec.dated_path(date);
        let findings = match scan_file(&path, spec.kind, patterns).await {
            Ok(findings) => findings,
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "history file skipped");
                continue;
            }
        };

        if seeking_mode {
            if let Some(found) = findings.mode {
                baseline.current_mode = Some(found);
                seeking_mode = false;
            }
        }
        for (name, resolution) in findings.links {
            if seeking_links.remove(&name) {
                baseline.links.insert(name, resolution);
            }
        }
        if baseline.login.is_none() {
            baseline.login = findings.login;
        }
        if days_back == 0 {
            // Today's file also feeds the recent-calls history, so a
            // restart doesn't blank the panel. Older days are stale enough
            // not to bother.
            let cutoff = now - chrono::Duration::hours(24);
            baseline.recent_transmissions = findings
                .closed
                .into_iter()
                .filter(|tx| tx.ended_at.is_some_and(|ended| ended >= cutoff))
                .collect();
        }
    }

    // Whatever the horizon left unresolved becomes explicit.
    for link in spec.links.iter().filter(|l| l.enabled) {
        if !baseline.links.contains_key(&link.name) {
            let resolution = if link.assume_connected {
                LinkResolution {
                    state: LinkState::Connected,
                    confidence: Confidence::Assumed,
                    detail: None,
                    changed_at: None,
                }
            } else {
                LinkResolution {
                    state: LinkState::Unknown,
                    confidence: Confidence::Confirmed,
                    detail: None,
                    changed_at: None,
                }
            };
            baseline.links.insert(link.name.clone(), resolution);
        }
    }

    baseline
}

/// What one day's file resolved. The file is read forward, so "last write
/// wins" inside these maps means "closest to now".
#[derive(Default)]
struct DayFindings {
    mode: Option<(Mode, DateTime<Utc>)>,
    links: BTreeMap<String, LinkResolution>,
    login: Option<(Option<String>, DateTime<Utc>)>,
    closed: Vec<Transmission>,
}

async fn scan_file(
    path: &Path,
    kind: SourceKind,
    patterns: &PatternLibrary,
) -> std::io::Result<DayFindings> {
    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();

    let mut findings = DayFindings::default();
    let mut active: HashMap<TxKey, Transmission> = HashMap::new();

    while let Some(line) = lines.next_line().await? {
        let Some(event) = patterns.parse(kind, &line) else {
            continue;
        };
        match event.kind {
            EventKind::ModeChanged { mode } => {
                findings.mode = Some((mode, event.timestamp));
            }
            EventKind::NetworkConnected {
                link,
                detail,
                reliable,
            } if reliable => {
                findings.links.insert(
                    link,
                    LinkResolution {
                        state: LinkState::Connected,
                        confidence: Confidence::Confirmed,
                        detail,
                        changed_at: Some(event.timestamp),
                    },
                );
            }
            EventKind::NetworkDisconnected {
                link,
                detail,
                reliable,
            } if reliable => {
                findings.links.insert(
                    link,
                    LinkResolution {
                        state: LinkState::Disconnected,
                        confidence: Confidence::Confirmed,
                        detail,
                        changed_at: Some(event.timestamp),
                    },
                );
            }
            EventKind::ProcessLogin { detail } => {
                findings.login = Some((detail, event.timestamp));
            }
            EventKind::TransmissionStarted {
                mode,
                slot,
                source,
                destination,
                origin,
            } => {
                let key = TxKey { mode, slot };
                let tx = Transmission {
                    mode,
                    slot,
                    source,
                    destination,
                    origin,
                    started_at: event.timestamp,
                    ended_at: None,
                    duration_ms: None,
                    closure: None,
                };
                if let Some(prev) = active.insert(key, tx) {
                    findings
                        .closed
                        .push(close(prev, event.timestamp, Closure::Preempted));
                }
            }
            EventKind::TransmissionEnded { mode, slot, .. } => {
                let key = TxKey { mode, slot };
                if let Some(tx) = active.remove(&key) {
                    findings
                        .closed
                        .push(close(tx, event.timestamp, Closure::Reported));
                }
                // An end with no start inside this file is dropped: the
                // baseline only keeps transmissions it can date.
            }
            _ => {}
        }
    }

    Ok(findings)
}

fn close(mut tx: Transmission, at: DateTime<Utc>, closure: Closure) -> Transmission {
    tx.duration_ms = Some((at - tx.started_at).num_milliseconds().max(0));
    tx.ended_at = Some(at);
    tx.closure = Some(closure);
    tx
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rigwatch_core::config::LinkConfig;
    use rigwatch_core::types::LinkKind;

    fn gateway_spec(dir: &Path) -> SourceConfig {
        SourceConfig {
            enabled: true,
            kind: SourceKind::DmrGateway,
            dir: dir.to_path_buf(),
            file_root: "DMRGateway".to_string(),
            horizon_days: None,
            links: vec![LinkConfig {
                name: "BrandMeister".to_string(),
                kind: LinkKind::Network,
                enabled: true,
                assume_connected: false,
            }],
        }
    }

    fn now() -> DateTime<Utc> {
        "2025-08-06T20:00:00Z".parse().unwrap()
    }

    #[tokio::test]
    async fn newer_day_wins_over_older() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("DMRGateway-2025-08-05.log"),
            "M: 2025-08-05 09:00:00.000 BrandMeister, Logged into the master successfully\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("DMRGateway-2025-08-06.log"),
            "M: 2025-08-06 08:00:00.000 BrandMeister, Closing DMR Network\n",
        )
        .unwrap();

        let spec = gateway_spec(dir.path());
        let baseline = reconstruct(&spec, &PatternLibrary::new(), 7, now()).await;
        assert_eq!(baseline.links["BrandMeister"].state, LinkState::Disconnected);
    }

    #[tokio::test]
    async fn older_day_fills_gaps_left_by_newer() {
        let dir = tempfile::tempdir().unwrap();
        // Today's file has no link evidence at all.
        std::fs::write(
            dir.path().join("DMRGateway-2025-08-06.log"),
            "M: 2025-08-06 08:00:00.000 DMRGateway-20250806 is starting\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("DMRGateway-2025-08-03.log"),
            "M: 2025-08-03 09:00:00.000 BrandMeister, Logged into the master successfully\n",
        )
        .unwrap();

        let spec = gateway_spec(dir.path());
        let baseline = reconstruct(&spec, &PatternLibrary::new(), 7, now()).await;
        assert_eq!(baseline.links["BrandMeister"].state, LinkState::Connected);
    }

    #[tokio::test]
    async fn horizon_exhaustion_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let spec = gateway_spec(dir.path());
        let baseline = reconstruct(&spec, &PatternLibrary::new(), 5, now()).await;
        assert_eq!(baseline.links["BrandMeister"].state, LinkState::Unknown);
    }
}
