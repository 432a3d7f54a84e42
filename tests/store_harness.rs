//! State-store integration harness.
//!
//! # What this covers
//!
//! - **Transmission lifecycle**: start/end pairing by `(mode, slot)` key,
//!   preemption on double-start, inferred records for orphan ends, hang-time
//!   sweep.
//! - **Ring bounds**: no buffer ever exceeds its configured capacity, for
//!   arbitrary fold sequences (proptest).
//! - **Key exclusivity**: at most one active transmission per key under
//!   arbitrary start/end interleavings (proptest).
//! - **Source isolation**: a link's state never changes from an event whose
//!   source kind differs from the link's owner.
//! - **Subscriptions**: every mutation produces a change notification; a
//!   dropped subscriber never blocks folding.
//!
//! # Running
//!
//! ```sh
//! cargo test --test store_harness
//! ```

mod common;
use common::*;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use rigwatch_core::config::MonitorConfig;
use rigwatch_core::ring::Ring;
use rigwatch_core::store::Closure;
use rigwatch_core::{Change, LinkState, Mode, PatternLibrary, SourceKind, StateStore};

fn store() -> (StateStore, PatternLibrary) {
    (
        StateStore::new(&MonitorConfig::defaults()),
        PatternLibrary::new(),
    )
}

/// Parse a host line and fold it, panicking if the line is noise — harness
/// scenarios only feed meaningful lines this way.
fn fold_host(store: &StateStore, lib: &PatternLibrary, line: &str) {
    let event = lib
        .parse(SourceKind::MmdvmHost, line)
        .unwrap_or_else(|| panic!("line should parse: {line}"));
    store.apply("mmdvmhost", event);
}

// ---------------------------------------------------------------------------
// Transmission lifecycle
// ---------------------------------------------------------------------------

/// Scenario: a start followed 4.2 s later by its matching end closes with
/// duration 4.2 s and lands in the recent-history buffer.
#[test]
fn start_and_end_close_with_duration() {
    let (store, lib) = store();
    fold_host(
        &store,
        &lib,
        &line_at(0, "DMR Slot 1, received RF voice header from 3106849 to TG 91"),
    );
    assert_eq!(store.snapshot().active_transmissions.len(), 1);

    fold_host(
        &store,
        &lib,
        &line_at(
            4_200,
            "DMR Slot 1, received RF end of voice transmission from 3106849 to TG 91",
        ),
    );

    let snap = store.snapshot();
    assert!(snap.active_transmissions.is_empty());
    let tx = &snap.recent_transmissions[0];
    assert_eq!(tx.duration_ms, Some(4_200));
    assert_eq!(tx.closure, Some(Closure::Reported));
    assert_eq!(tx.source.as_deref(), Some("3106849"));
}

/// Scenario: two starts on slot 1 with no end between them — the first is
/// implicitly closed (inferred end), the second becomes active.
#[test]
fn double_start_preempts_the_first() {
    let (store, lib) = store();
    fold_host(
        &store,
        &lib,
        &line_at(0, "DMR Slot 1, received RF voice header from 3106849 to TG 91"),
    );
    fold_host(
        &store,
        &lib,
        &line_at(1_500, "DMR Slot 1, received network voice header from 2345678 to TG 91"),
    );

    let snap = store.snapshot();
    assert_eq!(snap.active_transmissions.len(), 1);
    assert_eq!(
        snap.active_transmissions[0].source.as_deref(),
        Some("2345678")
    );

    let closed = &snap.recent_transmissions[0];
    assert_eq!(closed.source.as_deref(), Some("3106849"));
    assert_eq!(closed.closure, Some(Closure::Preempted));
    assert_eq!(closed.duration_ms, Some(1_500));
}

#[test]
fn orphan_end_is_recorded_as_inferred() {
    let (store, lib) = store();
    fold_host(
        &store,
        &lib,
        &line_at(
            0,
            "DMR Slot 2, received RF end of voice transmission from 3106849 to TG 91",
        ),
    );

    let recent = store.recent_transmissions(5);
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].closure, Some(Closure::InferredStart));
}

#[test]
fn sweep_models_mode_hang() {
    let (store, lib) = store();
    fold_host(
        &store,
        &lib,
        &line_at(0, "FM, received transmission"),
    );

    // FM hang time defaults to 10 s: quiet at 5 s, closed at 11 s.
    store.sweep(base_time() + chrono::Duration::seconds(5));
    assert_eq!(store.snapshot().active_transmissions.len(), 1);

    store.sweep(base_time() + chrono::Duration::seconds(11));
    let snap = store.snapshot();
    assert!(snap.active_transmissions.is_empty());
    assert_eq!(
        snap.recent_transmissions[0].closure,
        Some(Closure::HangTimeout)
    );
}

// ---------------------------------------------------------------------------
// Mode and links
// ---------------------------------------------------------------------------

#[test]
fn mode_line_updates_current_mode() {
    let (store, lib) = store();
    fold_host(&store, &lib, &line_at(0, "Mode set to DMR"));
    assert_eq!(
        store.snapshot().sources["mmdvmhost"].current_mode,
        Some(Mode::Dmr)
    );
}

/// Scenario: `Mode set to DMR` then a slot-1 voice header → mode DMR plus
/// one active transmission, slot 1, source 3106849, destination TG 91.
#[test]
fn mode_change_then_voice_header() {
    let (store, lib) = store();
    fold_host(&store, &lib, &line_at(0, "Mode set to DMR"));
    fold_host(
        &store,
        &lib,
        &line_at(200, "DMR Slot 1, received RF voice header from 3106849 to TG 91"),
    );

    let snap = store.snapshot();
    assert_eq!(snap.sources["mmdvmhost"].current_mode, Some(Mode::Dmr));
    assert_eq!(snap.active_transmissions.len(), 1);
    let tx = &snap.active_transmissions[0];
    assert_eq!(tx.slot, Some(1));
    assert_eq!(tx.source.as_deref(), Some("3106849"));
    assert_eq!(tx.destination.as_deref(), Some("TG 91"));
}

/// Scenario: gateway login line flips the link Connected; a later timeout
/// line flips it Disconnected.
#[test]
fn gateway_link_follows_reliable_evidence() {
    let (store, lib) = store();

    let up = lib
        .parse(SourceKind::DmrGateway, CORPUS_DMRGATEWAY[2])
        .unwrap();
    store.apply("dmrgateway", up);
    assert_eq!(
        store.snapshot().sources["dmrgateway"].links["BrandMeister"].state,
        LinkState::Connected
    );

    let down = lib
        .parse(SourceKind::DmrGateway, CORPUS_DMRGATEWAY[3])
        .unwrap();
    store.apply("dmrgateway", down);
    assert_eq!(
        store.snapshot().sources["dmrgateway"].links["BrandMeister"].state,
        LinkState::Disconnected
    );
}

#[test]
fn advisory_phrases_never_flip_state() {
    let (store, lib) = store();
    let advisory = lib
        .parse(SourceKind::YsfGateway, CORPUS_YSFGATEWAY[1])
        .unwrap();
    store.apply("ysfgateway", advisory);

    let snap = store.snapshot();
    assert_eq!(
        snap.sources["ysfgateway"].links["YSF Network"].state,
        LinkState::Unknown
    );
}

#[test]
fn foreign_source_kind_cannot_touch_links() {
    let (store, lib) = store();
    // A DMRGateway-grammar event routed at the YSF gateway's source entry:
    // buffered, but the YSF link must stay Unknown.
    let event = lib
        .parse(SourceKind::DmrGateway, CORPUS_DMRGATEWAY[2])
        .unwrap();
    store.apply("ysfgateway", event);

    let snap = store.snapshot();
    for link in snap.sources["ysfgateway"].links.values() {
        assert_eq!(link.state, LinkState::Unknown);
    }
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

#[test]
fn every_fold_notifies_subscribers() {
    let (store, lib) = store();
    let mut rx = store.subscribe();

    fold_host(&store, &lib, &line_at(0, "Mode set to DMR"));
    fold_host(
        &store,
        &lib,
        &line_at(100, "DMR Slot 1, received RF voice header from 3106849 to TG 91"),
    );
    store.record_line("mmdvmhost", "noise line");

    assert!(matches!(rx.try_recv(), Ok(Change::ModeChanged { .. })));
    assert!(matches!(
        rx.try_recv(),
        Ok(Change::TransmissionStarted { .. })
    ));
    assert!(matches!(rx.try_recv(), Ok(Change::RawLineAppended { .. })));
}

#[test]
fn dropped_subscriber_does_not_block_folding() {
    let (store, lib) = store();
    drop(store.subscribe());
    for i in 0..1_000 {
        fold_host(&store, &lib, &line_at(i, "Mode set to DMR"));
    }
    assert_eq!(
        store.snapshot().sources["mmdvmhost"].current_mode,
        Some(Mode::Dmr)
    );
}

// ---------------------------------------------------------------------------
// Property tests
// ---------------------------------------------------------------------------

proptest! {
    /// Rings never exceed capacity: len == min(n, capacity).
    #[test]
    fn prop_ring_len_is_bounded(capacity in 1usize..64, n in 0usize..256) {
        let mut ring = Ring::new(capacity);
        for i in 0..n {
            ring.push(i);
        }
        prop_assert_eq!(ring.len(), n.min(capacity));
    }

    /// For any start/end interleaving on one (mode, slot) key, at most one
    /// transmission is active at any time, and buffers stay bounded.
    #[test]
    fn prop_one_active_per_key(ops in proptest::collection::vec(any::<bool>(), 1..80)) {
        let (store, lib) = store();
        let caps = MonitorConfig::defaults().capacities;

        for (i, is_start) in ops.into_iter().enumerate() {
            let offset = i as i64 * 100;
            let line = if is_start {
                line_at(offset, "DMR Slot 1, received RF voice header from 3106849 to TG 91")
            } else {
                line_at(offset, "DMR Slot 1, received RF end of voice transmission from 3106849 to TG 91")
            };
            fold_host(&store, &lib, &line);

            let snap = store.snapshot();
            let active_on_key = snap
                .active_transmissions
                .iter()
                .filter(|tx| tx.mode == Mode::Dmr && tx.slot == Some(1))
                .count();
            prop_assert!(active_on_key <= 1);
            prop_assert!(snap.recent_transmissions.len() <= caps.transmissions);
        }
    }

    /// Raw-line buffers evict rather than grow, whatever the volume.
    #[test]
    fn prop_raw_buffer_is_bounded(n in 0usize..2_000) {
        let store = StateStore::new(&MonitorConfig::defaults());
        let caps = MonitorConfig::defaults().capacities;
        for i in 0..n {
            store.record_line("mmdvmhost", &format!("line {i}"));
        }
        prop_assert!(store.recent_raw_lines("mmdvmhost", usize::MAX).len() <= caps.raw_lines);
    }
}
