//! Live tailer — one continuously scheduled task per source.
//!
//! Each poll: pick the source's current dated file (today's, falling back
//! to yesterday's until today's first write appears), read newly appended
//! complete lines through the [`Cursor`], record every raw line, and fold
//! parse hits into the shared store — the same folding path reconstruction
//! uses.
//!
//! Tailers are independent: a stalled or missing source never delays the
//! others. The loop sleeps its poll interval on every iteration (a longer
//! backoff after IO errors) and never busy-loops. Cancellation is
//! cooperative through a [`CancellationToken`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use rigwatch_core::config::{MonitorSection, SourceConfig};
use rigwatch_core::{PatternLibrary, StateStore};

use crate::cursor::Cursor;
use crate::TailError;

pub struct Tailer {
    source_id: String,
    spec: SourceConfig,
    patterns: Arc<PatternLibrary>,
    store: Arc<StateStore>,
    poll_interval: Duration,
    error_backoff: Duration,
    cursor: Option<Cursor>,
}

impl Tailer {
    pub fn new(
        source_id: impl Into<String>,
        spec: SourceConfig,
        patterns: Arc<PatternLibrary>,
        store: Arc<StateStore>,
        monitor: &MonitorSection,
    ) -> Tailer {
        Tailer {
            source_id: source_id.into(),
            spec,
            patterns,
            store,
            poll_interval: monitor.poll_interval(),
            error_backoff: monitor.error_backoff(),
            cursor: None,
        }
    }

    /// Poll loop. Runs until cancelled; every error is absorbed and retried.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(source = %self.source_id, dir = %self.spec.dir.display(), "tailer started");
        loop {
            let delay = match self.poll_once().await {
                Ok(()) => self.poll_interval,
                Err(TailError::SourceUnavailable { path, .. }) => {
                    tracing::debug!(
                        source = %self.source_id,
                        path = %path.display(),
                        "log file unavailable, retrying after backoff"
                    );
                    self.error_backoff
                }
                Err(err) => {
                    tracing::warn!(source = %self.source_id, %err, "poll failed, retrying after backoff");
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::info!(source = %self.source_id, "tailer stopped");
    }

    /// One poll: resolve the current dated file, drain newly appended
    /// lines, fold them. Public so tests can drive the tailer without
    /// depending on wall-clock scheduling.
    pub async fn poll_once(&mut self) -> Result<(), TailError> {
        let desired = self.current_path().await;
        let mut lines = Vec::new();

        // Day rollover: drain what is left of the old file before switching
        // to the new one, so no line is lost across midnight.
        let switching = self
            .cursor
            .as_ref()
            .is_some_and(|c| c.path() != desired.as_path());
        if switching {
            if let Some(cursor) = self.cursor.as_mut() {
                match cursor.read_new().await {
                    Ok(mut leftover) => lines.append(&mut leftover),
                    Err(err) => {
                        tracing::debug!(source = %self.source_id, %err, "old day file gone before drain")
                    }
                }
            }
            self.cursor = Some(Cursor::from_start(desired.clone()));
        }

        let cursor = self
            .cursor
            .get_or_insert_with(|| Cursor::tail_end(desired));
        let result = cursor.read_new().await;

        match result {
            Ok(mut fresh) => {
                lines.append(&mut fresh);
                self.ingest(&lines);
                Ok(())
            }
            Err(err) => {
                // Keep whatever the drain produced even if the new read failed.
                self.ingest(&lines);
                Err(err)
            }
        }
    }

    fn ingest(&self, lines: &[String]) {
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            self.store.record_line(&self.source_id, line);
            if let Some(event) = self.patterns.parse(self.spec.kind, line) {
                self.store.apply(&self.source_id, event);
            }
        }
    }

    /// Today's dated file, or yesterday's while today's does not exist yet.
    async fn current_path(&self) -> std::path::PathBuf {
        let today = Utc::now().date_naive();
        let today_path = self.spec.dated_path(today);
        if tokio::fs::try_exists(&today_path).await.unwrap_or(false) {
            return today_path;
        }
        if let Some(yesterday) = today.pred_opt() {
            let yesterday_path = self.spec.dated_path(yesterday);
            if tokio::fs::try_exists(&yesterday_path).await.unwrap_or(false) {
                return yesterday_path;
            }
        }
        today_path
    }
}

/// Spawn one tailer task per enabled source onto `tracker`, all sharing the
/// same store and cancellation token.
pub fn spawn_tailers(
    config: &rigwatch_core::config::MonitorConfig,
    patterns: &Arc<PatternLibrary>,
    store: &Arc<StateStore>,
    cancel: &CancellationToken,
    tracker: &tokio_util::task::TaskTracker,
) {
    for (id, spec) in config.enabled_sources() {
        let tailer = Tailer::new(
            id,
            spec.clone(),
            Arc::clone(patterns),
            Arc::clone(store),
            &config.monitor,
        );
        tracker.spawn(tailer.run(cancel.clone()));
    }
}
