use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use rigwatch_core::config::MonitorConfig;
use rigwatch_core::notify::Coalescer;
use rigwatch_core::{PatternLibrary, StateStore};

#[derive(Parser)]
#[command(
    name = "rigwatch",
    about = "MMDVM status monitor — rebuilds repeater state from gateway log files"
)]
struct Cli {
    /// Path to the config file (default: /etc/rigwatch.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Tracing filter, e.g. "debug" or "rigwatch_tail=trace". RUST_LOG wins
    /// when set.
    #[arg(long, default_value = "info")]
    log_filter: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the change stream.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_filter.clone())),
        )
        .init();

    let config = MonitorConfig::load(cli.config.as_deref())?;
    let patterns = Arc::new(PatternLibrary::new());
    let store = Arc::new(StateStore::new(&config));

    // Baseline before anything subscribes or tails.
    if config.monitor.reconstruct {
        for (id, spec) in config.enabled_sources() {
            let horizon = spec.horizon(config.monitor.horizon_days);
            let baseline =
                rigwatch_tail::reconstruct(spec, &patterns, horizon, chrono::Utc::now()).await;
            store.seed(id, baseline);
        }
        tracing::info!("historical reconstruction complete");
    } else {
        tracing::info!("historical reconstruction disabled, starting all-unknown");
    }

    let cancel = CancellationToken::new();
    let tracker = TaskTracker::new();

    rigwatch_tail::tailer::spawn_tailers(&config, &patterns, &store, &cancel, &tracker);

    // Hang-time sweep: hardware frequently omits end-of-transmission lines.
    {
        let store = Arc::clone(&store);
        let cancel = cancel.clone();
        tracker.spawn(async move {
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => store.sweep(chrono::Utc::now()),
                }
            }
        });
    }

    // Stand-in for the external push transport: coalesced change batches as
    // JSON lines on stdout.
    {
        let mut coalescer = Coalescer::new(store.subscribe(), config.monitor.coalesce_window());
        let cancel = cancel.clone();
        tracker.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    batch = coalescer.next_batch() => match batch {
                        Some(batch) => {
                            for change in &batch {
                                match serde_json::to_string(change) {
                                    Ok(json) => println!("{json}"),
                                    Err(err) => tracing::warn!(%err, "change not serializable"),
                                }
                            }
                        }
                        None => break,
                    },
                }
            }
        });
    }

    tracing::info!(sources = config.enabled_sources().count(), "rigwatch running");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    cancel.cancel();
    tracker.close();
    tracker.wait().await;
    Ok(())
}
