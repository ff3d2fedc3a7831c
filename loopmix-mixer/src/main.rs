//! loopmix - headless host for the looping mixer
//!
//! Boots the engine library gate, loads a clip into every track from the
//! fallback catalogue, starts everything playing and keeps the loops running
//! until the run time elapses or the process is signalled.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use loopmix_common::config::{ConfigResolver, TomlConfig, CONFIG_ENV_VAR};
use loopmix_common::events::{EventBus, MixerEvent};
use loopmix_mixer::playback::SimulatedPlatform;
use loopmix_mixer::source::FallbackCatalog;
use loopmix_mixer::{Mixer, TRACK_COUNT};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, trace, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Simulated player start-up latency
const SIMULATED_READY_DELAY: Duration = Duration::from_millis(300);

/// Command-line arguments for loopmix
#[derive(Parser, Debug)]
#[command(name = "loopmix")]
#[command(about = "Eight-track looping audio/video mixer")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Log level or filter directive (overrides RUST_LOG and the config file)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Seconds to run before stopping (0 = until Ctrl+C)
    #[arg(long, default_value = "0")]
    run_for: u64,

    /// Search keyword handed to the video source
    #[arg(short, long)]
    keyword: Option<String>,

    /// Loop poll cadence in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, config_source) = ConfigResolver::new(args.config.clone())
        .load_or_default()
        .context("Failed to load configuration")?;
    if let Some(keyword) = &args.keyword {
        config.mixer.search_keyword = keyword.clone();
    }
    if let Some(ms) = args.poll_interval_ms {
        config.mixer.poll_interval_ms = ms;
    }
    config.validate().context("Invalid configuration")?;

    init_tracing(&config, args.log_level.as_deref())?;

    // Build identification first, before anything else can stall
    info!(
        "Starting loopmix v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("LOOPMIX_GIT_HASH"),
        env!("LOOPMIX_BUILD_TIMESTAMP"),
        env!("LOOPMIX_BUILD_PROFILE")
    );
    config_source.log();
    info!(
        poll_interval_ms = config.mixer.poll_interval_ms,
        default_volume = config.mixer.default_volume,
        keyword = %config.mixer.search_keyword,
        "configuration"
    );

    let platform = SimulatedPlatform::with_ready_delay(SIMULATED_READY_DELAY);
    let mixer = Mixer::new(
        &config.mixer,
        Arc::new(platform),
        Arc::new(FallbackCatalog::new()),
    );
    let event_logger = tokio::spawn(log_events(mixer.events().clone()));

    mixer.load_engine_library();

    let loaded = mixer.transport().reroll_all().await;
    info!("{} / {} tracks loaded", loaded, TRACK_COUNT);
    mixer.transport().play_all();

    // Spread the loops over each clip once the players are up
    tokio::time::sleep(SIMULATED_READY_DELAY * 2).await;
    for id in 0..TRACK_COUNT {
        match mixer.randomize_start(id).await {
            Ok(Some(start)) => debug!(track_id = id, start, "loop start randomized"),
            Ok(None) => {}
            Err(e) => warn!(track_id = id, error = %e, "randomize start failed"),
        }
    }

    if args.run_for > 0 {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.run_for)) => {
                info!("Run time of {}s elapsed, shutting down", args.run_for);
            }
            _ = shutdown_signal() => {}
        }
    } else {
        shutdown_signal().await;
    }

    mixer.transport().stop_all();
    mixer.shutdown().await.context("Mixer shutdown failed")?;
    event_logger.abort();

    info!("Shutdown complete");
    Ok(())
}

/// Set up the tracing subscriber
///
/// Filter precedence: `--log-level`, then `RUST_LOG`, then `logging.level`.
fn init_tracing(config: &TomlConfig, cli_level: Option<&str>) -> Result<()> {
    let filter = match cli_level {
        Some(level) => EnvFilter::try_new(filter_directive(level))
            .with_context(|| format!("Invalid log level '{}'", level))?,
        None => EnvFilter::try_from_default_env().or_else(|_| {
            EnvFilter::try_new(filter_directive(&config.logging.level))
                .with_context(|| format!("Invalid logging.level '{}'", config.logging.level))
        })?,
    };

    let (console_layer, file_layer) = match &config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (None, Some(layer))
        }
        None => (Some(tracing_subscriber::fmt::layer()), None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
    Ok(())
}

/// Expand a bare level into per-crate directives; pass full directives through
fn filter_directive(level: &str) -> String {
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("loopmix={0},loopmix_mixer={0}", level)
    }
}

/// Log every mixer event until the bus closes
async fn log_events(events: EventBus) {
    let mut rx = events.subscribe();
    loop {
        match rx.recv().await {
            Ok(event @ MixerEvent::LoopCorrected { .. }) => trace!(?event, "event"),
            Ok(event @ MixerEvent::EngineFault { .. }) => warn!(?event, "event"),
            Ok(event) => debug!(event = event.name(), track_id = ?event.track_id(), "event"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event logger lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_expands_bare_level() {
        assert_eq!(filter_directive("debug"), "loopmix=debug,loopmix_mixer=debug");
        assert_eq!(filter_directive("loopmix_mixer=trace"), "loopmix_mixer=trace");
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["loopmix", "--run-for", "5", "-k", "rain"]);
        assert_eq!(args.run_for, 5);
        assert_eq!(args.keyword.as_deref(), Some("rain"));
        assert!(args.poll_interval_ms.is_none());
    }
}
