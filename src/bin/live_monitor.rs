//! Headless live monitor.
//!
//! Mounts a live view against the configured backend and logs every view
//! update until interrupted. All output goes to stderr through tracing.

use std::path::PathBuf;

use clap::Parser;
use guardcar_live::config::default_config_path;
use guardcar_live::{CameraMode, LiveConfig, LiveView, ViewUpdate};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// GuardCar live: stream the camera feed and telemetry from a vehicle backend.
#[derive(Parser)]
#[command(name = "guardcar-live", version, about)]
struct Cli {
    /// Path to TOML configuration file. Defaults to ~/.config/guardcar/live.toml
    /// when it exists.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera mode to select after mounting (primary, secondary, combined or 0-2).
    #[arg(short, long)]
    mode: Option<String>,

    /// Print the most recent recorded clips and exit.
    #[arg(long)]
    recent: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("guardcar_live=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    // Validate the mode before anything connects.
    let mode = cli
        .mode
        .as_deref()
        .map(str::parse::<CameraMode>)
        .transpose()?;

    let mut view = LiveView::new(config)?;

    if cli.recent {
        for name in view.recent_media_default().await? {
            info!(%name, "recent clip");
        }
        return Ok(());
    }

    let mut updates = view.subscribe();
    view.mount();
    if let Some(mode) = mode {
        let change = view.request_mode(mode)?;
        info!(mode = %change.mode, sent = change.command_sent, "initial camera mode requested");
    }

    match view.recent_media_default().await {
        Ok(names) => info!(count = names.len(), latest = ?names.first(), "recent clips"),
        Err(e) => warn!(error = %e, "recent clips unavailable"),
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, unmounting");
                break;
            }
            update = updates.recv() => match update {
                Ok(update) => log_update(&view, update),
                Err(RecvError::Lagged(skipped)) => {
                    let snapshot = view.snapshot();
                    warn!(skipped, version = snapshot.version, "update stream lagged, resynced from snapshot");
                }
                Err(RecvError::Closed) => {
                    error!("view store dropped");
                    break;
                }
            },
        }
    }

    view.unmount();
    let frames = view.frames().stats();
    let telemetry = view.events().stats();
    info!(
        frames_received = frames.received,
        frames_decoded = frames.decoded,
        frames_superseded = frames.superseded,
        decode_failures = frames.decode_failures,
        events_accepted = telemetry.accepted,
        events_malformed = telemetry.malformed,
        "live monitor stopped"
    );
    Ok(())
}

fn load_config(explicit: Option<&std::path::Path>) -> anyhow::Result<LiveConfig> {
    if let Some(path) = explicit {
        return Ok(LiveConfig::from_file(path)?);
    }
    match default_config_path() {
        Some(path) if path.exists() => {
            info!(path = %path.display(), "loading config");
            Ok(LiveConfig::from_file(&path)?)
        }
        _ => Ok(LiveConfig::default()),
    }
}

fn log_update(view: &LiveView, update: ViewUpdate) {
    match update {
        ViewUpdate::Frame { sequence } => {
            if let Some(frame) = view.snapshot().frame {
                tracing::debug!(sequence, width = frame.width(), height = frame.height(), "frame");
            }
        }
        ViewUpdate::FrameCleared => info!("frame cleared"),
        ViewUpdate::Mode(mode) => info!(%mode, "camera mode"),
        ViewUpdate::Score(score) => info!(score, "anomaly score"),
        ViewUpdate::Recording(recording) => info!(recording, "recording"),
    }
}
