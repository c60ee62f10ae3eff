//! sf-camera capture CLI

use anyhow::{Context, Result};
use clap::Parser;
use sf_camera::config::Config;
use sf_camera::{CameraSession, CaptureEvent, ChannelSink, SimulatedCamera};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sf-camera")]
#[command(about = "Capture frames from the sf_camera core (simulated when no hardware is attached)")]
#[command(version)]
struct Cli {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(short, long)]
    frames: Option<u64>,

    /// Write the first captured frame to this PNG file
    #[arg(short, long)]
    snapshot: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt().with_env_filter(filter).with_target(false).init();

    info!("sf-camera starting");

    let config = match &cli.config {
        Some(path) => {
            info!(config_path = %path.display(), "Loading configuration");
            Config::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => Config::default(),
    };

    let sim = &config.simulator;
    let mut camera = SimulatedCamera::new(sim.width, sim.height).with_readout(sim.readout());
    if let Some(limit) = sim.fail_after {
        camera = camera.fail_after(limit);
    }

    // Setup blocks for the settle delay
    let session_config = config.camera.session_config();
    let mut session = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut session = CameraSession::new(camera, session_config);
        session.setup().context("Camera setup failed")?;
        Ok(session)
    })
    .await??;

    let (sink, mut events) = ChannelSink::channel(4);
    session.start(sink)?;
    info!("Capture started, press Ctrl+C to stop");

    let started = Instant::now();
    let mut frame_count = 0u64;
    let mut snapshot = cli.snapshot.clone();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(CaptureEvent::Frame(frame)) => {
                    frame_count += 1;

                    if let Some(path) = snapshot.take() {
                        let frame = frame.clone();
                        tokio::task::spawn_blocking(move || {
                            match frame.save_png(&path) {
                                Ok(()) => info!(path = %path.display(), "Snapshot written"),
                                Err(e) => error!(path = %path.display(), error = %e, "Failed to write snapshot"),
                            }
                        })
                        .await?;
                    }

                    // Log stats periodically
                    if frame_count % 100 == 0 {
                        if let Some(stats) = session.stats() {
                            let elapsed = started.elapsed().as_secs_f64();
                            info!(
                                captured = %stats.frames_captured,
                                lock_timeouts = %stats.lock_timeouts,
                                errors = %stats.capture_errors,
                                fps = %format!("{:.1}", frame_count as f64 / elapsed),
                                "Stats"
                            );
                        }
                    }

                    if cli.frames.is_some_and(|limit| frame_count >= limit) {
                        info!(frames = %frame_count, "Frame limit reached");
                        break;
                    }
                }
                Some(CaptureEvent::Error(message)) => {
                    warn!(error = %message, "Capture error reported");
                }
                None => {
                    info!("Capture worker exited");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    // Unblock a worker waiting on a full channel before joining it
    drop(events);

    let report = tokio::task::spawn_blocking(move || session.stop()).await??;
    if let Some(report) = report {
        info!(
            frames = %report.stats.frames_captured,
            lock_timeouts = %report.stats.lock_timeouts,
            errors = %report.stats.capture_errors,
            "Capture stopped"
        );
        if let Some(e) = report.error {
            return Err(e).context("Capture worker failed");
        }
    }

    Ok(())
}
