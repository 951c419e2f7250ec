// src/main.rs
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use oktrix::capture::{BlankSource, FrameSource, ImageSequenceSource};
use oktrix::config::AppConfig;
use oktrix::media::{EnigoInjector, KeyInjector, LoggingInjector, MediaController, ProcProbe};
use oktrix::provider::RecordedLandmarkProvider;
use oktrix::{Dispatcher, GestureEngine, TrackingService};

/// Replays a recorded landmark track through the gesture engine and prints
/// one JSON report per frame.
#[derive(Parser, Debug)]
#[command(name = "oktrix", version, about)]
struct Args {
    /// Landmark track (JSON) to replay
    track: PathBuf,

    /// Directory of image frames; blank frames are generated when omitted
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Config file (overrides $OKTRIX_CONFIG and the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pace generated frames at the track's frame rate
    #[arg(long)]
    realtime: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref()).context("loading configuration")?;

    let provider = RecordedLandmarkProvider::from_file(&args.track)
        .with_context(|| format!("reading landmark track {}", args.track.display()))?;
    let fps = provider.fps().unwrap_or(30.0);

    let source: Box<dyn FrameSource> = match &args.frames {
        Some(dir) => {
            let frames = ImageSequenceSource::new(dir, fps)
                .with_context(|| format!("opening frames in {}", dir.display()))?;
            if frames.total_frames() != provider.len() {
                warn!(
                    images = frames.total_frames(),
                    track = provider.len(),
                    "Frame count differs from landmark track length"
                );
            }
            Box::new(frames)
        }
        None => Box::new(BlankSource::new(Some(provider.len() as u64), fps, 128).paced(args.realtime)),
    };

    let injector: Box<dyn KeyInjector> = if config.media.dry_run {
        Box::new(LoggingInjector)
    } else {
        Box::new(EnigoInjector::new().context("initializing key injection")?)
    };
    let media = MediaController::new(&config.media, injector, Box::new(ProcProbe));
    let dispatcher = Dispatcher::new(Arc::new(media), Handle::current(), &config.dispatch);

    let engine = GestureEngine::new(
        config.engine.clone(),
        config.environment.clone(),
        Box::new(provider),
        dispatcher,
    )
    .context("creating gesture engine")?;

    let mut service = TrackingService::new(engine, config.tracking_loop.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    if !service.start(source, tx) {
        bail!("tracking loop failed to start");
    }

    loop {
        tokio::select! {
            report = rx.recv() => match report {
                Some(report) => println!("{}", serde_json::to_string(&report)?),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, stopping");
                break;
            }
        }
    }

    let status = tokio::task::spawn_blocking(move || {
        service.stop();
        let status = service.status();
        service.shutdown();
        status
    })
    .await
    .context("stopping tracking loop")?;

    info!(
        session_id = %status.session_id,
        frames = status.frames_processed,
        avg_fps = status.metrics.avg_fps,
        "Session finished"
    );
    Ok(())
}
