//! Forecast overlay viewer.
//!
//! Loads one selection into a headless map, runs the overlay animation for
//! a number of frames and writes the composed image as PNG.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use forecast_common::time::parse_date;
use forecast_common::{OverlayKind, Selection};
use forecast_viewer::demo::write_demo_rasters;
use forecast_viewer::{LoadOutcome, OverlayLoadCoordinator, ViewerConfig};

#[derive(Parser, Debug)]
#[command(name = "forecast-viewer")]
#[command(about = "Render ten-day forecast overlays to PNG")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "FORECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Overlay to show (e.g. wind, temperature_max, rainfall)
    #[arg(short, long, default_value = "wind")]
    overlay: String,

    /// First day of the forecast run (YYYYMMDD or YYYY-MM-DD)
    #[arg(long)]
    start: String,

    /// Day to display, defaults to the run start
    #[arg(long)]
    target: Option<String>,

    /// Use rasters masked to administrative boundaries
    #[arg(long)]
    clip: bool,

    /// Zoom to animate to after loading
    #[arg(long)]
    zoom: Option<f64>,

    /// Animation frames to run before writing the image
    #[arg(long, default_value_t = 100)]
    frames: u32,

    /// Output PNG
    #[arg(long, default_value = "forecast.png")]
    output: PathBuf,

    /// Write synthetic rasters for the whole run into the raster store first
    #[arg(long)]
    generate_demo: bool,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Overlays share one map, so everything runs on a single thread.
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).json().finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let config = ViewerConfig::load(args.config.as_deref())?;

    let overlay: OverlayKind = args.overlay.parse()?;
    let start = parse_date(&args.start)?;
    let target = match &args.target {
        Some(target) => parse_date(target)?,
        None => start,
    };
    let selection = Selection::new(overlay, start, target, args.clip);

    let coordinator = OverlayLoadCoordinator::from_config(&config)?;

    if args.generate_demo {
        write_demo_rasters(coordinator.store(), coordinator.resolver(), start, args.clip).await?;
    }

    coordinator.initialize().await?;
    info!(selection = %selection, "Starting forecast viewer");

    let mut loading = coordinator.subscribe_loading();
    tokio::spawn(async move {
        while loading.changed().await.is_ok() {
            info!(loading = *loading.borrow(), "loading state changed");
        }
    });

    let handle = coordinator.on_selection_change(selection).await;
    match handle.await.context("load task panicked")? {
        LoadOutcome::Mounted => {}
        LoadOutcome::Cancelled => warn!("load was cancelled"),
        LoadOutcome::Failed(e) => {
            coordinator.shutdown().await?;
            return Err(e).context(format!("could not load {}", selection));
        }
    }

    if let Some(zoom) = args.zoom {
        coordinator.set_zoom(zoom).await;
    }

    // Drive the timers on a virtual clock so the frame count is exact.
    let period = config.particles.to_particle_config().map_err(anyhow::Error::msg)?.period;
    let mut now = Instant::now();
    let mut redraws = 0;
    for _ in 0..args.frames {
        now += period;
        redraws += coordinator.pump(now).await.redraws;
        tokio::task::yield_now().await;
    }

    coordinator.save_frame(&args.output).await?;
    info!(
        output = %args.output.display(),
        frames = args.frames,
        redraws,
        "frame written"
    );

    coordinator.shutdown().await?;
    info!(metrics = %prometheus_handle.render(), "metrics at exit");
    Ok(())
}
