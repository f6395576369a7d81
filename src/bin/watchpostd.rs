//! watchpostd - live monitoring console daemon
//!
//! This daemon:
//! 1. Polls the backend for frames (1s), detections (1s), telemetry (3s)
//! 2. Keeps the overlay coincident with the displayed frame geometry
//! 3. Turns detection/telemetry signals into the bounded alert timeline
//! 4. Optionally writes a composited preview JPEG for an external viewer
//! 5. Tears all schedules down on Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use watchpost::config::{parse_viewport, ConsoleConfig, ViewportSettings};
use watchpost::ui::Ui;
use watchpost::{BackendClient, Console, ConsoleRuntime, TerminalBell};

const HEALTH_LOG_PERIOD: Duration = Duration::from_secs(5);
const PREVIEW_WRITE_PERIOD: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "watchpostd", about = "Live monitoring console daemon")]
struct Args {
    /// JSON config file (also honored via WATCHPOST_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backend base URL override
    #[arg(long)]
    backend: Option<String>,

    /// Viewport size override, e.g. 960x540
    #[arg(long)]
    viewport: Option<String>,

    /// Attempt the alert-sound unlock at startup (terminal bell)
    #[arg(long)]
    sound: bool,

    /// UI mode: auto, plain, or pretty
    #[arg(long)]
    ui: Option<String>,

    /// Write the composited live preview to this JPEG path once per second
    #[arg(long)]
    preview: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => ConsoleConfig::load_from(Some(path))?,
        None => ConsoleConfig::load()?,
    };
    if let Some(backend) = &args.backend {
        cfg.backend_url = backend.clone();
    }
    if let Some(viewport) = &args.viewport {
        let (width, height) = parse_viewport(viewport)?;
        cfg.viewport = ViewportSettings { width, height };
    }

    let client = BackendClient::new(&cfg.backend_url)?;
    match client.health() {
        Ok(()) => log::info!("backend reachable at {}", cfg.backend_url),
        // Not fatal: the pollers retry indefinitely.
        Err(err) => log::warn!("backend not reachable yet: {}", err),
    }

    let mut runtime = ConsoleRuntime::start(&cfg, client, Box::new(TerminalBell))?;
    if cfg.sound_on_start || args.sound {
        runtime.console_mut().request_sound_unlock();
    }

    let shutdown = runtime.shutdown_flag();
    ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))
        .context("install ctrl-c handler")?;

    log::info!(
        "watchpostd running: viewport {}x{}, polls {}ms/{}ms/{}ms",
        cfg.viewport.width,
        cfg.viewport.height,
        cfg.poll.frame_period.as_millis(),
        cfg.poll.detection_period.as_millis(),
        cfg.poll.telemetry_period.as_millis(),
    );

    let ui = Ui::from_flag(args.ui.as_deref(), std::io::stderr().is_terminal());
    let status = ui.status_line();
    let backend_url = cfg.backend_url.clone();
    let preview_path = args.preview.clone();
    let mut last_health_log = Instant::now();
    let mut last_preview = Instant::now();

    runtime.run(|console| {
        status.update(console);

        if last_health_log.elapsed() >= HEALTH_LOG_PERIOD {
            let stats = console.stats();
            log::info!(
                "backend={} frames={} detections={} rosters={} superseded={} alerts={}",
                backend_url,
                stats.frames_applied,
                stats.payloads_applied,
                stats.rosters_applied,
                stats.superseded_dropped,
                console.alerts().history().len(),
            );
            log_roster(console);
            last_health_log = Instant::now();
        }

        if let Some(path) = &preview_path {
            if last_preview.elapsed() >= PREVIEW_WRITE_PERIOD {
                if let Err(err) = write_preview(console, path) {
                    log::debug!("preview write failed: {}", err);
                }
                last_preview = Instant::now();
            }
        }
    });

    status.finish();
    let console = runtime.stop()?;
    log::info!(
        "watchpostd stopped with {} alert(s) in the timeline",
        console.alerts().history().len()
    );
    Ok(())
}

fn log_roster(console: &Console) {
    for soldier in &console.roster().soldiers {
        log::debug!(
            "soldier {} ({}): hr={} gps={:.4},{:.4} status={:?}",
            soldier.id,
            soldier.name.as_deref().unwrap_or("-"),
            soldier.heart_rate,
            soldier.gps[0],
            soldier.gps[1],
            soldier.status,
        );
    }
}

/// Encode the composited preview and swap it into place atomically so a
/// viewer never reads a half-written file.
fn write_preview(console: &Console, path: &Path) -> Result<()> {
    let Some(preview) = console.preview()? else {
        return Ok(());
    };
    let rgb = image::DynamicImage::ImageRgba8(preview).to_rgb8();
    let mut encoded = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, 80)
        .encode_image(&rgb)
        .context("encode preview jpeg")?;

    let tmp = path.with_extension("jpg.tmp");
    std::fs::write(&tmp, &encoded)
        .with_context(|| format!("write preview {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("swap preview into {}", path.display()))?;
    Ok(())
}
