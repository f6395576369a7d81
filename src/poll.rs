//! Poller worker threads.
//!
//! Three independent periodic schedules exist (1s frame refresh, 1s
//! detection poll, 3s telemetry poll). They are not phase-aligned and never
//! assumed synchronized; the console engine reconciles whatever is current
//! at render time. Each completion is tagged with the poller's monotonic
//! sequence number so the engine can drop superseded responses.
//!
//! The pollers are responsible for:
//! - Running the blocking HTTP call off the engine thread
//! - Swallowing transport/decode failures (the next tick is the retry)
//! - Tearing down promptly when their shutdown flag flips
//!
//! The pollers MUST NOT:
//! - Mutate console state (the engine is the single writer)
//! - Retry out of band or surface failures to the operator

use anyhow::{Context, Result};
use image::GenericImageView;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::api::{BackendClient, CacheBuster};
use crate::detect::DetectionPayload;
use crate::telemetry::Roster;

/// One poller completion, applied by the engine in arrival order subject to
/// the per-poller sequence guard.
#[derive(Clone, Debug)]
pub enum ConsoleEvent {
    Frame {
        seq: u64,
        jpeg: Vec<u8>,
        width: u32,
        height: u32,
    },
    Detections {
        seq: u64,
        payload: DetectionPayload,
    },
    Roster {
        seq: u64,
        roster: Roster,
    },
}

pub struct PollerHandle {
    name: &'static str,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow::anyhow!("{} poller thread panicked", self.name))?;
        }
        Ok(())
    }
}

/// 1s cadence frame refresh with a cache-defeating `ts` per tick. Frame
/// bytes are decoded here so the engine learns the native dimensions
/// without blocking.
pub fn spawn_frame_poller(
    client: BackendClient,
    period: Duration,
    tx: Sender<ConsoleEvent>,
) -> PollerHandle {
    let mut seq = 0u64;
    let mut buster = CacheBuster::new();
    spawn_worker("frame", period, tx, move || {
        seq += 1;
        let jpeg = client.fetch_frame(buster.next())?;
        let decoded = image::load_from_memory(&jpeg).context("decode frame jpeg")?;
        let (width, height) = decoded.dimensions();
        Ok(ConsoleEvent::Frame {
            seq,
            jpeg,
            width,
            height,
        })
    })
}

/// 1s cadence detection feed; each success replaces the payload wholesale.
pub fn spawn_detection_poller(
    client: BackendClient,
    period: Duration,
    tx: Sender<ConsoleEvent>,
) -> PollerHandle {
    let mut seq = 0u64;
    spawn_worker("detections", period, tx, move || {
        seq += 1;
        let payload = client.fetch_detections()?;
        Ok(ConsoleEvent::Detections { seq, payload })
    })
}

/// 3s cadence telemetry roster; each success replaces the roster wholesale.
pub fn spawn_telemetry_poller(
    client: BackendClient,
    period: Duration,
    tx: Sender<ConsoleEvent>,
) -> PollerHandle {
    let mut seq = 0u64;
    spawn_worker("telemetry", period, tx, move || {
        seq += 1;
        let roster = client.fetch_soldiers()?;
        Ok(ConsoleEvent::Roster { seq, roster })
    })
}

fn spawn_worker(
    name: &'static str,
    period: Duration,
    tx: Sender<ConsoleEvent>,
    mut tick: impl FnMut() -> Result<ConsoleEvent> + Send + 'static,
) -> PollerHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_thread = shutdown.clone();
    let join = std::thread::spawn(move || {
        while !shutdown_thread.load(Ordering::SeqCst) {
            let started = Instant::now();
            match tick() {
                Ok(event) => {
                    // Receiver gone means the console is tearing down.
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    // Stale-but-valid: the previous value stays current and
                    // the next scheduled tick is the retry.
                    log::debug!("{} poll failed: {}", name, err);
                }
            }
            sleep_remainder(&shutdown_thread, period, started.elapsed());
        }
    });

    PollerHandle {
        name,
        shutdown,
        join: Some(join),
    }
}

/// Sleep out the rest of the period in short slices so a stop request is
/// honored within ~50ms instead of a full period.
fn sleep_remainder(shutdown: &AtomicBool, period: Duration, elapsed: Duration) {
    let mut remaining = period.saturating_sub(elapsed);
    while !remaining.is_zero() && !shutdown.load(Ordering::SeqCst) {
        let slice = remaining.min(Duration::from_millis(50));
        std::thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
}
