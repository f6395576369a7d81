//! demo - run the console against the in-process stub backend
//!
//! Spins up the stub backend with a synthetic frame, a detection payload
//! containing one flagged identity and one unmatched subject, and a roster
//! with one critical soldier; runs the full poll/render/alert loop for a few
//! seconds; then exercises live-frame registration and prints the timeline.

use anyhow::Result;
use std::sync::atomic::Ordering;
use std::time::{Duration, UNIX_EPOCH};

use watchpost::api::stub::StubBackend;
use watchpost::config::ConsoleConfig;
use watchpost::detect::{Category, Detection, DetectionPayload, FrameSize};
use watchpost::register::{RegistrationForm, RegistrationImage};
use watchpost::telemetry::{Roster, Soldier, SoldierStatus};
use watchpost::{BackendClient, ConsoleRuntime, SilentChime};

const RUN_FOR: Duration = Duration::from_secs(4);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let stub = StubBackend::new().spawn("127.0.0.1:0")?;
    stub.set_frame_jpeg(synthetic_frame_jpeg(640, 480)?);
    stub.set_detections(demo_detections());
    stub.set_roster(demo_roster());
    log::info!("stub backend listening on {}", stub.base_url());

    let mut cfg = ConsoleConfig::default();
    cfg.backend_url = stub.base_url();
    cfg.poll.frame_period = Duration::from_millis(200);
    cfg.poll.detection_period = Duration::from_millis(200);
    cfg.poll.telemetry_period = Duration::from_millis(600);
    cfg.viewport.width = 320;
    cfg.viewport.height = 240;

    let client = BackendClient::new(&cfg.backend_url)?;
    let mut runtime = ConsoleRuntime::start(&cfg, client.clone(), Box::new(SilentChime))?;
    runtime.console_mut().request_sound_unlock();

    let shutdown = runtime.shutdown_flag();
    std::thread::spawn(move || {
        std::thread::sleep(RUN_FOR);
        shutdown.store(true, Ordering::SeqCst);
    });

    runtime.run(|_console| {});

    // Live-frame registration against the stub.
    runtime.console_mut().register(
        &client,
        &RegistrationForm {
            id: "visitor-07".to_string(),
            category: Some(Category::Citizen),
            image: RegistrationImage::LiveFrame,
        },
    );

    let console = runtime.stop()?;

    println!("overlay shapes: {}", console.overlay().shapes.len());
    println!(
        "display geometry: {}x{}",
        console.geometry().width,
        console.geometry().height
    );
    println!("alert timeline (newest first):");
    for alert in console.alerts().history() {
        let epoch_s = alert
            .at
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        println!("  [{}] {}", epoch_s, alert.message);
    }
    for record in stub.registrations() {
        println!(
            "registered: id={} category={} file_bytes={}",
            record.id, record.category, record.file_bytes
        );
    }

    stub.stop()?;
    Ok(())
}

fn synthetic_frame_jpeg(width: u32, height: u32) -> Result<Vec<u8>> {
    let image = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 96])
    });
    let mut encoded = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, 80).encode_image(&image)?;
    Ok(encoded)
}

fn demo_detections() -> DetectionPayload {
    DetectionPayload {
        frame_size: FrameSize(640, 480),
        detections: vec![
            Detection {
                bbox: [40.0, 60.0, 120.0, 160.0],
                face_match: true,
                category: Some(Category::Criminal),
                label: Some("J.Doe".to_string()),
                confidence: Some(38.4),
            },
            Detection {
                bbox: [300.0, 80.0, 100.0, 140.0],
                face_match: false,
                category: Some(Category::Unknown),
                label: None,
                confidence: None,
            },
        ],
    }
}

fn demo_roster() -> Roster {
    Roster {
        soldiers: vec![
            Soldier {
                id: "S1".to_string(),
                name: Some("Alpha".to_string()),
                heart_rate: 72,
                gps: [28.6129, 77.2295],
                status: SoldierStatus::Ok,
            },
            Soldier {
                id: "S2".to_string(),
                name: Some("Bravo".to_string()),
                heart_rate: 148,
                gps: [28.6130, 77.2296],
                status: SoldierStatus::Critical,
            },
            Soldier {
                id: "S3".to_string(),
                name: Some("Charlie".to_string()),
                heart_rate: 84,
                gps: [28.6131, 77.2297],
                status: SoldierStatus::Warn,
            },
        ],
    }
}
