//! End-to-end: the full poll/render/alert loop against the stub backend.

use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use watchpost::api::stub::StubBackend;
use watchpost::config::ConsoleConfig;
use watchpost::detect::{Category, Detection, DetectionPayload, FrameSize};
use watchpost::overlay::{BoxColor, Shape};
use watchpost::poll::spawn_detection_poller;
use watchpost::register::{RegistrationForm, RegistrationImage};
use watchpost::{BackendClient, Console, ConsoleRuntime, SilentChime};

fn synthetic_frame_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([24, 32, 40]));
    let mut encoded = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, 80)
        .encode_image(&image)
        .expect("encode synthetic frame");
    encoded
}

fn fast_config(backend_url: String) -> ConsoleConfig {
    let mut cfg = ConsoleConfig::default();
    cfg.backend_url = backend_url;
    cfg.poll.frame_period = Duration::from_millis(30);
    cfg.poll.detection_period = Duration::from_millis(30);
    cfg.poll.telemetry_period = Duration::from_millis(60);
    cfg.viewport.width = 320;
    cfg.viewport.height = 240;
    cfg
}

#[test]
fn criminal_detection_scales_and_alerts_end_to_end() {
    let stub = StubBackend::new().spawn("127.0.0.1:0").expect("stub backend");
    stub.set_frame_jpeg(synthetic_frame_jpeg(640, 480));
    stub.set_detections(DetectionPayload {
        frame_size: FrameSize(640, 480),
        detections: vec![Detection {
            bbox: [0.0, 0.0, 50.0, 50.0],
            face_match: true,
            category: Some(Category::Criminal),
            label: Some("J.Doe".to_string()),
            confidence: Some(41.0),
        }],
    });

    let cfg = fast_config(stub.base_url());
    let client = BackendClient::new(&cfg.backend_url).expect("client");
    let mut runtime =
        ConsoleRuntime::start(&cfg, client, Box::new(SilentChime)).expect("runtime");

    let done_flag = runtime.shutdown_flag();
    let watchdog_flag = runtime.shutdown_flag();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(10));
        watchdog_flag.store(true, Ordering::SeqCst);
    });

    runtime.run(|console| {
        let saw_alert = console
            .alerts()
            .history()
            .iter()
            .any(|alert| alert.message == "Criminal alert: J.Doe");
        if saw_alert && console.frame().is_some() && !console.overlay().is_cleared() {
            done_flag.store(true, Ordering::SeqCst);
        }
    });

    let console = runtime.stop().expect("stop runtime");

    // frame loaded at native 640x480, contain-fitted into 320x240
    assert_eq!(console.geometry().width, 320);
    assert_eq!(console.geometry().height, 240);

    // one box, scaled by 0.5 on both axes, colored red
    let boxes: Vec<_> = console
        .overlay()
        .shapes
        .iter()
        .filter_map(|shape| match shape {
            Shape::Box { x, y, w, h, color } => Some((*x, *y, *w, *h, *color)),
            _ => None,
        })
        .collect();
    assert_eq!(boxes, vec![(0.0, 0.0, 25.0, 25.0, BoxColor::Red)]);

    // the criminal alert fired; nothing claimed an unknown subject
    let history = console.alerts().history();
    assert!(history
        .iter()
        .any(|alert| alert.message == "Criminal alert: J.Doe"));
    assert!(!history
        .iter()
        .any(|alert| alert.message == "Unknown person detected"));

    stub.stop().expect("stop stub");
}

#[test]
fn live_frame_registration_reaches_backend_and_confirms() {
    let stub = StubBackend::new().spawn("127.0.0.1:0").expect("stub backend");
    let frame = synthetic_frame_jpeg(320, 240);
    stub.set_frame_jpeg(frame.clone());

    let cfg = fast_config(stub.base_url());
    let client = BackendClient::new(&cfg.backend_url).expect("client");
    let mut runtime =
        ConsoleRuntime::start(&cfg, client.clone(), Box::new(SilentChime)).expect("runtime");

    let done_flag = runtime.shutdown_flag();
    let watchdog_flag = runtime.shutdown_flag();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(10));
        watchdog_flag.store(true, Ordering::SeqCst);
    });
    runtime.run(|console| {
        if console.frame().is_some() {
            done_flag.store(true, Ordering::SeqCst);
        }
    });

    runtime.console_mut().register(
        &client,
        &RegistrationForm {
            id: "visitor-01".to_string(),
            category: None,
            image: RegistrationImage::LiveFrame,
        },
    );

    let console = runtime.stop().expect("stop runtime");
    assert!(console
        .alerts()
        .history()
        .iter()
        .any(|alert| alert.message == "Registered face for visitor-01"));

    let registrations = stub.registrations();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].id, "visitor-01");
    // category defaults to citizen when the form leaves it unset
    assert_eq!(registrations[0].category, "citizen");
    assert_eq!(registrations[0].file_bytes, frame.len());

    stub.stop().expect("stop stub");
}

#[test]
fn failed_detection_poll_keeps_stale_overlay() {
    let stub = StubBackend::new().spawn("127.0.0.1:0").expect("stub backend");
    stub.set_detections(DetectionPayload {
        frame_size: FrameSize(640, 480),
        detections: vec![Detection {
            bbox: [10.0, 10.0, 20.0, 20.0],
            face_match: true,
            category: Some(Category::Official),
            label: Some("Capt. Rao".to_string()),
            confidence: Some(55.0),
        }],
    });

    let client = BackendClient::new(&stub.base_url()).expect("client");
    let (tx, rx) = mpsc::channel();
    let poller = spawn_detection_poller(client, Duration::from_millis(20), tx);
    let mut console = Console::new(320, 240, Box::new(SilentChime));

    let deadline = Instant::now() + Duration::from_secs(5);
    while console.overlay().is_cleared() && Instant::now() < deadline {
        if let Ok(event) = rx.recv_timeout(Duration::from_millis(100)) {
            console.handle_event(event);
        }
    }
    assert!(!console.overlay().is_cleared(), "overlay never rendered");

    // Backend starts failing: polls are swallowed, the previous overlay
    // stays rendered, and the next tick is the only retry.
    stub.set_detections_failing(true);
    let failing_until = Instant::now() + Duration::from_millis(300);
    while Instant::now() < failing_until {
        if let Ok(event) = rx.recv_timeout(Duration::from_millis(50)) {
            console.handle_event(event);
        }
    }
    assert!(!console.overlay().is_cleared());
    assert_eq!(console.payload().frame_size, FrameSize(640, 480));

    poller.stop().expect("stop poller");
    stub.stop().expect("stop stub");
}

#[test]
fn preview_composites_frame_and_overlay() {
    let stub = StubBackend::new().spawn("127.0.0.1:0").expect("stub backend");
    stub.set_frame_jpeg(synthetic_frame_jpeg(640, 480));
    stub.set_detections(DetectionPayload {
        frame_size: FrameSize(640, 480),
        detections: vec![Detection {
            bbox: [100.0, 100.0, 200.0, 200.0],
            face_match: false,
            category: None,
            label: None,
            confidence: None,
        }],
    });

    let cfg = fast_config(stub.base_url());
    let client = BackendClient::new(&cfg.backend_url).expect("client");
    let mut runtime =
        ConsoleRuntime::start(&cfg, client, Box::new(SilentChime)).expect("runtime");

    let done_flag = runtime.shutdown_flag();
    let watchdog_flag = runtime.shutdown_flag();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(10));
        watchdog_flag.store(true, Ordering::SeqCst);
    });
    runtime.run(|console| {
        if console.frame().is_some() && !console.overlay().is_cleared() {
            done_flag.store(true, Ordering::SeqCst);
        }
    });

    let console = runtime.stop().expect("stop runtime");
    let preview = console.preview().expect("composite preview").expect("frame");
    assert_eq!(preview.width(), console.geometry().width);
    assert_eq!(preview.height(), console.geometry().height);

    // the unmatched box is stroked orange at half scale: (50,50)..(150,150)
    assert_eq!(preview.get_pixel(50, 50).0[..3], [255, 165, 0]);

    stub.stop().expect("stop stub");
}
