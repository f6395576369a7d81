//! The console engine.
//!
//! `Console` owns every piece of mutable dashboard state (current payload,
//! roster, alert history, sound flag, live frame, display geometry) and is
//! the only writer. Poller completions arrive over a channel and are applied
//! here, on one thread, with a per-poller sequence guard so a slow response
//! can never overwrite newer data. The overlay renderer and the alert engine
//! run only from these completion handlers.

use anyhow::{Context, Result};
use image::RgbaImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use crate::alert::{AlertEngine, Chime};
use crate::api::BackendClient;
use crate::config::ConsoleConfig;
use crate::detect::{DetectionPayload, FrameSize};
use crate::overlay::{self, DisplayGeometry, DrawList};
use crate::poll::{
    spawn_detection_poller, spawn_frame_poller, spawn_telemetry_poller, ConsoleEvent, PollerHandle,
};
use crate::raster;
use crate::register::{self, RegistrationForm};
use crate::telemetry::Roster;

/// The most recent successfully loaded frame, kept at native resolution for
/// display and for live-frame registration capture.
#[derive(Clone, Debug)]
pub struct LiveFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl LiveFrame {
    pub fn size(&self) -> FrameSize {
        FrameSize(self.width, self.height)
    }
}

/// Counters for the status line and the periodic health log.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleStats {
    pub frames_applied: u64,
    pub payloads_applied: u64,
    pub rosters_applied: u64,
    /// Completions dropped by the sequence guard.
    pub superseded_dropped: u64,
}

#[derive(Debug, Default)]
struct AppliedSeqs {
    frame: u64,
    detections: u64,
    roster: u64,
}

pub struct Console {
    viewport_width: u32,
    viewport_height: u32,
    frame: Option<LiveFrame>,
    geometry: DisplayGeometry,
    payload: DetectionPayload,
    roster: Roster,
    overlay: DrawList,
    alerts: AlertEngine,
    applied: AppliedSeqs,
    stats: ConsoleStats,
}

impl Console {
    pub fn new(viewport_width: u32, viewport_height: u32, chime: Box<dyn Chime + Send>) -> Self {
        Self {
            viewport_width,
            viewport_height,
            frame: None,
            geometry: DisplayGeometry {
                width: viewport_width,
                height: viewport_height,
            },
            payload: DetectionPayload::default(),
            roster: Roster::default(),
            overlay: DrawList::default(),
            alerts: AlertEngine::new(chime),
            applied: AppliedSeqs::default(),
            stats: ConsoleStats::default(),
        }
    }

    /// Apply one poller completion. Completions whose sequence is not newer
    /// than the last applied one for that poller are dropped.
    pub fn handle_event(&mut self, event: ConsoleEvent) {
        match event {
            ConsoleEvent::Frame {
                seq,
                jpeg,
                width,
                height,
            } => {
                if seq <= self.applied.frame {
                    self.stats.superseded_dropped += 1;
                    return;
                }
                self.applied.frame = seq;
                self.stats.frames_applied += 1;
                self.frame = Some(LiveFrame {
                    jpeg,
                    width,
                    height,
                });
                self.refit_geometry();
            }
            ConsoleEvent::Detections { seq, payload } => {
                if seq <= self.applied.detections {
                    self.stats.superseded_dropped += 1;
                    return;
                }
                self.applied.detections = seq;
                self.stats.payloads_applied += 1;
                self.payload = payload;
                self.render_pass();
            }
            ConsoleEvent::Roster { seq, roster } => {
                if seq <= self.applied.roster {
                    self.stats.superseded_dropped += 1;
                    return;
                }
                self.applied.roster = seq;
                self.stats.rosters_applied += 1;
                self.roster = roster;
                self.alerts.apply_roster(&self.roster);
            }
        }
    }

    /// Operator resized the console viewport.
    pub fn resize_viewport(&mut self, width: u32, height: u32) {
        self.viewport_width = width;
        self.viewport_height = height;
        self.refit_geometry();
    }

    /// Recompute display geometry from the live frame's native size and
    /// re-render only when it actually changed.
    fn refit_geometry(&mut self) {
        let native = self
            .frame
            .as_ref()
            .map(LiveFrame::size)
            .unwrap_or_default();
        let fitted = DisplayGeometry::contain(native, self.viewport_width, self.viewport_height);
        if fitted != self.geometry {
            self.geometry = fitted;
            self.render_pass();
        }
    }

    /// One full overlay pass: stateless redraw plus a single signal forward
    /// to the alert engine.
    fn render_pass(&mut self) {
        let (list, summary) = overlay::render(&self.payload, self.geometry);
        self.overlay = list;
        self.alerts.apply_render_summary(&summary);
    }

    /// Composite the current overlay onto the current frame at display size.
    /// `None` until a frame has loaded.
    pub fn preview(&self) -> Result<Option<RgbaImage>> {
        let Some(frame) = &self.frame else {
            return Ok(None);
        };
        let decoded = image::load_from_memory(&frame.jpeg).context("decode live frame")?;
        let mut base = decoded
            .resize_exact(
                self.geometry.width.max(1),
                self.geometry.height.max(1),
                image::imageops::FilterType::Triangle,
            )
            .into_rgba8();
        raster::composite(&mut base, &self.overlay);
        Ok(Some(base))
    }

    /// Forward a registration to the backend, capturing the live frame at
    /// native resolution when the form asks for it.
    pub fn register(&mut self, client: &BackendClient, form: &RegistrationForm) {
        register::submit(client, &mut self.alerts, self.frame.as_ref(), form);
    }

    pub fn request_sound_unlock(&mut self) -> bool {
        self.alerts.request_sound_unlock()
    }

    pub fn overlay(&self) -> &DrawList {
        &self.overlay
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    pub fn alerts_mut(&mut self) -> &mut AlertEngine {
        &mut self.alerts
    }

    pub fn payload(&self) -> &DetectionPayload {
        &self.payload
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn frame(&self) -> Option<&LiveFrame> {
        self.frame.as_ref()
    }

    pub fn geometry(&self) -> DisplayGeometry {
        self.geometry
    }

    pub fn stats(&self) -> ConsoleStats {
        self.stats
    }
}

/// Pollers plus the engine loop. Stopping tears every schedule down and
/// discards completions that arrive after the stop.
pub struct ConsoleRuntime {
    console: Console,
    rx: Receiver<ConsoleEvent>,
    pollers: Vec<PollerHandle>,
    shutdown: Arc<AtomicBool>,
}

impl ConsoleRuntime {
    pub fn start(
        cfg: &ConsoleConfig,
        client: BackendClient,
        chime: Box<dyn Chime + Send>,
    ) -> Result<Self> {
        let console = Console::new(cfg.viewport.width, cfg.viewport.height, chime);
        let (tx, rx) = mpsc::channel();
        let pollers = vec![
            spawn_frame_poller(client.clone(), cfg.poll.frame_period, tx.clone()),
            spawn_detection_poller(client.clone(), cfg.poll.detection_period, tx.clone()),
            spawn_telemetry_poller(client, cfg.poll.telemetry_period, tx),
        ];
        Ok(Self {
            console,
            rx,
            pollers,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag shared with e.g. a Ctrl-C handler; flipping it ends `run`.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut Console {
        &mut self.console
    }

    /// Drain completions until the shutdown flag flips. `observe` runs after
    /// every loop iteration (event applied or idle timeout) for status
    /// output and periodic work.
    pub fn run<F: FnMut(&Console)>(&mut self, mut observe: F) {
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.rx.recv_timeout(Duration::from_millis(100)) {
                Ok(event) => self.console.handle_event(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            observe(&self.console);
        }
    }

    /// Tear down all schedules and in-flight work, returning the final
    /// console state.
    pub fn stop(mut self) -> Result<Console> {
        self.shutdown.store(true, Ordering::SeqCst);
        for poller in self.pollers.drain(..) {
            poller.stop()?;
        }
        Ok(self.console)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::SilentChime;
    use crate::detect::{Category, Detection};
    use crate::overlay::{BoxColor, Shape};
    use crate::telemetry::{Soldier, SoldierStatus};

    fn console() -> Console {
        Console::new(320, 240, Box::new(SilentChime))
    }

    fn criminal_payload() -> DetectionPayload {
        DetectionPayload {
            frame_size: FrameSize(640, 480),
            detections: vec![Detection {
                bbox: [0.0, 0.0, 50.0, 50.0],
                face_match: true,
                category: Some(Category::Criminal),
                label: Some("J.Doe".to_string()),
                confidence: Some(41.2),
            }],
        }
    }

    #[test]
    fn payload_arrival_renders_scaled_overlay_and_alerts() {
        let mut console = console();
        console.handle_event(ConsoleEvent::Detections {
            seq: 1,
            payload: criminal_payload(),
        });

        match console.overlay().shapes.first() {
            Some(Shape::Box { x, y, w, h, color }) => {
                assert_eq!((*x, *y, *w, *h), (0.0, 0.0, 25.0, 25.0));
                assert_eq!(*color, BoxColor::Red);
            }
            other => panic!("expected box, got {:?}", other),
        }

        let history = console.alerts().history();
        assert_eq!(history.len(), 1);
        assert_eq!(history.front().unwrap().message, "Criminal alert: J.Doe");
    }

    #[test]
    fn superseded_completions_are_dropped() {
        let mut console = console();
        console.handle_event(ConsoleEvent::Detections {
            seq: 5,
            payload: criminal_payload(),
        });
        let applied_before = console.stats().payloads_applied;

        // A slower, older response must not overwrite the newer payload.
        console.handle_event(ConsoleEvent::Detections {
            seq: 3,
            payload: DetectionPayload::default(),
        });

        assert_eq!(console.stats().payloads_applied, applied_before);
        assert_eq!(console.stats().superseded_dropped, 1);
        assert_eq!(console.payload().frame_size, FrameSize(640, 480));
        assert!(!console.overlay().is_cleared());
    }

    #[test]
    fn empty_frame_size_clears_overlay_without_alerts() {
        let mut console = console();
        console.handle_event(ConsoleEvent::Detections {
            seq: 1,
            payload: DetectionPayload::default(),
        });
        assert!(console.overlay().is_cleared());
        assert!(console.alerts().history().is_empty());
    }

    #[test]
    fn critical_roster_raises_alert() {
        let mut console = console();
        console.handle_event(ConsoleEvent::Roster {
            seq: 1,
            roster: Roster {
                soldiers: vec![Soldier {
                    id: "S2".to_string(),
                    name: Some("Bravo".to_string()),
                    heart_rate: 150,
                    gps: [28.6, 77.2],
                    status: SoldierStatus::Critical,
                }],
            },
        });
        assert_eq!(
            console.alerts().history().front().unwrap().message,
            "Critical soldier status"
        );

        console.handle_event(ConsoleEvent::Roster {
            seq: 2,
            roster: Roster::default(),
        });
        assert_eq!(console.alerts().history().len(), 1);
    }

    #[test]
    fn frame_load_refits_geometry_and_rerenders() {
        let mut console = console();
        console.handle_event(ConsoleEvent::Detections {
            seq: 1,
            payload: criminal_payload(),
        });

        // A wider-than-viewport frame: geometry stays contain-fitted.
        console.handle_event(ConsoleEvent::Frame {
            seq: 1,
            jpeg: vec![0xFF, 0xD8],
            width: 640,
            height: 240,
        });
        assert_eq!(
            console.geometry(),
            DisplayGeometry {
                width: 320,
                height: 120
            }
        );
        match console.overlay().shapes.first() {
            Some(Shape::Box { w, h, .. }) => {
                assert_eq!((*w, *h), (25.0, 12.5));
            }
            other => panic!("expected box, got {:?}", other),
        }
    }

    #[test]
    fn resize_recomputes_transform() {
        let mut console = console();
        console.handle_event(ConsoleEvent::Detections {
            seq: 1,
            payload: criminal_payload(),
        });
        console.resize_viewport(640, 480);
        match console.overlay().shapes.first() {
            Some(Shape::Box { w, h, .. }) => {
                assert_eq!((*w, *h), (50.0, 50.0));
            }
            other => panic!("expected box, got {:?}", other),
        }
    }
}
