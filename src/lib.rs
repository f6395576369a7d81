//! Watchpost
//!
//! This crate implements the core of a live monitoring console: it keeps a
//! periodically refreshed camera frame and an independently arriving
//! detection payload coincident on screen, and turns the detection/telemetry
//! stream into a bounded, human-readable alert timeline.
//!
//! # Architecture
//!
//! Three pollers run on their own cadences (1s frame refresh, 1s detection
//! feed, 3s personnel telemetry) and deliver completions over a channel to a
//! single-writer engine. The overlay renderer is the join point: on every
//! payload or display-geometry change it recomputes the frame-to-display
//! scale transform and produces a draw list plus a per-pass classification
//! summary, which feeds the alert engine.
//!
//! # Module Structure
//!
//! - `api`: backend HTTP client + in-process stub backend
//! - `detect` / `telemetry`: wire types for the detection and soldier feeds
//! - `poll`: poller worker threads and their teardown handles
//! - `overlay`: display geometry, scale transform, draw list, render pass
//! - `raster`: compositing a draw list onto an RGBA surface
//! - `alert`: bounded alert history + sound-unlock state machine
//! - `register`: face-registration submitter
//! - `console`: the owning state struct and its runtime loop
//! - `config` / `ui`: daemon configuration and terminal status line

pub mod alert;
pub mod api;
pub mod config;
pub mod console;
pub mod detect;
pub mod overlay;
pub mod poll;
pub mod raster;
pub mod register;
pub mod telemetry;
pub mod ui;

pub use alert::{Alert, AlertEngine, Chime, SilentChime, SoundUnlock, TerminalBell, ALERT_HISTORY_CAP};
pub use api::BackendClient;
pub use config::ConsoleConfig;
pub use console::{Console, ConsoleRuntime, ConsoleStats, LiveFrame};
pub use detect::{Category, Detection, DetectionPayload, FrameSize};
pub use overlay::{BoxColor, DisplayGeometry, DrawList, RenderSummary, ScaleTransform, Shape};
pub use poll::{ConsoleEvent, PollerHandle};
pub use register::{RegistrationForm, RegistrationImage};
pub use telemetry::{Roster, Soldier, SoldierStatus};
