use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_FRAME_PERIOD_MS: u64 = 1_000;
const DEFAULT_DETECTION_PERIOD_MS: u64 = 1_000;
const DEFAULT_TELEMETRY_PERIOD_MS: u64 = 3_000;
const DEFAULT_VIEWPORT_WIDTH: u32 = 960;
const DEFAULT_VIEWPORT_HEIGHT: u32 = 540;

#[derive(Debug, Deserialize, Default)]
struct ConsoleConfigFile {
    backend_url: Option<String>,
    poll: Option<PollConfigFile>,
    viewport: Option<ViewportConfigFile>,
    sound_on_start: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct PollConfigFile {
    frame_period_ms: Option<u64>,
    detection_period_ms: Option<u64>,
    telemetry_period_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ViewportConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub backend_url: String,
    pub poll: PollSettings,
    pub viewport: ViewportSettings,
    pub sound_on_start: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub frame_period: Duration,
    pub detection_period: Duration,
    pub telemetry_period: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct ViewportSettings {
    pub width: u32,
    pub height: u32,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            poll: PollSettings {
                frame_period: Duration::from_millis(DEFAULT_FRAME_PERIOD_MS),
                detection_period: Duration::from_millis(DEFAULT_DETECTION_PERIOD_MS),
                telemetry_period: Duration::from_millis(DEFAULT_TELEMETRY_PERIOD_MS),
            },
            viewport: ViewportSettings {
                width: DEFAULT_VIEWPORT_WIDTH,
                height: DEFAULT_VIEWPORT_HEIGHT,
            },
            sound_on_start: false,
        }
    }
}

impl ConsoleConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WATCHPOST_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => ConsoleConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConsoleConfigFile) -> Self {
        let defaults = Self::default();
        let poll = file.poll.unwrap_or_default();
        let viewport = file.viewport.unwrap_or_default();
        Self {
            backend_url: file.backend_url.unwrap_or(defaults.backend_url),
            poll: PollSettings {
                frame_period: poll
                    .frame_period_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.poll.frame_period),
                detection_period: poll
                    .detection_period_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.poll.detection_period),
                telemetry_period: poll
                    .telemetry_period_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.poll.telemetry_period),
            },
            viewport: ViewportSettings {
                width: viewport.width.unwrap_or(defaults.viewport.width),
                height: viewport.height.unwrap_or(defaults.viewport.height),
            },
            sound_on_start: file.sound_on_start.unwrap_or(defaults.sound_on_start),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("WATCHPOST_BACKEND_URL") {
            if !url.trim().is_empty() {
                self.backend_url = url;
            }
        }
        if let Ok(viewport) = std::env::var("WATCHPOST_VIEWPORT") {
            if !viewport.trim().is_empty() {
                let (width, height) = parse_viewport(&viewport)?;
                self.viewport = ViewportSettings { width, height };
            }
        }
        for (var, target) in [
            ("WATCHPOST_FRAME_PERIOD_MS", &mut self.poll.frame_period),
            (
                "WATCHPOST_DETECTION_PERIOD_MS",
                &mut self.poll.detection_period,
            ),
            (
                "WATCHPOST_TELEMETRY_PERIOD_MS",
                &mut self.poll.telemetry_period,
            ),
        ] {
            if let Ok(value) = std::env::var(var) {
                let ms: u64 = value
                    .parse()
                    .map_err(|_| anyhow!("{} must be an integer number of milliseconds", var))?;
                *target = Duration::from_millis(ms);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        Url::parse(&self.backend_url)
            .with_context(|| format!("invalid backend url '{}'", self.backend_url))?;
        if self.poll.frame_period.is_zero()
            || self.poll.detection_period.is_zero()
            || self.poll.telemetry_period.is_zero()
        {
            return Err(anyhow!("poll periods must be greater than zero"));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(anyhow!("viewport dimensions must be greater than zero"));
        }
        Ok(())
    }
}

pub fn parse_viewport(value: &str) -> Result<(u32, u32)> {
    let (width, height) = value
        .split_once('x')
        .ok_or_else(|| anyhow!("viewport must look like 960x540"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow!("viewport width must be an integer"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow!("viewport height must be an integer"))?;
    Ok((width, height))
}

fn read_config_file(path: &Path) -> Result<ConsoleConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
