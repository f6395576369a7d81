use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

use crate::console::Console;

#[derive(Clone, Copy, Debug)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_flag(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    /// A persistent one-line live status readout. Plain mode (or a non-TTY
    /// stderr in auto mode) renders nothing; the periodic health log covers
    /// those runs.
    pub fn status_line(&self) -> StatusLine {
        let use_pretty = match self.mode {
            UiMode::Pretty => true,
            UiMode::Auto => self.is_tty,
            UiMode::Plain => false,
        };
        if !use_pretty {
            return StatusLine { bar: None };
        }

        let bar = ProgressBar::new_spinner();
        bar.set_draw_target(ProgressDrawTarget::stderr());
        bar.enable_steady_tick(Duration::from_millis(120));
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);
        StatusLine { bar: Some(bar) }
    }
}

pub struct StatusLine {
    bar: Option<ProgressBar>,
}

impl StatusLine {
    pub fn update(&self, console: &Console) {
        let Some(bar) = &self.bar else {
            return;
        };
        let stats = console.stats();
        bar.set_message(format!(
            "frames={} detections={} rosters={} soldiers={} alerts={}",
            stats.frames_applied,
            stats.payloads_applied,
            stats.rosters_applied,
            console.roster().soldiers.len(),
            console.alerts().history().len(),
        ));
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_mode_renders_nothing() {
        let ui = Ui::from_flag(Some("plain"), true);
        assert!(ui.status_line().bar.is_none());
    }

    #[test]
    fn auto_mode_follows_tty() {
        assert!(Ui::from_flag(None, false).status_line().bar.is_none());
        assert!(Ui::from_flag(None, true).status_line().bar.is_some());
    }
}
