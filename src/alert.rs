//! Alert timeline and sound gating.
//!
//! The alert engine keeps a bounded, newest-first history and a one-way
//! sound-unlock state machine. Trigger rules are evaluated once per render
//! pass / telemetry poll, not per entity, and there is deliberately no
//! cross-pass deduplication: identical messages on consecutive passes each
//! append a new entry, and the history bound is the only limiter.

use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::io::{IsTerminal, Write};
use std::time::SystemTime;

use crate::overlay::RenderSummary;
use crate::telemetry::Roster;

/// Oldest entries beyond this are dropped.
pub const ALERT_HISTORY_CAP: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alert {
    pub at: SystemTime,
    pub message: String,
}

/// One-shot audio cue. `play` restarts from the top if a previous cue is
/// still sounding; `prime` is the user-gesture-gated play-then-pause probe
/// used to unlock playback.
pub trait Chime {
    fn prime(&mut self) -> Result<()>;
    fn play(&mut self) -> Result<()>;
}

/// ASCII BEL on stderr. Priming requires a terminal: a detached stderr has
/// nowhere to sound, so the unlock attempt fails and the state stays locked.
pub struct TerminalBell;

impl Chime for TerminalBell {
    fn prime(&mut self) -> Result<()> {
        if !std::io::stderr().is_terminal() {
            return Err(anyhow!("stderr is not a terminal"));
        }
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let mut stderr = std::io::stderr();
        stderr
            .write_all(b"\x07")
            .and_then(|_| stderr.flush())
            .context("write terminal bell")?;
        Ok(())
    }
}

/// Always succeeds, makes no sound. Used headless (demo, tests).
pub struct SilentChime;

impl Chime for SilentChime {
    fn prime(&mut self) -> Result<()> {
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Process-lifetime flag: `Locked -> Unlocked`, one-way, transitioned only
/// by an explicit user action. Never reset automatically.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SoundUnlock {
    #[default]
    Locked,
    Unlocked,
}

pub struct AlertEngine {
    history: VecDeque<Alert>,
    sound: SoundUnlock,
    chime: Box<dyn Chime + Send>,
}

impl AlertEngine {
    pub fn new(chime: Box<dyn Chime + Send>) -> Self {
        Self {
            history: VecDeque::with_capacity(ALERT_HISTORY_CAP),
            sound: SoundUnlock::Locked,
            chime,
        }
    }

    /// Prepend an alert and truncate to the cap. Plays the cue only when
    /// unlocked; a playback failure is swallowed and never touches the
    /// history.
    pub fn raise(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("alert: {}", message);
        self.history.push_front(Alert {
            at: SystemTime::now(),
            message,
        });
        self.history.truncate(ALERT_HISTORY_CAP);

        if self.sound == SoundUnlock::Unlocked {
            if let Err(err) = self.chime.play() {
                log::debug!("alert chime failed: {}", err);
            }
        }
    }

    /// User-triggered unlock attempt. On success the state is unlocked for
    /// the rest of the process lifetime; on failure it stays locked and the
    /// affordance should be presented again.
    pub fn request_sound_unlock(&mut self) -> bool {
        if self.sound == SoundUnlock::Unlocked {
            return true;
        }
        match self.chime.prime() {
            Ok(()) => {
                self.sound = SoundUnlock::Unlocked;
                log::info!("alert sound unlocked");
                true
            }
            Err(err) => {
                log::info!("alert sound still locked: {}", err);
                false
            }
        }
    }

    pub fn sound_unlock(&self) -> SoundUnlock {
        self.sound
    }

    /// Newest-first.
    pub fn history(&self) -> &VecDeque<Alert> {
        &self.history
    }

    /// Apply one render pass worth of signals. The checks are independent:
    /// a single pass can raise zero, one, or both of these alerts.
    pub fn apply_render_summary(&mut self, summary: &RenderSummary) {
        if !summary.criminal_labels.is_empty() {
            self.raise(format!(
                "Criminal alert: {}",
                summary.criminal_labels.join(", ")
            ));
        }
        if summary.unknown_seen {
            self.raise("Unknown person detected");
        }
    }

    /// Evaluated once per successful telemetry poll against the new roster.
    pub fn apply_roster(&mut self, roster: &Roster) {
        if roster.any_critical() {
            self.raise("Critical soldier status");
        }
    }
}
