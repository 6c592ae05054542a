//! Sound cue output.

use poolcalc_core::Cue;

/// Plays sound cues. Fire-and-forget: the session logs failures and moves on.
pub trait CueSink {
    fn play(&mut self, cue: Cue) -> Result<(), CueError>;
}

/// A cue could not be played.
#[derive(Debug, Clone, thiserror::Error)]
#[error("cue '{}' not played: {reason}", .cue.as_str())]
pub struct CueError {
    pub cue: Cue,
    pub reason: String,
}

impl CueError {
    pub fn new(cue: Cue, reason: impl Into<String>) -> Self {
        Self {
            cue,
            reason: reason.into(),
        }
    }
}

/// Discards every cue.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentCues;

impl CueSink for SilentCues {
    fn play(&mut self, _cue: Cue) -> Result<(), CueError> {
        Ok(())
    }
}
