//! Terminal stand-in for sound effects.

use poolcalc_core::Cue;
use poolcalc_session::{CueError, CueSink};
use std::io::Write;

pub struct TerminalCues {
    bell: bool,
}

impl TerminalCues {
    pub fn new(bell: bool) -> Self {
        Self { bell }
    }
}

impl CueSink for TerminalCues {
    fn play(&mut self, cue: Cue) -> Result<(), CueError> {
        let mut out = std::io::stdout().lock();
        let bell = if self.bell { "\x07" } else { "" };
        writeln!(out, "{bell}~ {}", cue.as_str())
            .and_then(|_| out.flush())
            .map_err(|e| CueError::new(cue, e.to_string()))
    }
}
