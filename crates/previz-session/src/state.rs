//! The session state machine.
//!
//! ```text
//! Idle -> ScriptRunning            (start)
//! ScriptRunning -> Failed -> Idle  (script error; staging emptied)
//! ScriptRunning -> Finalizing      (clean return)
//! Finalizing -> Previewing         (fix-up, flatten, reprioritise, commit)
//! Previewing -> Idle               (harness signals rerun)
//! ```
//!
//! While the script runs, `set` routes to staging; while previewing,
//! `set` routes to policy admission.

use std::fmt;

/// Where the session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    ScriptRunning,
    Failed,
    Finalizing,
    Previewing,
}

impl SessionPhase {
    /// Is `next` a legal transition from this phase?
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Idle, ScriptRunning)
                | (ScriptRunning, Failed)
                | (ScriptRunning, Finalizing)
                | (Failed, Idle)
                | (Finalizing, Previewing)
                | (Previewing, Idle)
        )
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::ScriptRunning => "script-running",
            SessionPhase::Failed => "failed",
            SessionPhase::Finalizing => "finalizing",
            SessionPhase::Previewing => "previewing",
        };
        f.write_str(name)
    }
}
