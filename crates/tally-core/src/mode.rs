//! Counting mode state machine using rust-fsm.
//!
//! ```text
//! ┌─────────────┐   Start   ┌─────────────┐
//! │   Standby   │ ────────► │  Counting   │
//! │  (initial)  │ ◄──────── │             │
//! └─────────────┘   Stop    └─────────────┘
//! ```
//!
//! Any other input in a given state is impossible and surfaces as an
//! illegal transition. Whether a session exists is checked by the counter
//! machine before `Start` is fed in; the mode machine only knows modes.

use rust_fsm::*;
use serde::{Deserialize, Serialize};
use std::fmt;

state_machine! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub mode_machine(Standby)

    Standby => {
        Start => Counting
    },
    Counting => {
        Stop => Standby
    }
}

pub use mode_machine::Input as ModeInput;
pub use mode_machine::State as ModeState;
pub use mode_machine::StateMachine as ModeMachine;

/// Public view of the counting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Idle. Plain increments and decrements are rejected.
    Standby,
    /// Accepting plain increments and decrements.
    Counting,
}

impl Mode {
    pub fn is_counting(&self) -> bool {
        matches!(self, Mode::Counting)
    }
}

impl From<&ModeState> for Mode {
    fn from(state: &ModeState) -> Self {
        match state {
            ModeState::Standby => Mode::Standby,
            ModeState::Counting => Mode::Counting,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Standby => f.write_str("standby"),
            Mode::Counting => f.write_str("counting"),
        }
    }
}
