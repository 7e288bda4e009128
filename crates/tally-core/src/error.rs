//! Protocol-level violations.
//!
//! A violation is never fatal. The state machine absorbs it into the error
//! tally and moves on to the next message.

use crate::mode::Mode;
use serde::Serialize;
use thiserror::Error;

/// A command that could not be applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The command needs a session and this instance never obtained one.
    #[error("session unavailable for '{command}'")]
    SessionUnavailable { command: &'static str },

    /// The command is well formed but not allowed in the current mode.
    #[error("'{command}' is not allowed while {mode}")]
    IllegalTransition { command: &'static str, mode: Mode },

    /// Unknown verb, wrong arity, or an amount that is not a 32-bit integer.
    #[error("malformed command: {reason}")]
    MalformedCommand { reason: String },

    /// The inbound message carried no text payload.
    #[error("inbound message has no text payload")]
    NonTextMessage,
}

/// Coarse classification of a [`Violation`], used as a log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    SessionUnavailable,
    IllegalTransition,
    MalformedCommand,
    NonTextMessage,
}

impl Violation {
    pub fn kind(&self) -> ViolationKind {
        match self {
            Violation::SessionUnavailable { .. } => ViolationKind::SessionUnavailable,
            Violation::IllegalTransition { .. } => ViolationKind::IllegalTransition,
            Violation::MalformedCommand { .. } => ViolationKind::MalformedCommand,
            Violation::NonTextMessage => ViolationKind::NonTextMessage,
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Violation::MalformedCommand {
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ViolationKind::SessionUnavailable => "session_unavailable",
            ViolationKind::IllegalTransition => "illegal_transition",
            ViolationKind::MalformedCommand => "malformed_command",
            ViolationKind::NonTextMessage => "non_text_message",
        };
        f.write_str(name)
    }
}
