//! Command language.
//!
//! ```text
//! start | stop | val | err | inc | dec | inc/<int> | dec/<int>
//! ```
//!
//! Parsing never fails. Anything outside the vocabulary becomes
//! [`Command::Unrecognized`], and the amount of an advanced command is kept as
//! text so the state machine can decide whether it is malformed.

use crate::error::Violation;
use std::fmt;

/// Separator between verb and amount in an advanced command.
pub const ADVANCED_SEPARATOR: char = '/';

/// Direction of an advanced adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    fn from_verb(verb: &str) -> Option<Self> {
        match verb {
            "inc" => Some(Direction::Increase),
            "dec" => Some(Direction::Decrease),
            _ => None,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Direction::Increase => "inc",
            Direction::Decrease => "dec",
        }
    }
}

/// A decoded inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    /// `val`: publish the counter.
    ReportValue,
    /// `err`: publish the error tally.
    ReportError,
    Increment,
    Decrement,
    /// `inc/<amount>` or `dec/<amount>`, amount not yet validated.
    AdjustBy {
        direction: Direction,
        amount: String,
    },
    /// Anything else, kept verbatim for logging.
    Unrecognized(String),
}

impl Command {
    /// Short name used in logs and violation messages.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::ReportValue => "val",
            Command::ReportError => "err",
            Command::Increment => "inc",
            Command::Decrement => "dec",
            Command::AdjustBy {
                direction: Direction::Increase,
                ..
            } => "inc/<amount>",
            Command::AdjustBy {
                direction: Direction::Decrease,
                ..
            } => "dec/<amount>",
            Command::Unrecognized(_) => "unrecognized",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::AdjustBy { direction, amount } => {
                write!(f, "{}{}{}", direction.verb(), ADVANCED_SEPARATOR, amount)
            }
            Command::Unrecognized(raw) => write!(f, "{:?}", raw),
            other => f.write_str(other.name()),
        }
    }
}

/// Map raw command text to a [`Command`].
pub fn parse(raw: &str) -> Command {
    match raw {
        "start" => Command::Start,
        "stop" => Command::Stop,
        "val" => Command::ReportValue,
        "err" => Command::ReportError,
        "inc" => Command::Increment,
        "dec" => Command::Decrement,
        _ => parse_advanced(raw),
    }
}

fn parse_advanced(raw: &str) -> Command {
    // Trailing separators are ignored: "inc/5/" reads as "inc/5".
    let mut parts: Vec<&str> = raw.split(ADVANCED_SEPARATOR).collect();
    while parts.last().is_some_and(|part| part.is_empty()) {
        parts.pop();
    }
    let [verb, amount] = parts[..] else {
        return Command::Unrecognized(raw.to_string());
    };

    match Direction::from_verb(verb) {
        Some(direction) => Command::AdjustBy {
            direction,
            amount: amount.to_string(),
        },
        None => Command::Unrecognized(raw.to_string()),
    }
}

/// Convert the amount text of an advanced command.
///
/// Accepts an optional sign followed by ASCII digits, within `i32` range.
pub fn parse_amount(text: &str) -> Result<i32, Violation> {
    text.parse::<i32>()
        .map_err(|e| Violation::malformed(format!("amount {:?} is not a 32-bit integer ({})", text, e)))
}
