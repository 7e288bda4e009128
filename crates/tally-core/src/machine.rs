//! Session-bound counter state machine.
//!
//! | Command        | Legal when                   | Effect                 |
//! |----------------|------------------------------|------------------------|
//! | `start`        | standby and session present  | mode -> counting       |
//! | `stop`         | counting                     | mode -> standby        |
//! | `inc` / `dec`  | counting                     | counter +/- 1          |
//! | `inc/n`/`dec/n`| `n` is a 32-bit integer      | counter +/- n (any mode) |
//! | `val` / `err`  | session present              | emit counter / tally   |
//!
//! Everything else, and every command that is not legal when it arrives,
//! adds one to the error tally and has no other effect.
//!
//! Advanced adjustments deliberately skip the counting-mode guard that the
//! plain `inc`/`dec` commands enforce. Deployed producers rely on that.

use crate::command::{parse, parse_amount, Command, Direction};
use crate::error::Violation;
use crate::mode::{Mode, ModeInput, ModeMachine};
use crate::session::{ServiceStatus, Session, SessionToken};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// Decoded payload of one inbound queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPayload {
    Text(String),
    /// The message had no usable text body.
    NonText,
}

/// Which value a report carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Counter,
    ErrorTally,
}

/// A value to publish on the topic, tagged with the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    pub session: SessionToken,
    pub value: i64,
    pub kind: ReportKind,
}

/// How the counter behaves at the edges of the `i32` range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Two's-complement wraparound (`i32::MAX + 1 == i32::MIN`).
    #[default]
    Wrapping,
    /// Clamp at `i32::MIN` / `i32::MAX`.
    Saturating,
}

impl OverflowPolicy {
    fn adjust(self, counter: i32, direction: Direction, amount: i32) -> i32 {
        match (self, direction) {
            (OverflowPolicy::Wrapping, Direction::Increase) => counter.wrapping_add(amount),
            (OverflowPolicy::Wrapping, Direction::Decrease) => counter.wrapping_sub(amount),
            (OverflowPolicy::Saturating, Direction::Increase) => counter.saturating_add(amount),
            (OverflowPolicy::Saturating, Direction::Decrease) => counter.saturating_sub(amount),
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wrapping" | "wrap" => Ok(OverflowPolicy::Wrapping),
            "saturating" | "saturate" => Ok(OverflowPolicy::Saturating),
            other => Err(format!("unknown overflow policy: {}", other)),
        }
    }
}

/// Point-in-time view of the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub mode: Mode,
    pub counter: i32,
    pub error_tally: u64,
    pub status: ServiceStatus,
}

/// The counter, its mode, the error tally and the session they belong to.
pub struct CounterStateMachine {
    session: Session,
    modes: ModeMachine,
    counter: i32,
    error_tally: u64,
    overflow: OverflowPolicy,
    last_violation: Option<Violation>,
}

impl CounterStateMachine {
    pub fn new(session: Session) -> Self {
        Self::with_overflow(session, OverflowPolicy::default())
    }

    pub fn with_overflow(session: Session, overflow: OverflowPolicy) -> Self {
        Self {
            session,
            modes: ModeMachine::new(),
            counter: 0,
            error_tally: 0,
            overflow,
            last_violation: None,
        }
    }

    /// Apply one command. Returns the event to publish, if any.
    pub fn apply(&mut self, command: &Command) -> Option<OutboundEvent> {
        match self.try_apply(command) {
            Ok(event) => {
                self.last_violation = None;
                event
            }
            Err(violation) => {
                self.record(violation);
                None
            }
        }
    }

    /// Decode and apply one inbound payload.
    pub fn apply_inbound(&mut self, payload: &InboundPayload) -> Option<OutboundEvent> {
        match payload {
            InboundPayload::Text(text) => self.apply(&parse(text)),
            InboundPayload::NonText => {
                self.record(Violation::NonTextMessage);
                None
            }
        }
    }

    /// Every branch validates before it mutates, so an `Err` leaves the
    /// machine untouched.
    fn try_apply(&mut self, command: &Command) -> Result<Option<OutboundEvent>, Violation> {
        match command {
            Command::Start => {
                self.require_session(command)?;
                self.transition(command, ModeInput::Start)?;
                Ok(None)
            }
            Command::Stop => {
                self.transition(command, ModeInput::Stop)?;
                Ok(None)
            }
            Command::Increment => {
                self.require_counting(command)?;
                self.adjust(Direction::Increase, 1);
                Ok(None)
            }
            Command::Decrement => {
                self.require_counting(command)?;
                self.adjust(Direction::Decrease, 1);
                Ok(None)
            }
            Command::AdjustBy { direction, amount } => {
                let amount = parse_amount(amount)?;
                self.adjust(*direction, amount);
                Ok(None)
            }
            Command::ReportValue => {
                let session = self.require_session(command)?.clone();
                Ok(Some(OutboundEvent {
                    session,
                    value: i64::from(self.counter),
                    kind: ReportKind::Counter,
                }))
            }
            Command::ReportError => {
                let session = self.require_session(command)?.clone();
                Ok(Some(OutboundEvent {
                    session,
                    value: i64::try_from(self.error_tally).unwrap_or(i64::MAX),
                    kind: ReportKind::ErrorTally,
                }))
            }
            Command::Unrecognized(raw) => Err(Violation::malformed(format!(
                "unrecognized command {:?}",
                raw
            ))),
        }
    }

    fn require_session(&self, command: &Command) -> Result<&SessionToken, Violation> {
        self.session.token().ok_or(Violation::SessionUnavailable {
            command: command.name(),
        })
    }

    fn require_counting(&self, command: &Command) -> Result<(), Violation> {
        if self.mode().is_counting() {
            Ok(())
        } else {
            Err(self.illegal(command))
        }
    }

    fn transition(&mut self, command: &Command, input: ModeInput) -> Result<(), Violation> {
        self.modes
            .consume(&input)
            .map(|_| ())
            .map_err(|_| self.illegal(command))
    }

    fn illegal(&self, command: &Command) -> Violation {
        Violation::IllegalTransition {
            command: command.name(),
            mode: self.mode(),
        }
    }

    fn adjust(&mut self, direction: Direction, amount: i32) {
        self.counter = self.overflow.adjust(self.counter, direction, amount);
    }

    fn record(&mut self, violation: Violation) {
        self.error_tally = self.error_tally.saturating_add(1);
        debug!(
            kind = %violation.kind(),
            error_tally = self.error_tally,
            "{}",
            violation
        );
        self.last_violation = Some(violation);
    }

    pub fn mode(&self) -> Mode {
        Mode::from(self.modes.state())
    }

    pub fn counter(&self) -> i32 {
        self.counter
    }

    pub fn error_tally(&self) -> u64 {
        self.error_tally
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> ServiceStatus {
        self.session.status()
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow
    }

    /// The violation raised by the most recent command, if it was rejected.
    pub fn last_violation(&self) -> Option<&Violation> {
        self.last_violation.as_ref()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            mode: self.mode(),
            counter: self.counter,
            error_tally: self.error_tally,
            status: self.status(),
        }
    }
}
