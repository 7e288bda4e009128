//! Tally core: command language and session-bound counter state machine.
//!
//! This crate is pure. It never touches the network, never spawns tasks and
//! never blocks. The service crate feeds it one decoded inbound payload at a
//! time and forwards whatever [`OutboundEvent`] comes back to the topic.
//!
//! # Core Invariants
//!
//! 1. **Single Writer**: [`CounterStateMachine::apply`] takes `&mut self`
//! 2. **Total Legality**: every command is either legal in the current mode or
//!    a [`Violation`]
//! 3. **Exact Accounting**: every violation bumps the error tally by exactly one
//!    and changes nothing else
//! 4. **Fail Closed**: without a session, start and reports are violations
//!
//! # Flow
//!
//! ```text
//! payload -> parse() -> Command -> apply() -> Option<OutboundEvent>
//!                                     |
//!                                     +-> mode / counter / error tally
//! ```

pub mod command;
pub mod error;
pub mod machine;
pub mod mode;
pub mod session;

pub use command::{parse, Command, Direction};
pub use error::{Violation, ViolationKind};
pub use machine::{
    CounterStateMachine, InboundPayload, OutboundEvent, OverflowPolicy, ReportKind, Snapshot,
};
pub use mode::Mode;
pub use session::{ServiceStatus, Session, SessionToken};
