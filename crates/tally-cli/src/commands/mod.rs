//! Command implementations.

pub mod send;
pub mod watch;
