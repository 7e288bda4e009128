//! Integration tests for tallyd.
//!
//! - `harness.rs`  - Mock queue, recording publisher and scripted session issuer
//! - `scenario.rs` - Whole command scripts from queue to topic
//! - `session.rs`  - Startup session establishment and degraded operation
//! - `publish.rs`  - Report delivery, timeouts and backpressure
//! - `listener.rs` - Read/apply/ack loop and reconnect handling

mod listener;
mod session;
