//! tallyd: session-bound counter service fed by a Redis Streams queue.
//!
//! tallyd requests a session once at startup, then reads commands one at a
//! time from the inbound stream, applies them to the counter state machine
//! and publishes the reports the machine produces.
//!
//! # Core Invariants
//!
//! 1. **One In-Flight**: commands are read with COUNT=1 and applied in order
//! 2. **Session Once**: the session is requested before the first read and
//!    never again
//! 3. **Isolated Delivery**: a failed publish never changes the counter or
//!    the error tally
//!
//! # Architecture
//!
//! ```text
//! Redis Stream -> QueueListener -> CounterService -> PublishWorker -> Topic
//!     ^                |
//!     |____ XACK ______|
//! ```

pub mod config;
pub mod error;
pub mod listener;
pub mod publisher;
pub mod redis_consumer;
pub mod service;
pub mod session;

#[cfg(test)]
mod tests;

pub use config::{RetryPolicy, TallyConfig};
pub use error::{TallydError, TallydResult};
pub use listener::{Processed, QueueListener};
pub use publisher::{
    decode_report, encode_report, PublishStats, PublishWorker, RedisTopicPublisher, TopicProducer,
    TopicPublisher,
};
pub use redis_consumer::{InboundMessage, InboundQueue, RedisQueueConsumer};
pub use service::CounterService;
pub use session::{
    establish_session, provider_from_config, HttpSessionProvider, LocalSessionIssuer,
    SessionProvider,
};
