//! Report publishing.
//!
//! Reports go out as `"<session>/<value>"` text on a Redis pub/sub channel.
//! Publishing is best effort: a failed or slow publish is logged and the
//! report is dropped. It never feeds back into the error tally.
//!
//! ```text
//! CounterService --submit--> [bounded mpsc] --> PublishWorker --PUBLISH--> topic
//!                                                  (timeout per report)
//! ```

use crate::error::{TallydError, TallydResult};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tally_core::{OutboundEvent, SessionToken};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Separator between session and value in a report payload.
pub const REPORT_SEPARATOR: char = '/';

/// Render a report payload.
pub fn encode_report(session: &SessionToken, value: i64) -> String {
    format!("{}{}{}", session, REPORT_SEPARATOR, value)
}

/// Split a report payload into session and value.
///
/// The value is taken after the last separator so tokens may contain `/`.
pub fn decode_report(payload: &str) -> Option<(&str, i64)> {
    let (session, value) = payload.rsplit_once(REPORT_SEPARATOR)?;
    if session.is_empty() {
        return None;
    }
    Some((session, value.parse().ok()?))
}

/// Delivers reports to subscribers.
#[async_trait]
pub trait TopicPublisher: Send + Sync {
    async fn publish(&self, session: &SessionToken, value: i64) -> TallydResult<()>;
}

/// Publishes reports with Redis `PUBLISH`.
///
/// Connections are handed out through [`RedisTopicPublisher::acquire`]; a
/// connection goes back to the idle slot only after a successful send, so a
/// broken connection is never reused.
pub struct RedisTopicPublisher {
    client: Client,
    topic: String,
    idle: ConnectionSlot<MultiplexedConnection>,
}

/// Holds at most one idle connection between leases.
#[derive(Debug)]
struct ConnectionSlot<C> {
    inner: Arc<Mutex<Option<C>>>,
}

impl<C> Clone for ConnectionSlot<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C> ConnectionSlot<C> {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    fn take(&self) -> Option<C> {
        self.inner.lock().take()
    }

    /// Keep `conn` for the next lease only if it just worked.
    fn release(&self, conn: C, healthy: bool) -> bool {
        if healthy {
            *self.inner.lock() = Some(conn);
        }
        healthy
    }
}

impl RedisTopicPublisher {
    pub fn new(redis_url: &str, topic: impl Into<String>) -> TallydResult<Self> {
        Ok(Self {
            client: Client::open(redis_url)?,
            topic: topic.into(),
            idle: ConnectionSlot::new(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Lease a producer for one or more sends.
    pub async fn acquire(&self) -> TallydResult<TopicProducer> {
        let conn = match self.idle.take() {
            Some(conn) => conn,
            None => {
                debug!(topic = %self.topic, "Opening topic connection");
                self.client.get_multiplexed_async_connection().await?
            }
        };

        Ok(TopicProducer {
            conn: Some(conn),
            topic: self.topic.clone(),
            idle: self.idle.clone(),
            healthy: false,
        })
    }
}

#[async_trait]
impl TopicPublisher for RedisTopicPublisher {
    async fn publish(&self, session: &SessionToken, value: i64) -> TallydResult<()> {
        let mut producer = self.acquire().await?;
        let receivers = producer.send(&encode_report(session, value)).await?;
        debug!(
            topic = %self.topic,
            session = %session,
            value,
            receivers,
            "Published report"
        );
        Ok(())
    }
}

/// A leased topic connection.
///
/// Dropping the lease releases the connection: back to the idle slot if the
/// last send succeeded, closed otherwise.
pub struct TopicProducer {
    conn: Option<MultiplexedConnection>,
    topic: String,
    idle: ConnectionSlot<MultiplexedConnection>,
    healthy: bool,
}

impl TopicProducer {
    /// Publish one payload. Returns the number of subscribers that got it.
    pub async fn send(&mut self, payload: &str) -> TallydResult<i64> {
        self.healthy = false;
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| TallydError::Protocol("producer already released".into()))?;
        let receivers: i64 = conn.publish(&self.topic, payload).await?;
        self.healthy = true;
        Ok(receivers)
    }
}

impl Drop for TopicProducer {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if !self.idle.release(conn, self.healthy) {
            debug!(topic = %self.topic, "Discarding topic connection after failed send");
        }
    }
}

/// Delivery counters for the publish worker.
#[derive(Debug, Default)]
pub struct PublishStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl PublishStats {
    /// Reports the topic accepted.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Reports that errored or timed out.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Reports never attempted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}

/// Background task that publishes reports in submission order.
pub struct PublishWorker {
    sender: mpsc::Sender<OutboundEvent>,
    handle: JoinHandle<()>,
    stats: Arc<PublishStats>,
}

impl PublishWorker {
    /// Spawn the worker on the current runtime.
    pub fn spawn(publisher: Arc<dyn TopicPublisher>, timeout: Duration, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(PublishStats::default());
        let handle = tokio::spawn(Self::run(publisher, receiver, timeout, stats.clone()));

        Self {
            sender,
            handle,
            stats,
        }
    }

    async fn run(
        publisher: Arc<dyn TopicPublisher>,
        mut receiver: mpsc::Receiver<OutboundEvent>,
        timeout: Duration,
        stats: Arc<PublishStats>,
    ) {
        while let Some(event) = receiver.recv().await {
            match tokio::time::timeout(timeout, publisher.publish(&event.session, event.value))
                .await
            {
                Ok(Ok(())) => {
                    stats.delivered.fetch_add(1, Ordering::SeqCst);
                }
                Ok(Err(e)) => {
                    stats.failed.fetch_add(1, Ordering::SeqCst);
                    warn!(
                        kind = ?event.kind,
                        value = event.value,
                        error = %e,
                        "Publish failed, report dropped"
                    );
                }
                Err(_) => {
                    stats.failed.fetch_add(1, Ordering::SeqCst);
                    warn!(
                        kind = ?event.kind,
                        value = event.value,
                        error = %TallydError::PublishTimeout(timeout.as_millis() as u64),
                        "Publish timed out, report dropped"
                    );
                }
            }
        }

        debug!("Publish worker stopped");
    }

    /// Queue a report without waiting.
    pub fn submit(&self, event: OutboundEvent) -> TallydResult<()> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                self.stats.dropped.fetch_add(1, Ordering::SeqCst);
                warn!(
                    kind = ?event.kind,
                    value = event.value,
                    "Publish queue full, report dropped"
                );
                Err(TallydError::PublishQueue("queue full".into()))
            }
            Err(TrySendError::Closed(event)) => {
                self.stats.dropped.fetch_add(1, Ordering::SeqCst);
                warn!(
                    kind = ?event.kind,
                    value = event.value,
                    "Publish worker stopped, report dropped"
                );
                Err(TallydError::PublishQueue("worker stopped".into()))
            }
        }
    }

    pub fn stats(&self) -> Arc<PublishStats> {
        self.stats.clone()
    }

    /// Stop accepting reports and wait for queued ones to finish.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Publish worker ended abnormally");
        }
        info!(
            delivered = self.stats.delivered(),
            failed = self.stats.failed(),
            dropped = self.stats.dropped(),
            "Publish worker drained"
        );
    }
}
