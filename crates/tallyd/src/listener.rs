//! Queue listener loop.

use crate::error::{TallydError, TallydResult};
use crate::redis_consumer::InboundQueue;
use crate::service::CounterService;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What one pass of the listener did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// The block timeout expired with nothing to read.
    Idle,
    /// A message was applied and acknowledged.
    Handled { message_id: String },
}

/// Feeds queue messages to the counter service, one at a time.
pub struct QueueListener<Q> {
    queue: Q,
    service: CounterService,
}

impl<Q: InboundQueue> QueueListener<Q> {
    pub fn new(queue: Q, service: CounterService) -> Self {
        Self { queue, service }
    }

    pub fn service(&self) -> &CounterService {
        &self.service
    }

    /// Give the service back, e.g. to drain it on shutdown.
    pub fn into_service(self) -> CounterService {
        self.service
    }

    /// Run until the task is cancelled.
    ///
    /// This loop:
    /// 1. Reads one message (XREADGROUP COUNT=1)
    /// 2. Applies it to the counter service
    /// 3. ACKs it
    /// 4. On queue errors, backs off and reconnects
    pub async fn run(&mut self) -> TallydResult<()> {
        info!("Starting queue listener loop");

        loop {
            if let Err(e) = self.process_one().await {
                error!(error = %e, "Error processing message");

                match &e {
                    TallydError::Redis(_) => {
                        warn!("Redis error, attempting to reconnect...");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        if let Err(reconnect_err) = self.queue.reconnect().await {
                            error!(error = %reconnect_err, "Failed to reconnect to Redis");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                    _ => {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }

    /// Process at most one message.
    pub async fn process_one(&mut self) -> TallydResult<Processed> {
        let Some(message) = self.queue.read_next().await? else {
            debug!("No messages available, continuing to poll...");
            return Ok(Processed::Idle);
        };

        self.service.handle(&message.payload);
        self.queue.ack(&message.message_id).await?;

        debug!(message_id = %message.message_id, "Message acknowledged");

        Ok(Processed::Handled {
            message_id: message.message_id,
        })
    }
}
