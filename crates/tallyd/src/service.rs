//! The counter service: state machine plus report delivery.

use crate::publisher::{PublishStats, PublishWorker, TopicPublisher};
use std::sync::Arc;
use std::time::Duration;
use tally_core::{
    CounterStateMachine, InboundPayload, OverflowPolicy, ServiceStatus, Session, Snapshot,
};
use tracing::{debug, error, info};

/// Owns the counter state for the lifetime of the process.
///
/// Built once at startup and handed to the queue listener. `handle` takes
/// `&mut self`, so at most one message is applied at a time.
pub struct CounterService {
    machine: CounterStateMachine,
    reports: PublishWorker,
}

impl CounterService {
    /// Must be called from within a Tokio runtime.
    pub fn new(
        session: Session,
        overflow: OverflowPolicy,
        publisher: Arc<dyn TopicPublisher>,
        publish_timeout: Duration,
        publish_queue_capacity: usize,
    ) -> Self {
        match session.token() {
            Some(token) => info!(session = %token, "Counter service ready"),
            None => error!("Counter service DEGRADED: no session, start and reports will be rejected until restart"),
        }

        Self {
            machine: CounterStateMachine::with_overflow(session, overflow),
            reports: PublishWorker::spawn(publisher, publish_timeout, publish_queue_capacity),
        }
    }

    /// Apply one inbound payload and queue its report, if any.
    pub fn handle(&mut self, payload: &InboundPayload) {
        let Some(event) = self.machine.apply_inbound(payload) else {
            return;
        };

        debug!(kind = ?event.kind, value = event.value, "Queueing report");
        // Delivery problems are logged by the worker and never reach the tally.
        let _ = self.reports.submit(event);
    }

    pub fn status(&self) -> ServiceStatus {
        self.machine.status()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.machine.snapshot()
    }

    pub fn publish_stats(&self) -> Arc<PublishStats> {
        self.reports.stats()
    }

    /// Flush queued reports and stop the publish worker.
    pub async fn shutdown(self) -> Snapshot {
        let snapshot = self.machine.snapshot();
        self.reports.shutdown().await;
        info!(
            mode = %snapshot.mode,
            counter = snapshot.counter,
            error_tally = snapshot.error_tally,
            "Counter service stopped"
        );
        snapshot
    }
}
