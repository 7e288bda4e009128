//! Read/apply/ack loop and reconnect handling.

use super::harness::{
    drain, established, redis_error, service_with, MockQueue, RecordingPublisher,
};
use crate::error::TallydError;
use crate::listener::{Processed, QueueListener};
use std::time::Duration;
use tally_core::InboundPayload;

#[tokio::test]
async fn every_message_is_acked_once_in_order() {
    let queue = MockQueue::new();
    let ids = queue.xadd_all(&["start", "nope", "inc/x", "val"]);
    let mut listener = QueueListener::new(queue.clone(), service_with(established(), RecordingPublisher::new()));

    drain(&mut listener).await;

    assert_eq!(queue.ack_log(), ids);
    assert!(queue.pending().is_empty());
    assert_eq!(queue.remaining(), 0);
}

#[tokio::test]
async fn empty_queue_is_idle() {
    let queue = MockQueue::new();
    let mut listener = QueueListener::new(queue.clone(), service_with(established(), RecordingPublisher::new()));

    assert_eq!(listener.process_one().await.unwrap(), Processed::Idle);
    assert!(queue.ack_log().is_empty());
}

#[tokio::test]
async fn non_text_message_counts_as_violation() {
    let queue = MockQueue::new();
    queue.xadd(InboundPayload::NonText);
    let id = queue.xadd(InboundPayload::Text("err".into()));
    let publisher = RecordingPublisher::new();
    let mut listener = QueueListener::new(queue.clone(), service_with(established(), publisher.clone()));

    drain(&mut listener).await;
    assert_eq!(listener.service().snapshot().error_tally, 1);

    listener.into_service().shutdown().await;
    assert_eq!(publisher.delivered(), vec!["sess/1"]);
    assert_eq!(queue.ack_log().last(), Some(&id));
}

#[tokio::test]
async fn read_error_surfaces_without_losing_messages() {
    let queue = MockQueue::new();
    let id = queue.xadd(InboundPayload::Text("start".into()));
    queue.fail_next_read(redis_error("connection reset"));
    let mut listener = QueueListener::new(queue.clone(), service_with(established(), RecordingPublisher::new()));

    let result = listener.process_one().await;
    assert!(matches!(result, Err(TallydError::Redis(_))));
    assert_eq!(queue.remaining(), 1);

    let processed = listener.process_one().await.unwrap();
    assert_eq!(processed, Processed::Handled { message_id: id });
}

#[tokio::test(start_paused = true)]
async fn run_reconnects_after_redis_error() {
    let queue = MockQueue::new();
    queue.fail_next_read(redis_error("connection reset"));
    let ids = queue.xadd_all(&["start", "inc", "val"]);
    let publisher = RecordingPublisher::new();
    let mut listener = QueueListener::new(queue.clone(), service_with(established(), publisher.clone()));

    let handle = tokio::spawn(async move { listener.run().await });

    tokio::time::timeout(Duration::from_secs(30), async {
        while queue.ack_log().len() < ids.len() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    publisher.wait_for_attempts(1).await;
    handle.abort();

    assert_eq!(queue.reconnects(), 1);
    assert_eq!(queue.ack_log(), ids);
    assert_eq!(publisher.delivered(), vec!["sess/1"]);
}

#[tokio::test(start_paused = true)]
async fn run_skips_reconnect_for_other_errors() {
    let queue = MockQueue::new();
    queue.fail_next_read(TallydError::Protocol("short reply".into()));
    let id = queue.xadd(InboundPayload::Text("val".into()));
    let mut listener = QueueListener::new(queue.clone(), service_with(established(), RecordingPublisher::new()));

    let handle = tokio::spawn(async move { listener.run().await });

    tokio::time::timeout(Duration::from_secs(30), async {
        while queue.ack_log().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    handle.abort();

    assert_eq!(queue.reconnects(), 0);
    assert_eq!(queue.ack_log(), vec![id]);
}
