//! Startup session establishment and degraded operation.

use super::harness::{
    drain, service_with, MockQueue, RecordingPublisher, ScriptedSessionProvider,
};
use crate::config::RetryPolicy;
use crate::error::TallydError;
use crate::listener::QueueListener;
use crate::session::{establish_session, LocalSessionIssuer};
use tally_core::{Mode, ServiceStatus, Session, SessionToken};

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay_ms: 1,
        max_delay_ms: 1,
    }
}

#[tokio::test]
async fn token_on_first_attempt() {
    let provider = ScriptedSessionProvider::new(vec![Ok(Some(SessionToken::new("abc")))]);

    let session = establish_session(&provider, "acct", &fast_retry(3)).await;

    assert_eq!(session, Session::Established(SessionToken::new("abc")));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn communication_failures_are_retried() {
    let provider = ScriptedSessionProvider::new(vec![
        Err(TallydError::Session("connection refused".into())),
        Err(TallydError::Session("connection refused".into())),
        Ok(Some(SessionToken::new("third-time"))),
    ]);

    let session = establish_session(&provider, "acct", &fast_retry(3)).await;

    assert_eq!(session.token(), Some(&SessionToken::new("third-time")));
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn rejection_is_not_retried() {
    let provider = ScriptedSessionProvider::new(vec![Ok(None), Ok(Some(SessionToken::new("late")))]);

    let session = establish_session(&provider, "acct", &fast_retry(5)).await;

    assert_eq!(session, Session::Unavailable);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn exhausted_retries_leave_session_unavailable() {
    let provider = ScriptedSessionProvider::new(vec![]);

    let session = establish_session(&provider, "acct", &fast_retry(4)).await;

    assert_eq!(session, Session::Unavailable);
    assert_eq!(session.status(), ServiceStatus::Degraded);
    assert_eq!(provider.calls(), 4);
}

#[tokio::test]
async fn local_issuer_rejects_unknown_account() {
    let issuer = LocalSessionIssuer::new("108222");

    let accepted = establish_session(&issuer, "108222", &RetryPolicy::once()).await;
    let rejected = establish_session(&issuer, "999", &RetryPolicy::once()).await;

    assert!(accepted.token().is_some());
    assert_eq!(rejected, Session::Unavailable);
}

#[tokio::test]
async fn degraded_service_rejects_start_and_reports() {
    let queue = MockQueue::new();
    queue.xadd_all(&["start", "val", "err", "inc", "stop", "bogus"]);
    let publisher = RecordingPublisher::new();
    let mut listener = QueueListener::new(queue.clone(), service_with(Session::Unavailable, publisher.clone()));

    assert_eq!(listener.service().status(), ServiceStatus::Degraded);
    drain(&mut listener).await;
    let snapshot = listener.into_service().shutdown().await;

    assert!(publisher.delivered().is_empty());
    assert_eq!(publisher.attempts(), 0);
    assert_eq!(snapshot.mode, Mode::Standby);
    assert_eq!(snapshot.counter, 0);
    assert_eq!(snapshot.error_tally, 6);
    // Rejected commands are still consumed
    assert_eq!(queue.ack_log().len(), 6);
}
