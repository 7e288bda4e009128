//! Session issuance.
//!
//! A session is requested exactly once, before the first command is read.
//! Rejection is final. Communication failures are retried according to the
//! configured [`RetryPolicy`]; when retries run out the instance starts
//! degraded and stays that way until restarted.

use crate::config::{RetryPolicy, TallyConfig};
use crate::error::{TallydError, TallydResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tally_core::{Session, SessionToken};
use tracing::{error, info, warn};

/// Issues session tokens for accounts.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// `Ok(None)` means the issuer rejected the account. `Err` means it
    /// could not be reached or answered nonsense.
    async fn issue_session(&self, account_id: &str) -> TallydResult<Option<SessionToken>>;
}

/// In-process issuer with a single registered account.
///
/// Hands out a fresh random token to the registered account and rejects
/// every other account.
#[derive(Debug, Clone)]
pub struct LocalSessionIssuer {
    registered_account: String,
}

impl LocalSessionIssuer {
    pub fn new(registered_account: impl Into<String>) -> Self {
        Self {
            registered_account: registered_account.into(),
        }
    }
}

#[async_trait]
impl SessionProvider for LocalSessionIssuer {
    async fn issue_session(&self, account_id: &str) -> TallydResult<Option<SessionToken>> {
        if account_id == self.registered_account {
            Ok(Some(SessionToken::new(uuid::Uuid::new_v4().to_string())))
        } else {
            Ok(None)
        }
    }
}

#[derive(Debug, Serialize)]
struct IssueSessionRequest<'a> {
    account_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct IssueSessionResponse {
    #[serde(default)]
    session_id: Option<String>,
}

/// Remote issuer reached over HTTP.
///
/// `POST {base_url}/sessions` with `{"account_id": ...}`. A 2xx reply with a
/// non-empty `session_id` is a token; a 2xx reply without one, or 401/403/404,
/// is a rejection; anything else is a failure.
pub struct HttpSessionProvider {
    client: Client,
    endpoint: String,
}

impl HttpSessionProvider {
    pub fn new(base_url: &str, timeout: Duration) -> TallydResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/sessions", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl SessionProvider for HttpSessionProvider {
    async fn issue_session(&self, account_id: &str) -> TallydResult<Option<SessionToken>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&IssueSessionRequest { account_id })
            .send()
            .await?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        ) {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(TallydError::Session(format!(
                "issuer returned HTTP {}",
                status
            )));
        }

        let body: IssueSessionResponse = response.json().await?;
        Ok(body
            .session_id
            .filter(|id| !id.trim().is_empty())
            .map(SessionToken::new))
    }
}

/// Pick the issuer described by the config.
pub fn provider_from_config(config: &TallyConfig) -> TallydResult<Arc<dyn SessionProvider>> {
    match &config.session_url {
        Some(url) => Ok(Arc::new(HttpSessionProvider::new(
            url,
            Duration::from_secs(10),
        )?)),
        None => Ok(Arc::new(LocalSessionIssuer::new(
            config.registered_account.clone(),
        ))),
    }
}

/// Request a session for `account_id`, retrying communication failures.
pub async fn establish_session(
    provider: &dyn SessionProvider,
    account_id: &str,
    policy: &RetryPolicy,
) -> Session {
    let attempts = policy.max_attempts.max(1);

    for attempt in 0..attempts {
        match provider.issue_session(account_id).await {
            Ok(Some(token)) => {
                info!(account_id = %account_id, session = %token, "Session established");
                return Session::Established(token);
            }
            Ok(None) => {
                error!(account_id = %account_id, "Session issuer rejected account");
                return Session::Unavailable;
            }
            Err(e) => {
                warn!(
                    account_id = %account_id,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    error = %e,
                    "Session request failed"
                );
                if attempt + 1 < attempts {
                    tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                }
            }
        }
    }

    error!(
        account_id = %account_id,
        attempts,
        "Session retries exhausted"
    );
    Session::Unavailable
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_local_issuer_accepts_registered_account() {
        let issuer = LocalSessionIssuer::new("acct");

        let first = issuer.issue_session("acct").await.unwrap().unwrap();
        let second = issuer.issue_session("acct").await.unwrap().unwrap();
        assert_ne!(first, second);
        assert!(uuid::Uuid::parse_str(first.as_str()).is_ok());

        assert!(issuer.issue_session("someone-else").await.unwrap().is_none());
    }

    /// Serve one canned HTTP response and return the base URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_provider_token() {
        let url = serve_once("200 OK", r#"{"session_id":"remote-123"}"#).await;
        let provider = HttpSessionProvider::new(&url, Duration::from_secs(5)).unwrap();

        let token = provider.issue_session("acct").await.unwrap();
        assert_eq!(token, Some(SessionToken::new("remote-123")));
    }

    #[tokio::test]
    async fn test_http_provider_null_session_is_rejection() {
        let url = serve_once("200 OK", r#"{"session_id":null}"#).await;
        let provider = HttpSessionProvider::new(&url, Duration::from_secs(5)).unwrap();

        assert!(provider.issue_session("acct").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_http_provider_forbidden_is_rejection() {
        let url = serve_once("403 Forbidden", "{}").await;
        let provider = HttpSessionProvider::new(&url, Duration::from_secs(5)).unwrap();

        assert!(provider.issue_session("acct").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_http_provider_server_error_is_failure() {
        let url = serve_once("503 Service Unavailable", "{}").await;
        let provider = HttpSessionProvider::new(&url, Duration::from_secs(5)).unwrap();

        let result = provider.issue_session("acct").await;
        assert!(matches!(result, Err(TallydError::Session(_))));
    }

    #[tokio::test]
    async fn test_http_provider_bad_body_is_http_error() {
        let url = serve_once("200 OK", "not json").await;
        let provider = HttpSessionProvider::new(&url, Duration::from_secs(5)).unwrap();

        let result = provider.issue_session("acct").await;
        assert!(matches!(result, Err(TallydError::Http(_))));
    }

    #[test]
    fn test_provider_from_config_picks_issuer() {
        let mut config = TallyConfig::from_lookup("acct".into(), |_| None).unwrap();
        assert!(provider_from_config(&config).is_ok());

        config.session_url = Some("http://issuer.local".into());
        assert!(provider_from_config(&config).is_ok());
    }
}
