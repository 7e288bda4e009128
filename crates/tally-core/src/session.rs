//! Session identity of a running instance.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque session identifier issued once per instance.
///
/// Every published value is tagged with it so downstream consumers can
/// attribute reports to a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of session establishment at startup.
///
/// Never changes after construction. An `Unavailable` session marks the
/// instance as permanently degraded until the process is restarted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Established(SessionToken),
    Unavailable,
}

impl Session {
    pub fn token(&self) -> Option<&SessionToken> {
        match self {
            Session::Established(token) => Some(token),
            Session::Unavailable => None,
        }
    }

    pub fn status(&self) -> ServiceStatus {
        match self {
            Session::Established(_) => ServiceStatus::Ready,
            Session::Unavailable => ServiceStatus::Degraded,
        }
    }
}

impl From<Option<SessionToken>> for Session {
    fn from(token: Option<SessionToken>) -> Self {
        token.map_or(Session::Unavailable, Session::Established)
    }
}

/// Externally observable health of the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// A session exists; every command can be legal.
    Ready,
    /// No session; start and reports always fail closed.
    Degraded,
}

impl ServiceStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ServiceStatus::Degraded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_option() {
        let session = Session::from(Some(SessionToken::new("abc")));
        assert_eq!(session.token().map(SessionToken::as_str), Some("abc"));
        assert_eq!(session.status(), ServiceStatus::Ready);

        let session = Session::from(None);
        assert!(session.token().is_none());
        assert!(session.status().is_degraded());
    }

    #[test]
    fn test_token_serializes_transparently() {
        let json = serde_json::to_string(&SessionToken::new("t-1")).unwrap();
        assert_eq!(json, "\"t-1\"");
    }
}
