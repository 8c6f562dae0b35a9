//! Unified session-engine error model.
//! Every failure the engine can surface to a UI collaborator is a `SessionError` carrying a stable,
//! enumerable `ErrorReason` so it can be rendered without parsing free-text messages.

use serde::Serialize;
use thiserror::Error;

use crate::session::SessionPhase;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SessionError {
    /// The identity provider failed to initialize (missing configuration, broken SDK).
    #[error("identity provider unavailable: {message}")]
    ProviderUnavailable { message: String },
    /// The profile service kept rejecting the credential after one forced rotation.
    #[error("credential rejected: {message}")]
    CredentialInvalid { message: String },
    /// A 409 on role assignment that did not carry the winning profile.
    #[error("role assignment conflict: {message}")]
    ProfileConflict { message: String },
    #[error("{operation} timed out")]
    TimedOut { operation: String },
    #[error("network error: {message}")]
    Network { message: String },
    #[error("profile service returned HTTP {status}: {message}")]
    Server { status: u16, message: String },
    #[error("malformed profile service response: {message}")]
    InvalidResponse { message: String },
    /// Role selection requested while the session is in a phase that does not allow it.
    #[error("role selection is not available while the session is {phase}")]
    NotReady { phase: SessionPhase },
    #[error("invalid configuration: {message}")]
    Config { message: String },
}

/// Stable reason codes, one per `SessionError` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    ProviderUnavailable,
    CredentialInvalid,
    ProfileConflict,
    TimedOut,
    Network,
    Server,
    InvalidResponse,
    NotReady,
    Config,
}

impl ErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::ProviderUnavailable => "provider_unavailable",
            ErrorReason::CredentialInvalid => "credential_invalid",
            ErrorReason::ProfileConflict => "profile_conflict",
            ErrorReason::TimedOut => "timed_out",
            ErrorReason::Network => "network",
            ErrorReason::Server => "server",
            ErrorReason::InvalidResponse => "invalid_response",
            ErrorReason::NotReady => "not_ready",
            ErrorReason::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SessionError {
    pub fn reason(&self) -> ErrorReason {
        match self {
            SessionError::ProviderUnavailable { .. } => ErrorReason::ProviderUnavailable,
            SessionError::CredentialInvalid { .. } => ErrorReason::CredentialInvalid,
            SessionError::ProfileConflict { .. } => ErrorReason::ProfileConflict,
            SessionError::TimedOut { .. } => ErrorReason::TimedOut,
            SessionError::Network { .. } => ErrorReason::Network,
            SessionError::Server { .. } => ErrorReason::Server,
            SessionError::InvalidResponse { .. } => ErrorReason::InvalidResponse,
            SessionError::NotReady { .. } => ErrorReason::NotReady,
            SessionError::Config { .. } => ErrorReason::Config,
        }
    }

    /// True for failures a user may reasonably retry by hand (the engine itself never does).
    pub fn is_transient(&self) -> bool {
        match self {
            SessionError::TimedOut { .. } | SessionError::Network { .. } => true,
            SessionError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn provider_unavailable<S: Into<String>>(msg: S) -> Self { SessionError::ProviderUnavailable { message: msg.into() } }
    pub fn credential_invalid<S: Into<String>>(msg: S) -> Self { SessionError::CredentialInvalid { message: msg.into() } }
    pub fn conflict<S: Into<String>>(msg: S) -> Self { SessionError::ProfileConflict { message: msg.into() } }
    pub fn timed_out<S: Into<String>>(operation: S) -> Self { SessionError::TimedOut { operation: operation.into() } }
    pub fn network<S: Into<String>>(msg: S) -> Self { SessionError::Network { message: msg.into() } }
    pub fn server<S: Into<String>>(status: u16, msg: S) -> Self { SessionError::Server { status, message: msg.into() } }
    pub fn invalid_response<S: Into<String>>(msg: S) -> Self { SessionError::InvalidResponse { message: msg.into() } }
    pub fn config<S: Into<String>>(msg: S) -> Self { SessionError::Config { message: msg.into() } }
}

pub type SessionResult<T> = Result<T, SessionError>;

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return SessionError::timed_out("profile service request");
        }
        if err.is_decode() {
            return SessionError::invalid_response(err.to_string());
        }
        SessionError::network(err.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::invalid_response(err.to_string())
    }
}
