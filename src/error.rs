//! Error taxonomy shared by the classifier adapters, the router and the
//! agent session manager.

use thiserror::Error;

/// Errors surfaced by the routing core.
///
/// Only [`ParleyError::UpstreamUnavailable`] is retried. Everything else is
/// either treated as a miss by the router or surfaced to the response
/// assembler as a turn-level failure.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Transport or service failure talking to an external AI service.
    #[error("{service} unavailable: {reason}")]
    UpstreamUnavailable { service: String, reason: String },

    /// The service answered, but the body violates its contract.
    #[error("{service} returned a malformed response: {reason}")]
    MalformedResponse { service: String, reason: String },

    /// The agent could not complete a turn within the retry budget.
    #[error("agent invocation failed after {attempts} attempt(s): {reason}")]
    AgentInvocationFailed { attempts: u32, reason: String },

    /// Missing or invalid configuration detected at start-up.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ParleyError {
    pub fn upstream(service: &str, reason: impl ToString) -> Self {
        Self::UpstreamUnavailable {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(service: &str, reason: impl ToString) -> Self {
        Self::MalformedResponse {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Map a non-success HTTP status. Timeouts, throttling and server errors
    /// are transient; anything else means the request or response contract
    /// is broken.
    pub fn from_status(service: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let reason = format!(
            "HTTP {status}: {}",
            crate::providers::sanitize_api_error(body)
        );
        if status.is_server_error()
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
        {
            Self::upstream(service, reason)
        } else {
            Self::malformed(service, reason)
        }
    }

    /// Whether the caller may retry the operation that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. })
    }
}

impl From<reqwest::Error> for ParleyError {
    fn from(e: reqwest::Error) -> Self {
        // A body we cannot decode is a contract violation, not an outage.
        if e.is_decode() {
            Self::malformed("http", e)
        } else {
            Self::upstream("http", e)
        }
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;
