//! Shared HTTP client configuration and response helpers.

use std::sync::OnceLock;
use std::time::Duration;

use thiserror::Error;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("modelbay/", env!("CARGO_PKG_VERSION"));

/// Failures while issuing a request.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("GET {url} failed: HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("GET {url} failed: {message}")]
    Transport { url: String, message: String },
}

/// Return a shared HTTP agent with consistent timeouts.
pub(crate) fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .timeout_write(WRITE_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
    })
}

/// Issue a GET and turn error statuses into [`HttpError::Status`].
pub(crate) fn get(url: &str) -> Result<ureq::Response, HttpError> {
    match agent().get(url).call() {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(status, _)) => Err(HttpError::Status {
            url: url.to_string(),
            status,
        }),
        Err(ureq::Error::Transport(transport)) => Err(HttpError::Transport {
            url: url.to_string(),
            message: transport.to_string(),
        }),
    }
}

/// Body length announced by the server, if any.
pub(crate) fn content_length(response: &ureq::Response) -> Option<u64> {
    response
        .header("Content-Length")
        .and_then(|value| value.trim().parse::<u64>().ok())
}
