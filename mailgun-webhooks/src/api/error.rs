//! Errors returned by the webhooks API client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The configured base URL, domain or webhook kind did not form a valid URL
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// Transport failure (connect, TLS, timeout, body read)
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Mailgun answered with a non-2xx status
    #[error("unexpected response status {status} from {url}: {body}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        body: String,
    },

    /// The response body did not match the expected envelope
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status for `UnexpectedStatus`, `None` otherwise.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
