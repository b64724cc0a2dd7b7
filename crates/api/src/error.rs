//! Error types for storage transport and GraphQL execution.

use thiserror::Error;

/// Failure of a single HTTP exchange with the storage service.
///
/// Network failures and non-200 responses share this type, so a caller
/// cannot tell "not found" from "server error" without reading the message.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request never produced a response (connection refused, DNS, body read).
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a status other than 200.
    #[error("error fetching data from {url}: the request returned with status code {status}: {}", preview(.body, 500))]
    Status { url: String, status: u16, body: String },
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure of a GraphQL query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Transport(TransportError),

    /// Non-200 status or a body that is not JSON.
    #[error("storage query returned with '{status}':\n{payload}")]
    Rejected { status: u16, payload: String },

    /// The response envelope carried no `data` field.
    #[error("storage query response has no `data` field: {}", preview(.payload, 500))]
    MissingData { payload: String },
}

/// Collapse whitespace and cut `text` down to roughly `limit` bytes for log output.
pub(crate) fn preview(text: &str, limit: usize) -> String {
    if text.trim().is_empty() {
        return "<empty>".to_string();
    }

    let mut preview = String::new();
    for ch in text.chars() {
        if preview.len() >= limit {
            preview.push_str("...");
            break;
        }
        match ch {
            '\n' | '\r' | '\t' => {
                if !preview.ends_with(' ') {
                    preview.push(' ');
                }
            }
            _ => preview.push(ch),
        }
    }

    preview.trim().to_string()
}
