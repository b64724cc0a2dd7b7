//! Shared types for the ertdata storage client.
//!
//! The crate holds the records exchanged with the experiment storage service
//! ([`Ensemble`], [`Experiment`], [`EnsembleOutline`]), the connection identity
//! used to key clients ([`ConnectionInfo`], [`ConnectionKey`]) and the
//! in-memory table produced by the decode pipeline ([`Frame`]).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

mod ensemble;
mod frame;

pub use ensemble::{Ensemble, EnsembleOutline, EnsembleSummary, Experiment, ExperimentRef, RecordRef};
pub use frame::{Cell, Frame, FrameShapeError, Label};

/// Error returned when a storage base URL cannot be used.
#[derive(Debug, Error)]
pub enum InvalidBaseUrl {
    #[error("invalid storage base URL '{url}': {source}")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("storage base URL '{url}' must use http or https, got '{scheme}'")]
    Scheme { url: String, scheme: String },
}

/// Connection parameters supplied by a project/session provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub base_url: String,
    pub token: Option<String>,
}

impl ConnectionInfo {
    /// Build connection info after checking that `base_url` is an absolute
    /// http(s) URL.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, InvalidBaseUrl> {
        let base_url = base_url.into();
        let parsed = Url::parse(&base_url).map_err(|source| InvalidBaseUrl::Parse {
            url: base_url.clone(),
            source,
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(InvalidBaseUrl::Scheme {
                scheme: parsed.scheme().to_string(),
                url: base_url,
            });
        }
        Ok(Self { base_url, token })
    }

    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::new(self.base_url.clone(), self.token.clone())
    }
}

/// Identity of one backend connection: the base URL plus an optional token.
///
/// Two keys are equal only when both parts are equal, so the same server
/// reached with different tokens gets separate clients.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    base_url: String,
    token: Option<String>,
}

impl ConnectionKey {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Join an API-relative path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

// Tokens stay out of logs and panic messages.
impl fmt::Debug for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionKey")
            .field("base_url", &self.base_url)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl From<ConnectionInfo> for ConnectionKey {
    fn from(info: ConnectionInfo) -> Self {
        Self::new(info.base_url, info.token)
    }
}
