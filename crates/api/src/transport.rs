//! Raw HTTP exchanges with the storage service.
//!
//! [`HttpTransport`] is the seam between the client and the network: the
//! production implementation is [`crate::ReqwestTransport`], tests substitute
//! scripted transports. A transport only fails on network errors; the
//! [`http_get`] and [`http_post`] helpers add the auth header and turn any
//! status other than 200 into [`TransportError::Status`].

use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use ertdata_types::ConnectionKey;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use crate::TransportError;

/// Header carrying the storage auth token.
pub const TOKEN_HEADER: &str = "Token";

/// Characters escaped when an identifier is placed in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// A fully resolved request.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub json: Option<Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            json: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            json: Some(body),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Status, content type and body of a response.
#[derive(Clone, Debug, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Executes requests against the network.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request` and return whatever the server answered.
    ///
    /// Implementations fail only when no response was received.
    async fn execute(&self, request: HttpRequest) -> Result<RawResponse, TransportError>;
}

/// Percent-encode an identifier for use as one URL path segment.
pub fn encode_path_segment(raw: &str) -> String {
    utf8_percent_encode(raw, PATH_SEGMENT).to_string()
}

/// GET `{base_url}/{path}` with the connection's token.
///
/// `headers` are sent alongside the token header; the token wins when both
/// name `Token`.
pub async fn http_get(
    transport: &dyn HttpTransport,
    key: &ConnectionKey,
    path: &str,
    headers: &[(&str, &str)],
    query: &[(String, String)],
) -> Result<RawResponse, TransportError> {
    let mut request = HttpRequest::get(key.endpoint(path));
    request.headers = merge_headers(key, headers);
    request.query = query.to_vec();
    send_expecting_ok(transport, request).await
}

/// POST a JSON body to `{base_url}/{path}` with the connection's token.
pub async fn http_post(
    transport: &dyn HttpTransport,
    key: &ConnectionKey,
    path: &str,
    body: Value,
) -> Result<RawResponse, TransportError> {
    let mut request = HttpRequest::post_json(key.endpoint(path), body);
    request.headers = merge_headers(key, &[]);
    send_expecting_ok(transport, request).await
}

fn merge_headers(key: &ConnectionKey, headers: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case(TOKEN_HEADER))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
    if let Some(token) = key.token() {
        merged.push((TOKEN_HEADER.to_string(), token.to_string()));
    }
    merged
}

async fn send_expecting_ok(transport: &dyn HttpTransport, request: HttpRequest) -> Result<RawResponse, TransportError> {
    let start = Instant::now();
    let method = request.method.clone();
    let url = request.url.clone();
    debug!(
        method = %method,
        url = %url,
        query_parameter_count = request.query.len(),
        "storage request started"
    );

    let response = transport.execute(request).await.inspect_err(|error| {
        warn!(
            method = %method,
            url = %url,
            error = %error,
            duration_ms = start.elapsed().as_millis(),
            "storage request failed"
        );
    })?;

    if response.status != 200 {
        warn!(
            method = %method,
            url = %url,
            status = response.status,
            duration_ms = start.elapsed().as_millis(),
            "storage request returned non-200 status"
        );
        return Err(TransportError::Status {
            url,
            status: response.status,
            body: response.text_lossy(),
        });
    }

    debug!(
        method = %method,
        url = %url,
        status = response.status,
        body_len = response.body.len(),
        duration_ms = start.elapsed().as_millis(),
        "storage request completed"
    );
    Ok(response)
}
