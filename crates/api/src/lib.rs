//! Storage service transport and GraphQL executor.
//!
//! This crate provides the network half of the ertdata client:
//!
//! - [`HttpTransport`], the seam every request goes through, and
//!   [`ReqwestTransport`], its reqwest-backed implementation
//! - [`http_get`] / [`http_post`], which attach the `Token` header and turn
//!   non-200 responses into [`TransportError`]
//! - [`run_query`], which posts a GraphQL document to `{base_url}/gql` and
//!   unwraps the `data` envelope
//!
//! # Example
//!
//! ```ignore
//! use ertdata_api::{ReqwestTransport, queries, run_query};
//! use ertdata_types::ConnectionKey;
//!
//! async fn list(key: &ConnectionKey) -> anyhow::Result<serde_json::Value> {
//!     let transport = ReqwestTransport::new("ertdata/0.1", None)?;
//!     Ok(run_query(&transport, key, queries::GET_ALL_ENSEMBLES, serde_json::json!({})).await?)
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use tracing::debug;

mod error;
mod graphql;
pub mod queries;
mod transport;

pub use error::{QueryError, TransportError};
pub use graphql::{GRAPHQL_PATH, run_query};
pub use transport::{HttpRequest, HttpTransport, RawResponse, TOKEN_HEADER, encode_path_segment, http_get, http_post};

/// Thin wrapper around a configured `reqwest::Client`.
///
/// The client carries only a User-Agent default header. No timeout is set
/// unless one is passed in, so reqwest's defaults apply.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut default_headers = header::HeaderMap::new();
        if let Ok(value) = header::HeaderValue::from_str(user_agent) {
            default_headers.insert(header::USER_AGENT, value);
        }

        let mut builder = Client::builder().default_headers(default_headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(TransportError::Client)?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<RawResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            headers,
            query,
            json,
        } = request;
        debug!(%method, %url, "sending request");

        let mut builder = self.http.request(method, &url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(body) = &json {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|source| TransportError::Network {
            url: url.clone(),
            source,
        })?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|source| TransportError::Network { url, source })?;

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ertdata_types::ConnectionKey;
    use wiremock::matchers::{header as header_matcher, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_sends_token_accept_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ensembles/e1/records/PORO"))
            .and(header_matcher("Token", "secret"))
            .and(header_matcher("accept", "application/x-parquet"))
            .and(header_matcher("user-agent", "ertdata-test"))
            .and(query_param("label", "region1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/x-parquet")
                    .set_body_bytes(vec![1_u8, 2, 3]),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new("ertdata-test", None).unwrap();
        let key = ConnectionKey::new(server.uri(), Some("secret".into()));
        let response = http_get(
            &transport,
            &key,
            "ensembles/e1/records/PORO",
            &[("accept", "application/x-parquet")],
            &[("label".to_string(), "region1".to_string())],
        )
        .await
        .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.content_type.as_deref(), Some("application/x-parquet"));
        assert_eq!(response.body.as_ref(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn not_found_surfaces_as_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ensembles/missing/userdata"))
            .respond_with(ResponseTemplate::new(404).set_body_string("{\"detail\":\"Not Found\"}"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new("ertdata-test", None).unwrap();
        let key = ConnectionKey::new(server.uri(), None);
        let error = http_get(&transport, &key, "ensembles/missing/userdata", &[], &[])
            .await
            .unwrap_err();

        assert_eq!(error.status(), Some(404));
        assert!(error.to_string().contains("Not Found"));
    }
}
