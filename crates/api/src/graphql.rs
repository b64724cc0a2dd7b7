//! GraphQL execution against the storage `/gql` endpoint.

use ertdata_types::ConnectionKey;
use serde_json::{Value, json};
use tracing::debug;

use crate::transport::{HttpTransport, http_post};
use crate::{QueryError, TransportError};

/// Path of the GraphQL endpoint relative to the base URL.
pub const GRAPHQL_PATH: &str = "gql";

/// Run `query` with `variables` and return the `data` member of the envelope.
///
/// A non-200 status or a body that is not JSON yields
/// [`QueryError::Rejected`] carrying the status and a readable rendering of
/// the payload. A populated `errors` member is not inspected; whatever
/// `data` holds is returned.
pub async fn run_query(
    transport: &dyn HttpTransport,
    key: &ConnectionKey,
    query: &str,
    variables: Value,
) -> Result<Value, QueryError> {
    let envelope = json!({
        "query": query,
        "variables": variables,
    });

    let response = match http_post(transport, key, GRAPHQL_PATH, envelope).await {
        Ok(response) => response,
        Err(TransportError::Status { status, body, .. }) => {
            return Err(QueryError::Rejected {
                status,
                payload: render_payload(body.as_bytes()),
            });
        }
        Err(error) => return Err(QueryError::Transport(error)),
    };

    let document: Value = serde_json::from_slice(&response.body).map_err(|_| QueryError::Rejected {
        status: response.status,
        payload: render_payload(&response.body),
    })?;

    match document {
        Value::Object(mut envelope) => match envelope.remove("data") {
            Some(data) => {
                debug!(
                    has_errors = envelope.get("errors").is_some_and(|errors| !errors.is_null()),
                    "storage query completed"
                );
                Ok(data)
            }
            None => Err(QueryError::MissingData {
                payload: Value::Object(envelope).to_string(),
            }),
        },
        other => Err(QueryError::MissingData {
            payload: other.to_string(),
        }),
    }
}

/// Pretty-print a JSON payload, or fall back to its lossy text.
fn render_payload(body: &[u8]) -> String {
    match serde_json::from_slice::<Value>(body) {
        Ok(document) => serde_json::to_string_pretty(&document).unwrap_or_else(|_| document.to_string()),
        Err(_) => format!("{:?}", String::from_utf8_lossy(body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReqwestTransport;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn key_for(server: &MockServer) -> ConnectionKey {
        ConnectionKey::new(server.uri(), Some("secret".into()))
    }

    #[tokio::test]
    async fn returns_data_member() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gql"))
            .and(header("Token", "secret"))
            .and(body_json(json!({"query": "query { experiments { name } }", "variables": {}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"experiments": []}})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new("ertdata-test", None).unwrap();
        let data = run_query(&transport, &key_for(&server), "query { experiments { name } }", json!({}))
            .await
            .unwrap();

        assert_eq!(data, json!({"experiments": []}));
    }

    #[tokio::test]
    async fn server_error_reports_status_and_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gql"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "boom"})))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new("ertdata-test", None).unwrap();
        let error = run_query(&transport, &key_for(&server), "query { x }", json!({}))
            .await
            .unwrap_err();

        let message = error.to_string();
        assert!(matches!(error, QueryError::Rejected { status: 500, .. }));
        assert!(message.contains("'500'"), "{message}");
        assert!(message.contains("\"detail\": \"boom\""), "{message}");
    }

    #[tokio::test]
    async fn non_json_body_is_rejected_even_with_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gql"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new("ertdata-test", None).unwrap();
        let error = run_query(&transport, &key_for(&server), "query { x }", json!({}))
            .await
            .unwrap_err();

        match error {
            QueryError::Rejected { status, payload } => {
                assert_eq!(status, 200);
                assert!(payload.contains("<html>gateway</html>"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn envelope_without_data_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"errors": [{"message": "bad"}]})))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new("ertdata-test", None).unwrap();
        let error = run_query(&transport, &key_for(&server), "query { x }", json!({}))
            .await
            .unwrap_err();

        assert!(matches!(error, QueryError::MissingData { .. }));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let transport = ReqwestTransport::new("ertdata-test", None).unwrap();
        let key = ConnectionKey::new("http://127.0.0.1:9", None);

        let error = run_query(&transport, &key, "query { x }", json!({})).await.unwrap_err();

        assert!(matches!(error, QueryError::Transport(TransportError::Network { .. })));
    }
}
