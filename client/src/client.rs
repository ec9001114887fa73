//! Livy control-plane client implementation

use fabric_livy_auth::CredentialProvider;
use fabric_livy_core::config::FabricSparkConfig;
use fabric_livy_core::error::{LivyError, Result};
use fabric_livy_core::session::{SessionId, SessionInfo, SessionRequest, id_to_string};
use fabric_livy_core::statement::{StatementId, StatementInfo, StatementRequest};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Client for one lakehouse's Livy API.
///
/// Cheap to clone; clones share the HTTP connection pool and the token cache.
#[derive(Clone)]
pub struct LivyClient {
    client: Client,
    base_url: String,
    credentials: Arc<CredentialProvider>,
}

impl LivyClient {
    /// Create a client rooted at `base_url` (the versioned Livy API root).
    #[must_use]
    pub fn new(base_url: impl Into<String>, credentials: Arc<CredentialProvider>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// Create a client for the lakehouse named in `config`.
    #[must_use]
    pub fn from_config(config: &FabricSparkConfig, credentials: Arc<CredentialProvider>) -> Self {
        Self::new(config.lakehouse_endpoint(), credentials)
    }

    /// Use a preconfigured `reqwest` client (proxies, timeouts).
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// The Livy API root.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The shared token cache.
    #[must_use]
    pub const fn credentials(&self) -> &Arc<CredentialProvider> {
        &self.credentials
    }

    /// Create a session and return its id.
    ///
    /// Returns as soon as the control plane has accepted the request; the
    /// session is usually still starting.
    ///
    /// # Errors
    ///
    /// - [`LivyError::InvalidResponse`] if no response was obtained at all
    /// - [`LivyError::Authentication`] if the token was rejected
    /// - [`LivyError::MissingSessionId`] if the body carries no `id`
    /// - [`LivyError::EndOfInput`] if the body was cut short
    pub async fn create_session(&self, request: &SessionRequest) -> Result<SessionId> {
        let url = format!("{}/sessions", self.base_url);
        let response = match self.send(|headers| self.client.post(&url).headers(headers).json(request)).await {
            Ok(response) => response,
            Err(err @ LivyError::Authentication(_)) => return Err(err),
            Err(err) => {
                tracing::error!(error = %err, "Session creation request failed");
                return Err(LivyError::InvalidResponse(err.to_string()));
            }
        };

        let status = response.status();
        if status == StatusCode::OK {
            tracing::debug!(name = request.name(), "Initiated Livy session");
        } else if !status.is_success() {
            tracing::error!(%status, "Session creation returned an HTTP error");
        }
        reject_unauthorized(status, &response)?;

        let body = response.text().await.map_err(|e| LivyError::InvalidResponse(e.to_string()))?;
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| LivyError::from_json(&e))?;
        value
            .get("id")
            .and_then(id_to_string)
            .map(SessionId::new)
            .ok_or_else(|| LivyError::MissingSessionId(format!("status {status}, body {body}")))
    }

    /// Current state of a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is not a success,
    /// or the body is not a session resource.
    pub async fn get_session(&self, id: &SessionId) -> Result<SessionInfo> {
        let url = format!("{}/sessions/{id}", self.base_url);
        let response = self.send(|headers| self.client.get(&url).headers(headers)).await?;
        decode(check(response).await?).await
    }

    /// Delete a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is not a success.
    pub async fn delete_session(&self, id: &SessionId) -> Result<()> {
        let url = format!("{}/sessions/{id}", self.base_url);
        let response = self.send(|headers| self.client.delete(&url).headers(headers)).await?;
        check(response).await?;
        Ok(())
    }

    /// Submit a statement and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is not a success,
    /// or the body carries no `id`.
    pub async fn submit_statement(
        &self,
        session_id: &SessionId,
        request: &StatementRequest,
    ) -> Result<StatementId> {
        let url = format!("{}/sessions/{session_id}/statements", self.base_url);
        let response = self
            .send(|headers| self.client.post(&url).headers(headers).json(request))
            .await?;
        let value: serde_json::Value = decode(check(response).await?).await?;
        value
            .get("id")
            .and_then(StatementId::from_json)
            .ok_or_else(|| LivyError::InvalidResponse(format!("statement response without id: {value}")))
    }

    /// Current state (and output, once available) of a statement.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the status is not a success,
    /// or the body is not a statement resource.
    pub async fn get_statement(
        &self,
        session_id: &SessionId,
        statement_id: &StatementId,
    ) -> Result<StatementInfo> {
        let url = format!(
            "{}/sessions/{session_id}/statements/{statement_id}",
            self.base_url
        );
        let response = self.send(|headers| self.client.get(&url).headers(headers)).await?;
        decode(check(response).await?).await
    }

    async fn headers(&self, force_refresh: bool) -> Result<HeaderMap> {
        let mut headers = self.credentials.get_auth_header(force_refresh).await?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Send a request, retrying once with a fresh token if the cached one
    /// is rejected.
    async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(HeaderMap) -> RequestBuilder,
    {
        let response = build(self.headers(false).await?)
            .send()
            .await
            .map_err(request_error)?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        tracing::debug!("Access token rejected, retrying with a fresh token");
        build(self.headers(true).await?)
            .send()
            .await
            .map_err(request_error)
    }
}

impl std::fmt::Debug for LivyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivyClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

fn request_error(err: reqwest::Error) -> LivyError {
    if err.is_timeout() {
        LivyError::Request(format!("timeout: {err}"))
    } else {
        LivyError::Request(err.to_string())
    }
}

fn reject_unauthorized(status: StatusCode, response: &Response) -> Result<()> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(LivyError::Authentication(format!(
            "{} rejected the access token ({status})",
            response.url()
        ))),
        _ => Ok(()),
    }
}

/// Map non-success statuses to errors.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    reject_unauthorized(status, &response)?;
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(LivyError::Http {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response
        .text()
        .await
        .map_err(|e| LivyError::Request(e.to_string()))?;
    serde_json::from_str(&body).map_err(|e| LivyError::from_json(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_livy_auth::mocks::MockTokenSource;
    use fabric_livy_core::SystemClock;
    use fabric_livy_core::session::{SessionConfig, SessionState};
    use fabric_livy_core::statement::StatementState;
    use fabric_livy_core::ErrorKind;
    use fabric_livy_testing::{fixtures, routes};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> (LivyClient, MockTokenSource) {
        let source = MockTokenSource::new();
        let credentials = Arc::new(CredentialProvider::new(
            Arc::new(source.clone()),
            Arc::new(SystemClock),
        ));
        let config = fixtures::test_config(&server.uri());
        (LivyClient::from_config(&config, credentials), source)
    }

    fn request() -> SessionRequest {
        SessionRequest::new(SessionConfig::named("dbt-fabricspark")).unwrap()
    }

    #[tokio::test]
    async fn create_session_posts_config_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(routes::sessions()))
            .and(header("authorization", "Bearer token-1"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({"name": "dbt-fabricspark"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::session_created("abc")))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = client(&server);
        let id = client.create_session(&request()).await.unwrap();
        assert_eq!(id.as_str(), "abc");
    }

    #[tokio::test]
    async fn create_session_without_id_is_missing_session_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(routes::sessions()))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({"errorCode": "InvalidRequest"})),
            )
            .mount(&server)
            .await;

        let (client, _) = client(&server);
        let err = client.create_session(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingSessionId);
        assert!(err.to_string().contains("InvalidRequest"));
    }

    #[tokio::test]
    async fn create_session_with_truncated_body_is_end_of_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(routes::sessions()))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;

        let (client, _) = client(&server);
        let err = client.create_session(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EndOfInput);
    }

    #[tokio::test]
    async fn create_session_without_server_is_invalid_response() {
        let server = MockServer::start().await;
        let uri = server.uri();
        drop(server);

        let credentials = Arc::new(CredentialProvider::new(
            Arc::new(MockTokenSource::new()),
            Arc::new(SystemClock),
        ));
        let client = LivyClient::from_config(&fixtures::test_config(&uri), credentials);
        let err = client.create_session(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }

    #[tokio::test]
    async fn rejected_token_is_refreshed_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(routes::session("abc")))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(routes::session("abc")))
            .and(header("authorization", "Bearer token-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::session("abc", "idle")))
            .mount(&server)
            .await;

        let (client, source) = client(&server);
        let info = client.get_session(&SessionId::new("abc")).await.unwrap();
        assert_eq!(info.liveness(), &SessionState::Idle);
        assert_eq!(source.issued(), 2);
    }

    #[tokio::test]
    async fn persistent_unauthorized_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let (client, _) = client(&server);
        let err = client.get_session(&SessionId::new("abc")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn throttling_surfaces_as_transient_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Request is throttled"))
            .mount(&server)
            .await;

        let (client, _) = client(&server);
        let err = client.get_session(&SessionId::new("abc")).await.unwrap_err();
        assert!(matches!(err, LivyError::Http { status: 429, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn statement_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(routes::statements("abc")))
            .and(body_json(serde_json::json!({"code": "select 1 as id", "kind": "sql"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(fixtures::statement_submitted(0)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(routes::statement("abc", 0)))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::statement_rows(
                0,
                &[("id", "integer")],
                &serde_json::json!([[1]]),
            )))
            .mount(&server)
            .await;

        let (client, _) = client(&server);
        let session = SessionId::new("abc");
        let statement = client
            .submit_statement(&session, &StatementRequest::sql("select 1 as id"))
            .await
            .unwrap();
        assert_eq!(statement.as_str(), "0");

        let info = client.get_statement(&session, &statement).await.unwrap();
        assert_eq!(info.state, StatementState::Available);
        let rows = info.output.unwrap().result_set().unwrap().rows;
        assert_eq!(rows, vec![vec![serde_json::json!(1)]]);
    }

    #[tokio::test]
    async fn delete_session_reports_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(routes::session("gone")))
            .respond_with(ResponseTemplate::new(404).set_body_string("session not found"))
            .mount(&server)
            .await;

        let (client, _) = client(&server);
        let err = client.delete_session(&SessionId::new("gone")).await.unwrap_err();
        assert!(matches!(err, LivyError::Http { status: 404, .. }));
    }
}
