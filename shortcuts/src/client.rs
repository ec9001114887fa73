//! Shortcut REST client and provisioner.

use crate::shortcut::{Shortcut, load_shortcuts};
use fabric_livy_core::config::{FabricSparkConfig, ShortcutSource};
use fabric_livy_core::environment::Sleeper;
use fabric_livy_core::error::{LivyError, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Default attempts per shortcut.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Default wait between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Client for the shortcut collection of one lakehouse.
#[derive(Clone)]
pub struct ShortcutClient {
    client: Client,
    token: String,
    endpoint: String,
    workspace_id: String,
    item_id: String,
}

#[derive(Deserialize)]
struct ExistingShortcut {
    path: String,
    name: String,
    #[serde(default)]
    target: serde_json::Value,
}

impl ShortcutClient {
    /// Client acting with `token` on item `item_id` of workspace
    /// `workspace_id`.
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        endpoint: impl Into<String>,
        workspace_id: impl Into<String>,
        item_id: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            workspace_id: workspace_id.into(),
            item_id: item_id.into(),
        }
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/workspaces/{}/items/{}/shortcuts",
            self.endpoint, self.workspace_id, self.item_id
        )
    }

    fn shortcut_url(&self, path: &str, name: &str) -> String {
        format!("{}/{}/{name}", self.collection_url(), path.trim_matches('/'))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
    }

    /// Whether `shortcut` already exists with the desired target.
    ///
    /// An existing shortcut with a different target is deleted and reported
    /// as absent, so the caller recreates it.
    ///
    /// # Errors
    ///
    /// Returns an error for any response other than success or 404, or if
    /// the stale shortcut cannot be deleted.
    pub async fn check_exists(&self, shortcut: &Shortcut) -> Result<bool> {
        let response = self
            .authorized(self.client.get(self.shortcut_url(&shortcut.path, &shortcut.name)))
            .send()
            .await
            .map_err(|e| LivyError::Request(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let existing: ExistingShortcut = check(response)
            .await?
            .json()
            .await
            .map_err(|e| LivyError::InvalidResponse(e.to_string()))?;

        if shortcut.target.matches(&existing.target) {
            return Ok(true);
        }
        tracing::debug!(
            shortcut = %shortcut,
            "Shortcut exists with a different target; deleting and recreating"
        );
        self.delete_shortcut(&existing.path, &existing.name).await?;
        Ok(false)
    }

    /// Delete the shortcut `name` in folder `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is not a success.
    pub async fn delete_shortcut(&self, path: &str, name: &str) -> Result<()> {
        tracing::debug!(
            path,
            name,
            workspace_id = %self.workspace_id,
            item_id = %self.item_id,
            "Deleting shortcut"
        );
        let response = self
            .authorized(self.client.delete(self.shortcut_url(path, name)))
            .send()
            .await
            .map_err(|e| LivyError::Request(e.to_string()))?;
        check(response).await?;
        Ok(())
    }

    /// Create `shortcut` unless an identical one already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the existence check, a stale-shortcut deletion or
    /// the creation request fails.
    pub async fn create_shortcut(&self, shortcut: &Shortcut) -> Result<()> {
        if self.check_exists(shortcut).await? {
            tracing::debug!(shortcut = %shortcut, "Shortcut already exists, skipping");
            return Ok(());
        }
        let response = self
            .authorized(self.client.post(self.collection_url()))
            .json(&shortcut.create_body())
            .send()
            .await
            .map_err(|e| LivyError::Request(e.to_string()))?;
        check(response).await?;
        tracing::info!(shortcut = %shortcut, "Shortcut created");
        Ok(())
    }

    /// Create every shortcut, making up to `max_attempts` attempts each and
    /// waiting `delay` between attempts.
    ///
    /// # Errors
    ///
    /// Returns [`LivyError::ShortcutProvisioning`] for the first shortcut
    /// that still fails after all attempts.
    pub async fn create_shortcuts(
        &self,
        shortcuts: &[Shortcut],
        max_attempts: usize,
        delay: Duration,
        sleeper: &dyn Sleeper,
    ) -> Result<()> {
        let max_attempts = max_attempts.max(1);
        for shortcut in shortcuts {
            tracing::debug!(shortcut = %shortcut, "Creating shortcut");
            let mut attempt = 1;
            loop {
                match self.create_shortcut(shortcut).await {
                    Ok(()) => break,
                    Err(err) if attempt < max_attempts => {
                        tracing::warn!(
                            shortcut = %shortcut,
                            attempt,
                            max_attempts,
                            error = %err,
                            "Failed to create shortcut, retrying"
                        );
                        sleeper.sleep(delay).await;
                        attempt += 1;
                    }
                    Err(err) => {
                        tracing::error!(shortcut = %shortcut, attempts = attempt, error = %err, "Giving up on shortcut");
                        return Err(LivyError::ShortcutProvisioning {
                            shortcut: shortcut.to_string(),
                            attempts: attempt,
                            message: err.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ShortcutClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShortcutClient")
            .field("endpoint", &self.endpoint)
            .field("workspace_id", &self.workspace_id)
            .field("item_id", &self.item_id)
            .finish_non_exhaustive()
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    match status {
        s if s.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(LivyError::Authentication(format!(
            "shortcut API rejected the access token ({status})"
        ))),
        _ => {
            let message = response.text().await.unwrap_or_default();
            Err(LivyError::Http {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Validated shortcut set plus where and how to provision it.
///
/// Built from configuration before any session exists; the definitions are
/// parsed and validated at that point.
#[derive(Debug, Clone)]
pub struct ShortcutProvisioner {
    shortcuts: Arc<[Shortcut]>,
    endpoint: String,
    workspace_id: String,
    item_id: String,
    max_attempts: usize,
    retry_delay: Duration,
}

impl ShortcutProvisioner {
    /// Provisioner for the lakehouse in `config`, or `None` when shortcut
    /// creation is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`LivyError::Configuration`] when creation is enabled without
    /// a definitions source, and [`LivyError::Validation`] when a definition
    /// is invalid.
    pub fn from_config(config: &FabricSparkConfig) -> Result<Option<Self>> {
        if !config.create_shortcuts {
            return Ok(None);
        }
        let source = config.shortcut_source().ok_or_else(|| {
            LivyError::Configuration("create_shortcuts is enabled but no shortcuts JSON is set".to_string())
        })?;
        Self::new(
            &source,
            &config.endpoint,
            config.workspace_id.as_deref().unwrap_or_default(),
            config.lakehouse_id.as_deref().unwrap_or_default(),
        )
        .map(Some)
    }

    /// Provisioner for the definitions in `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the definitions cannot be read or are invalid.
    pub fn new(
        source: &ShortcutSource,
        endpoint: &str,
        workspace_id: &str,
        item_id: &str,
    ) -> Result<Self> {
        Ok(Self {
            shortcuts: load_shortcuts(source)?.into(),
            endpoint: endpoint.to_string(),
            workspace_id: workspace_id.to_string(),
            item_id: item_id.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    /// Override the attempt budget and the wait between attempts.
    #[must_use]
    pub const fn with_retries(mut self, max_attempts: usize, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.retry_delay = retry_delay;
        self
    }

    /// The validated definitions.
    #[must_use]
    pub fn shortcuts(&self) -> &[Shortcut] {
        &self.shortcuts
    }

    /// Create every shortcut using `token`.
    ///
    /// # Errors
    ///
    /// Returns [`LivyError::ShortcutProvisioning`] if a shortcut cannot be
    /// created after all attempts.
    pub async fn provision(&self, token: &str, sleeper: &dyn Sleeper) -> Result<()> {
        if self.shortcuts.is_empty() {
            return Ok(());
        }
        let client = ShortcutClient::new(token, &self.endpoint, &self.workspace_id, &self.item_id);
        client
            .create_shortcuts(&self.shortcuts, self.max_attempts, self.retry_delay, sleeper)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shortcut::parse_shortcuts;
    use fabric_livy_testing::fixtures::{self, LAKEHOUSE_ID, WORKSPACE_ID};
    use fabric_livy_testing::{RecordingSleeper, routes};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DEFINITIONS: &str = r#"[{
        "path": "Tables",
        "shortcut_name": "customers",
        "target": "onelake",
        "source_workspace_id": "src-ws",
        "source_item_id": "src-item",
        "source_path": "Tables/customers"
    }]"#;

    fn shortcut() -> Shortcut {
        parse_shortcuts(DEFINITIONS).unwrap().remove(0)
    }

    fn client(server: &MockServer) -> ShortcutClient {
        ShortcutClient::new("token", server.uri(), WORKSPACE_ID, LAKEHOUSE_ID)
    }

    fn existing(workspace_id: &str) -> serde_json::Value {
        fixtures::onelake_shortcut("Tables", "customers", workspace_id, "src-item", "Tables/customers")
    }

    #[tokio::test]
    async fn missing_shortcut_does_not_exist() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(routes::shortcut("Tables", "customers")))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(!client(&server).check_exists(&shortcut()).await.unwrap());
    }

    #[tokio::test]
    async fn matching_shortcut_exists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(routes::shortcut("Tables", "customers")))
            .respond_with(ResponseTemplate::new(200).set_body_json(existing("src-ws")))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        assert!(client(&server).check_exists(&shortcut()).await.unwrap());
    }

    #[tokio::test]
    async fn mismatched_target_is_deleted_then_recreated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(routes::shortcut("Tables", "customers")))
            .respond_with(ResponseTemplate::new(200).set_body_json(existing("wrong-ws")))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(routes::shortcut("Tables", "customers")))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(routes::shortcuts()))
            .and(body_json(json!({
                "path": "Tables",
                "name": "customers",
                "target": {"oneLake": {
                    "workspaceId": "src-ws",
                    "itemId": "src-item",
                    "path": "Tables/customers"
                }}
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).create_shortcut(&shortcut()).await.unwrap();
    }

    #[tokio::test]
    async fn other_errors_are_hard_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server).check_exists(&shortcut()).await.unwrap_err();
        assert!(matches!(err, LivyError::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn second_provisioning_creates_nothing() {
        let server = MockServer::start().await;
        // First pass: absent, then created.
        Mock::given(method("GET"))
            .and(path(routes::shortcut("Tables", "customers")))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(routes::shortcut("Tables", "customers")))
            .respond_with(ResponseTemplate::new(200).set_body_json(existing("src-ws")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(routes::shortcuts()))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let provisioner = ShortcutProvisioner::new(
            &ShortcutSource::Inline(DEFINITIONS.to_string()),
            &server.uri(),
            WORKSPACE_ID,
            LAKEHOUSE_ID,
        )
        .unwrap();
        let sleeper = RecordingSleeper::new();
        provisioner.provision("token", &sleeper).await.unwrap();
        provisioner.provision("token", &sleeper).await.unwrap();
        assert_eq!(sleeper.count(), 0);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let sleeper = RecordingSleeper::new();
        client(&server)
            .create_shortcuts(&[shortcut()], 3, Duration::from_secs(5), &sleeper)
            .await
            .unwrap();
        assert_eq!(sleeper.waits(), vec![Duration::from_secs(5); 2]);
    }

    #[tokio::test]
    async fn exhausted_retries_raise_structured_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad target"))
            .expect(3)
            .mount(&server)
            .await;

        let sleeper = RecordingSleeper::new();
        let err = client(&server)
            .create_shortcuts(&[shortcut()], 3, Duration::from_secs(1), &sleeper)
            .await
            .unwrap_err();
        match err {
            LivyError::ShortcutProvisioning {
                shortcut,
                attempts,
                message,
            } => {
                assert_eq!(attempts, 3);
                assert!(shortcut.contains("customers"));
                assert!(message.contains("bad target"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sleeper.count(), 2);
    }

    #[test]
    fn invalid_definitions_fail_before_any_request() {
        let mut config = fixtures::test_config("http://127.0.0.1:9");
        config.create_shortcuts = true;
        config.shortcuts_json_str = Some(r#"[{"path": "Tables", "target": "onelake"}]"#.to_string());
        let err = ShortcutProvisioner::from_config(&config).unwrap_err();
        assert!(matches!(err, LivyError::Validation(_)));

        config.create_shortcuts = false;
        assert!(ShortcutProvisioner::from_config(&config).unwrap().is_none());
    }
}
