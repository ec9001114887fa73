//! Shared setup for runtime integration tests.

#![allow(dead_code)]

use fabric_livy_auth::CredentialProvider;
use fabric_livy_client::LivyClient;
use fabric_livy_core::{Clock, Environment, FabricSparkConfig, Sleeper};
use fabric_livy_runtime::FabricSparkConnectionManager;
use fabric_livy_testing::{ManualClock, RecordingSleeper, fixtures, routes, test_environment};
use serde_json::Value;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct Harness {
    pub server: MockServer,
    pub config: FabricSparkConfig,
    pub clock: Arc<ManualClock>,
    pub sleeper: Arc<RecordingSleeper>,
}

impl Harness {
    pub async fn start() -> Self {
        fabric_livy_testing::init_tracing();
        let (server, config) = routes::mock_fabric().await;
        let (_env, clock, sleeper) = test_environment();
        Self {
            server,
            config,
            clock,
            sleeper,
        }
    }

    pub fn manager(&self) -> FabricSparkConnectionManager {
        self.manager_with(&self.config)
    }

    pub fn manager_with(&self, config: &FabricSparkConfig) -> FabricSparkConnectionManager {
        self.manager_with_sleeper(config, Arc::clone(&self.sleeper) as Arc<dyn Sleeper>)
    }

    /// Manager on the harness clock with a custom sleeper.
    pub fn manager_with_sleeper(
        &self,
        config: &FabricSparkConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> FabricSparkConnectionManager {
        let config = config.clone().validated().unwrap();
        let credentials = Arc::new(CredentialProvider::from_config(&config).unwrap());
        let client = LivyClient::from_config(&config, credentials);
        let env = Environment::new(Arc::clone(&self.clock) as Arc<dyn Clock>, sleeper);
        FabricSparkConnectionManager::with_client(&config, client, env).unwrap()
    }

    /// `POST /sessions` answers `id` once; `GET /sessions/{id}` reports idle.
    pub async fn mount_session(&self, id: &str) {
        Mock::given(method("POST"))
            .and(path(routes::sessions()))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::session_created(id)))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
        self.mount_session_state(id, "idle").await;
    }

    pub async fn mount_session_state(&self, id: &str, state: &str) {
        Mock::given(method("GET"))
            .and(path(routes::session(id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::session(id, state)))
            .mount(&self.server)
            .await;
    }

    /// Statement `statement_id` on session `session_id` is accepted once
    /// and then answers `body` on every poll.
    pub async fn mount_statement(&self, session_id: &str, statement_id: u64, body: Value) {
        Mock::given(method("POST"))
            .and(path(routes::statements(session_id)))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(fixtures::statement_submitted(statement_id)),
            )
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(routes::statement(session_id, statement_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn requests(&self, verb: &str, url_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.method.as_str() == verb && request.url.path() == url_path)
            .count()
    }
}
