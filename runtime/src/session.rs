//! One remote Livy session.

use crate::control::PollControl;
use crate::metrics::{SESSIONS_CREATED, SESSIONS_DELETED, counter};
use fabric_livy_client::LivyClient;
use fabric_livy_core::environment::Environment;
use fabric_livy_core::error::{LivyError, Result};
use fabric_livy_core::session::{SessionId, SessionRequest, SessionState};
use std::time::Duration;

/// Handle on a remote session.
///
/// The handle moves through `uninitialized -> starting -> idle`. Readiness
/// is established once, by [`SessionHandle::create`]; afterwards
/// [`SessionHandle::is_valid`] only tells reuse from recreate.
#[derive(Debug)]
pub struct SessionHandle {
    client: LivyClient,
    env: Environment,
    poll_interval: Duration,
    id: Option<SessionId>,
    state: Option<SessionState>,
    new_session_required: bool,
    shortcuts_provisioned: bool,
}

impl SessionHandle {
    /// Uninitialized handle.
    #[must_use]
    pub fn new(client: LivyClient, env: Environment, poll_interval: Duration) -> Self {
        Self {
            client,
            env,
            poll_interval,
            id: None,
            state: None,
            new_session_required: true,
            shortcuts_provisioned: false,
        }
    }

    /// Remote id, once created.
    #[must_use]
    pub const fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    /// Last state observed.
    #[must_use]
    pub const fn state(&self) -> Option<&SessionState> {
        self.state.as_ref()
    }

    /// Base URL of the control plane this session lives on.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }

    /// Client bound to this session's control plane.
    #[must_use]
    pub const fn client(&self) -> &LivyClient {
        &self.client
    }

    /// Whether the next use must create a fresh session first.
    #[must_use]
    pub const fn new_session_required(&self) -> bool {
        self.new_session_required
    }

    /// Flag the handle so the next use recreates the session.
    pub fn mark_new_session_required(&mut self) {
        self.new_session_required = true;
    }

    /// Whether shortcuts were provisioned for this handle's context.
    #[must_use]
    pub const fn shortcuts_provisioned(&self) -> bool {
        self.shortcuts_provisioned
    }

    /// Record that shortcut provisioning succeeded.
    pub fn mark_shortcuts_provisioned(&mut self) {
        self.shortcuts_provisioned = true;
    }

    /// Create a session and wait until it is idle.
    ///
    /// Polls every poll interval while the session is starting, and keeps
    /// polling through other transitional states. Blocks for as long as the
    /// control plane takes, bounded only by `control`; a timeout on
    /// `control` starts counting when this call begins.
    ///
    /// # Errors
    ///
    /// - creation errors from [`LivyClient::create_session`]
    /// - [`LivyError::ConnectFailed`] if the session dies while starting
    /// - [`LivyError::Cancelled`] / [`LivyError::DeadlineExceeded`] from `control`
    pub async fn create(&mut self, request: &SessionRequest, control: &PollControl) -> Result<&SessionId> {
        let control = control.start(self.env.clock.as_ref());
        control.check(self.env.clock.as_ref())?;
        self.id = None;
        self.state = None;

        let id = self.client.create_session(request).await?;
        tracing::debug!(session_id = %id, name = request.name(), "Session requested");

        let mut polls = 0_u32;
        loop {
            let info = self.client.get_session(&id).await?;
            let liveness = info.liveness().clone();
            self.state = Some(liveness.clone());

            if info.state.is_starting() {
                polls += 1;
                tracing::debug!(
                    session_id = %id,
                    state = %info.state,
                    polls,
                    "Session starting, waiting"
                );
            } else if liveness == SessionState::Idle {
                break;
            } else if liveness.is_unusable() || liveness == SessionState::Error {
                tracing::error!(session_id = %id, state = %liveness, "Session died while starting");
                return Err(LivyError::ConnectFailed(format!(
                    "Livy session {id} reported state '{liveness}' while starting"
                )));
            } else {
                tracing::debug!(session_id = %id, state = %liveness, "Session not idle yet, waiting");
            }
            control.wait(&self.env, self.poll_interval).await?;
        }

        tracing::info!(session_id = %id, "Livy session is ready");
        counter!(SESSIONS_CREATED).increment(1);
        self.new_session_required = false;
        Ok(&*self.id.insert(id))
    }

    /// Whether the remote session can still be used.
    ///
    /// A handle that was never created is not valid.
    ///
    /// # Errors
    ///
    /// Returns an error if the status request fails.
    pub async fn is_valid(&mut self) -> Result<bool> {
        let Some(id) = &self.id else {
            return Ok(false);
        };
        let info = self.client.get_session(id).await?;
        let liveness = info.liveness().clone();
        let valid = !liveness.is_unusable();
        if !valid {
            tracing::debug!(session_id = %id, state = %liveness, "Session is no longer usable");
        }
        self.state = Some(liveness);
        Ok(valid)
    }

    /// Delete the session, logging and absorbing any failure.
    ///
    /// The handle is left uninitialized and flagged for recreation.
    pub async fn delete(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        self.new_session_required = true;
        self.state = None;
        match self.client.delete_session(&id).await {
            Ok(()) => {
                tracing::debug!(session_id = %id, "Closed the livy session");
                counter!(SESSIONS_DELETED).increment(1);
            }
            Err(err) => {
                tracing::error!(session_id = %id, error = %err, "Unable to close the livy session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_livy_auth::CredentialProvider;
    use fabric_livy_auth::mocks::MockTokenSource;
    use fabric_livy_core::session::SessionConfig;
    use fabric_livy_testing::{fixtures, routes, test_clock, test_environment};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn handle(server: &MockServer, env: Environment) -> SessionHandle {
        let credentials = Arc::new(CredentialProvider::new(
            Arc::new(MockTokenSource::new()),
            Arc::new(test_clock()),
        ));
        let client = LivyClient::new(format!("{}{}", server.uri(), routes::livy_root()), credentials);
        SessionHandle::new(client, env, Duration::from_secs(45))
    }

    fn request() -> SessionRequest {
        SessionRequest::new(SessionConfig::named("dbt-fabricspark")).unwrap()
    }

    async fn mount_create(server: &MockServer, id: &str) {
        Mock::given(method("POST"))
            .and(path(routes::sessions()))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::session_created(id)))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn create_polls_until_idle() {
        let server = MockServer::start().await;
        mount_create(&server, "7").await;
        Mock::given(method("GET"))
            .and(path(routes::session("7")))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::session("7", "starting")))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(routes::session("7")))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::session("7", "idle")))
            .mount(&server)
            .await;

        let (env, _clock, sleeper) = test_environment();
        let mut session = handle(&server, env);
        assert!(session.new_session_required());

        let id = session.create(&request(), &PollControl::new()).await.unwrap();
        assert_eq!(id.as_str(), "7");
        assert!(!session.new_session_required());
        assert_eq!(session.state(), Some(&SessionState::Idle));
        assert_eq!(sleeper.waits(), vec![Duration::from_secs(45); 3]);
    }

    #[tokio::test]
    async fn dead_session_fails_creation() {
        let server = MockServer::start().await;
        mount_create(&server, "7").await;
        Mock::given(method("GET"))
            .and(path(routes::session("7")))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::session("7", "dead")))
            .mount(&server)
            .await;

        let (env, _clock, _sleeper) = test_environment();
        let mut session = handle(&server, env);
        let err = session.create(&request(), &PollControl::new()).await.unwrap_err();
        assert!(matches!(err, LivyError::ConnectFailed(_)));
        assert!(session.id().is_none());
    }

    #[tokio::test]
    async fn deadline_bounds_a_session_stuck_starting() {
        let server = MockServer::start().await;
        mount_create(&server, "7").await;
        Mock::given(method("GET"))
            .and(path(routes::session("7")))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::session("7", "starting")))
            .mount(&server)
            .await;

        let (env, _clock, sleeper) = test_environment();
        let control = PollControl::new().with_timeout(Duration::from_secs(100));
        let mut session = handle(&server, env);
        let err = session.create(&request(), &control).await.unwrap_err();
        assert_eq!(err, LivyError::DeadlineExceeded(Duration::from_secs(100)));
        assert_eq!(sleeper.count(), 3);
    }

    #[tokio::test]
    async fn unusable_states_are_invalid() {
        for (state, expected) in [
            ("idle", true),
            ("busy", true),
            ("dead", false),
            ("killed", false),
            ("shutting_down", false),
        ] {
            let server = MockServer::start().await;
            mount_create(&server, "7").await;
            Mock::given(method("GET"))
                .and(path(routes::session("7")))
                .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::session("7", "idle")))
                .up_to_n_times(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path(routes::session("7")))
                .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::session("7", state)))
                .mount(&server)
                .await;

            let (env, _clock, _sleeper) = test_environment();
            let mut session = handle(&server, env);
            session.create(&request(), &PollControl::new()).await.unwrap();
            assert_eq!(session.is_valid().await.unwrap(), expected, "state {state}");
        }
    }

    #[tokio::test]
    async fn uncreated_handle_is_invalid_without_a_request() {
        let server = MockServer::start().await;
        let (env, _clock, _sleeper) = test_environment();
        let mut session = handle(&server, env);
        assert!(!session.is_valid().await.unwrap());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_absorbs_failures() {
        let server = MockServer::start().await;
        mount_create(&server, "7").await;
        Mock::given(method("GET"))
            .and(path(routes::session("7")))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::session("7", "idle")))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(routes::session("7")))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let (env, _clock, _sleeper) = test_environment();
        let mut session = handle(&server, env);
        session.create(&request(), &PollControl::new()).await.unwrap();
        session.delete().await;
        assert!(session.id().is_none());
        assert!(session.new_session_required());
    }
}
