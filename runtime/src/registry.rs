//! Per-context session cache.

use crate::control::PollControl;
use crate::session::SessionHandle;
use fabric_livy_client::LivyClient;
use fabric_livy_core::environment::Environment;
use fabric_livy_core::error::Result;
use fabric_livy_core::session::{SessionId, SessionRequest};
use fabric_livy_shortcuts::ShortcutProvisioner;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A session shared between the registry and the executors using it.
///
/// Holding the lock means owning the session's single statement slot.
pub type SharedSession = Arc<tokio::sync::Mutex<SessionHandle>>;

/// Identifies the execution context a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextKey(String);

impl ContextKey {
    /// Key with an explicit name, e.g. a worker name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Key of the calling OS thread.
    ///
    /// Tasks on a multi-threaded runtime can move between threads; give
    /// them explicit keys instead.
    #[must_use]
    pub fn current_thread() -> Self {
        let thread = std::thread::current();
        match thread.name() {
            Some(name) => Self(format!("{name}-{:?}", thread.id())),
            None => Self(format!("{:?}", thread.id())),
        }
    }

    /// Key as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// One live session per execution context.
///
/// [`SessionRegistry::connect`] decides between reuse and recreation for
/// the caller's context; [`SessionRegistry::disconnect`] tears everything
/// down. Different contexts never share a session.
pub struct SessionRegistry {
    client: LivyClient,
    env: Environment,
    request: SessionRequest,
    session_poll_interval: Duration,
    statement_poll_interval: Duration,
    provisioner: Option<ShortcutProvisioner>,
    sessions: Mutex<HashMap<ContextKey, SharedSession>>,
}

impl SessionRegistry {
    /// Empty registry creating sessions from `request` through `client`.
    #[must_use]
    pub fn new(client: LivyClient, env: Environment, request: SessionRequest) -> Self {
        Self {
            client,
            env,
            request,
            session_poll_interval: Duration::from_secs(
                fabric_livy_core::config::DEFAULT_SESSION_POLL_SECS,
            ),
            statement_poll_interval: Duration::from_secs(
                fabric_livy_core::config::DEFAULT_STATEMENT_POLL_SECS,
            ),
            provisioner: None,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Override the session and statement poll intervals.
    #[must_use]
    pub const fn with_poll_intervals(mut self, session: Duration, statement: Duration) -> Self {
        self.session_poll_interval = session;
        self.statement_poll_interval = statement;
        self
    }

    /// Provision shortcuts once per context, retrying on later connects
    /// until it succeeds.
    #[must_use]
    pub fn with_shortcuts(mut self, provisioner: Option<ShortcutProvisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }

    /// Time dependencies of this registry.
    #[must_use]
    pub const fn env(&self) -> &Environment {
        &self.env
    }

    /// Interval between statement polls.
    #[must_use]
    pub const fn statement_poll_interval(&self) -> Duration {
        self.statement_poll_interval
    }

    /// Number of registered contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no context is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Current session id of `key`, if any.
    pub async fn session_id(&self, key: &ContextKey) -> Option<SessionId> {
        let shared = self.lock().get(key).cloned()?;
        let handle = shared.lock().await;
        handle.id().cloned()
    }

    /// A ready session for `key`.
    ///
    /// - no session yet: create one
    /// - session no longer valid: delete it and create a replacement
    /// - session flagged for recreation: create a new one in place
    /// - otherwise: reuse it
    ///
    /// Shortcuts are then provisioned unless an earlier call for this
    /// context already succeeded at it, so a failed provisioning is retried
    /// by the next call instead of being skipped.
    ///
    /// # Errors
    ///
    /// Returns session creation, validity check and shortcut provisioning
    /// errors.
    pub async fn connect(&self, key: &ContextKey, control: &PollControl) -> Result<SharedSession> {
        let shared = self.entry(key);
        let mut handle = shared.lock().await;

        if handle.id().is_none() {
            handle.create(&self.request, control).await?;
        } else if !handle.is_valid().await? {
            handle.delete().await;
            handle.create(&self.request, control).await?;
        } else if handle.new_session_required() {
            handle.create(&self.request, control).await?;
        } else if let Some(id) = handle.id() {
            tracing::debug!(context = %key, session_id = %id, "Reusing session");
        }

        if !handle.shortcuts_provisioned() {
            self.provision_shortcuts().await?;
            handle.mark_shortcuts_provisioned();
        }

        drop(handle);
        Ok(shared)
    }

    /// Delete every registered session and clear the registry.
    ///
    /// Sessions reported invalid are skipped; a session whose status cannot
    /// be read is deleted anyway. Failures are logged, never returned.
    pub async fn disconnect(&self) {
        let drained: Vec<(ContextKey, SharedSession)> = self.lock().drain().collect();
        for (key, shared) in drained {
            let mut handle = shared.lock().await;
            match handle.is_valid().await {
                Ok(true) => handle.delete().await,
                Ok(false) => tracing::debug!(context = %key, "Session already gone, nothing to delete"),
                Err(err) => {
                    tracing::warn!(context = %key, error = %err, "Unable to check session before teardown, deleting anyway");
                    handle.delete().await;
                }
            }
            handle.mark_new_session_required();
        }
    }

    fn entry(&self, key: &ContextKey) -> SharedSession {
        let mut sessions = self.lock();
        let shared = sessions.entry(key.clone()).or_insert_with(|| {
            Arc::new(tokio::sync::Mutex::new(SessionHandle::new(
                self.client.clone(),
                self.env.clone(),
                self.session_poll_interval,
            )))
        });
        Arc::clone(shared)
    }

    async fn provision_shortcuts(&self) -> Result<()> {
        let Some(provisioner) = &self.provisioner else {
            return Ok(());
        };
        let token = self.client.credentials().access_token(false).await?;
        provisioner
            .provision(token.secret(), self.env.sleeper.as_ref())
            .await
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ContextKey, SharedSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("client", &self.client)
            .field("contexts", &self.len())
            .field("shortcuts", &self.provisioner.as_ref().map(|p| p.shortcuts().len()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_keys_differ_between_threads() {
        let here = ContextKey::current_thread();
        let there = std::thread::spawn(ContextKey::current_thread).join().unwrap();
        assert_ne!(here, there);
        assert_eq!(here, ContextKey::current_thread());
    }

    #[test]
    fn named_keys_compare_by_name() {
        assert_eq!(ContextKey::from("worker-1"), ContextKey::new("worker-1"));
        assert_eq!(ContextKey::new("worker-1").to_string(), "worker-1");
    }
}
