//! Connections handed to SQL-emitting callers.

use crate::control::PollControl;
use crate::executor::{Cursor, StatementExecutor};
use crate::metrics::{CONNECT_RETRIES, counter};
use crate::registry::{ContextKey, SessionRegistry};
use crate::retry::{RetryPolicy, retry_with_predicate};
use fabric_livy_auth::CredentialProvider;
use fabric_livy_client::LivyClient;
use fabric_livy_core::binding::Binding;
use fabric_livy_core::config::FabricSparkConfig;
use fabric_livy_core::environment::Environment;
use fabric_livy_core::error::{ErrorKind, LivyError, Result};
use fabric_livy_core::sql::{abridge, prepare_statement};
use fabric_livy_core::statement::{ColumnDescription, Row, StatementKind};
use fabric_livy_shortcuts::ShortcutProvisioner;
use std::sync::Arc;
use std::time::Duration;

/// Appended to connection failures that are not retried.
pub const CONNECT_FAILURE_HINT: &str = "Common reasons for errors: \n\
1. Invalid/expired credentials (if using CLI authentication, re-run `az login` in your terminal) \n\
2. Invalid endpoint \n\
3. Invalid workspaceid or lakehouseid (do you have the correct permissions?) \n\
4. Invalid or non-existent shortcuts json path, or improperly formatted shortcuts";

/// Characters of SQL kept in the log when abridging.
pub const ABRIDGED_SQL_CHARS: usize = 512;

/// How [`Connection::open`] retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectPolicy {
    /// Extra attempts after the first
    pub retries: u32,
    /// Wait between attempts
    pub timeout: Duration,
    /// Retry every failure, not only transient-looking ones
    pub retry_all: bool,
    /// Whether the caller supplied a token
    pub token_supplied: bool,
}

impl ConnectPolicy {
    /// Policy from the connection settings of `config`.
    #[must_use]
    pub fn from_config(config: &FabricSparkConfig) -> Self {
        Self {
            retries: config.connect_retries,
            timeout: config.connect_timeout(),
            retry_all: config.retry_all,
            token_supplied: config.access_token.is_some(),
        }
    }
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self::from_config(&FabricSparkConfig::default())
    }
}

/// Lifecycle of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never opened
    Init,
    /// Usable
    Open,
    /// Closed by the caller
    Closed,
    /// Last open attempt failed
    Fail,
}

/// A caller's view of the session of its execution context.
///
/// [`Connection::open`] is idempotent. `cancel`, `rollback` and `commit`
/// are accepted and do nothing; the remote engine has neither statement
/// cancellation nor transactions.
#[derive(Debug)]
pub struct Connection {
    registry: Arc<SessionRegistry>,
    key: ContextKey,
    policy: ConnectPolicy,
    control: PollControl,
    state: ConnectionState,
    cursor: Option<Cursor>,
}

impl Connection {
    /// Unopened connection for `key`.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, key: ContextKey, policy: ConnectPolicy) -> Self {
        Self {
            registry,
            key,
            policy,
            control: PollControl::new(),
            state: ConnectionState::Init,
            cursor: None,
        }
    }

    /// Bound session creation and statement polling with `control`.
    #[must_use]
    pub fn with_control(mut self, control: PollControl) -> Self {
        self.control = control;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the connection is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Execution context of this connection.
    #[must_use]
    pub const fn key(&self) -> &ContextKey {
        &self.key
    }

    /// Obtain a session from the registry.
    ///
    /// Makes up to `1 + retries` attempts. Truncated responses fail at
    /// once (almost always a bad credential); transient-looking failures,
    /// or any failure with `retry_all`, wait `timeout` and try again;
    /// anything else fails with a diagnostic listing the usual causes.
    ///
    /// # Errors
    ///
    /// [`LivyError::ConnectFailed`] as described above, or the last error
    /// once every attempt is spent.
    pub async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            tracing::debug!(context = %self.key, "Connection is already open, skipping open.");
            return Ok(());
        }

        let attempts = self.policy.retries.saturating_add(1);
        let env = self.registry.env().clone();
        let control = self.control.start(env.clock.as_ref());
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.registry.connect(&self.key, &control).await {
                Ok(session) => {
                    let executor =
                        StatementExecutor::new(Arc::clone(&self.registry), self.key.clone(), session);
                    self.cursor = Some(Cursor::new(executor, self.control.clone()));
                    self.state = ConnectionState::Open;
                    return Ok(());
                }
                Err(err) => {
                    self.state = ConnectionState::Fail;
                    tracing::debug!(context = %self.key, attempt, error = %err, "Connection error");
                    if !self.should_retry(&err, attempt, attempts)? {
                        return Err(LivyError::ConnectFailed(format!(
                            "could not open a Livy session ({err}). {CONNECT_FAILURE_HINT}"
                        )));
                    }
                    last_error = Some(err);
                    if attempt < attempts {
                        counter!(CONNECT_RETRIES).increment(1);
                        control.wait(&env, self.policy.timeout).await?;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LivyError::Internal("no connection attempt was made".to_string())))
    }

    /// Decide whether `err` is worth another attempt.
    fn should_retry(&self, err: &LivyError, attempt: u32, attempts: u32) -> Result<bool> {
        match err {
            LivyError::EndOfInput(_) => {
                let message = if self.policy.token_supplied {
                    "is your token valid?".to_string()
                } else {
                    format!("response ended unexpectedly ({err})")
                };
                Err(LivyError::ConnectFailed(message))
            }
            LivyError::Cancelled | LivyError::DeadlineExceeded(_) => Err(err.clone()),
            _ if self.policy.retries == 0 => Ok(false),
            _ if err.is_transient() => {
                tracing::warn!(
                    "Warning: {err}\n\tRetrying in {} seconds ({attempt} of {})",
                    self.policy.timeout.as_secs(),
                    attempts - 1
                );
                Ok(true)
            }
            _ if self.policy.retry_all => {
                tracing::warn!(
                    "Warning: {err}, retrying due to 'retry_all' configuration set to true.\n\tRetrying in {} seconds ({attempt} of {})",
                    self.policy.timeout.as_secs(),
                    attempts - 1
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// The cursor of this connection.
    ///
    /// # Errors
    ///
    /// [`LivyError::ConnectFailed`] if the connection is not open.
    pub fn cursor(&mut self) -> Result<&mut Cursor> {
        match (self.state, self.cursor.as_mut()) {
            (ConnectionState::Open, Some(cursor)) => Ok(cursor),
            _ => Err(LivyError::ConnectFailed("connection is not open".to_string())),
        }
    }

    /// Execute SQL without retrying.
    ///
    /// # Errors
    ///
    /// See [`Connection::execute_with_retry`].
    pub async fn execute(&mut self, sql: &str, bindings: Option<&[Binding]>) -> Result<()> {
        self.execute_with_retry(sql, bindings, &[]).await
    }

    /// Execute SQL, retrying failures whose kind is in `retryable`.
    ///
    /// Up to `connect_retries` attempts (three when unset), five seconds
    /// apart. A timeout on the connection's control bounds the whole call,
    /// retries included; cancellation also ends the wait between attempts.
    /// Bindings are substituted textually; never pass untrusted
    /// input.
    ///
    /// # Errors
    ///
    /// - [`LivyError::ConnectFailed`] if the connection is not open
    /// - [`LivyError::Validation`] if the bindings do not fit the placeholders
    /// - the statement's error once retries are spent or it is not retryable
    pub async fn execute_with_retry(
        &mut self,
        sql: &str,
        bindings: Option<&[Binding]>,
        retryable: &[ErrorKind],
    ) -> Result<()> {
        let policy = RetryPolicy::for_queries(self.policy.retries);
        let env = self.registry.env().clone();
        let cursor = self.cursor()?;
        let code = prepare_statement(sql, bindings)?;
        let executor = cursor.executor().clone();
        let control = cursor.control().start(env.clock.as_ref());

        let outcome = retry_with_predicate(
            policy,
            &control.sleeper(&env),
            || executor.run(&code, StatementKind::Sql, &control),
            |err: &LivyError| {
                !matches!(err, LivyError::Cancelled | LivyError::DeadlineExceeded(_))
                    && retryable.contains(&err.kind())
            },
        )
        .await;
        cursor.record(outcome)
    }

    /// Rows of the last statement.
    #[must_use]
    pub fn fetchall(&self) -> Option<Vec<Row>> {
        self.cursor.as_ref().and_then(Cursor::fetchall)
    }

    /// Next row of the last statement.
    pub fn fetchone(&mut self) -> Option<Row> {
        self.cursor.as_mut().and_then(Cursor::fetchone)
    }

    /// Column metadata of the last statement.
    #[must_use]
    pub fn description(&self) -> Option<Vec<ColumnDescription>> {
        self.cursor.as_ref().and_then(Cursor::description)
    }

    /// Close the connection. Never fails; the session stays registered for
    /// reuse.
    pub fn close(&mut self) {
        if matches!(self.state, ConnectionState::Closed | ConnectionState::Init) {
            return;
        }
        tracing::debug!(context = %self.key, "Connection.close()");
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.close();
        }
        self.cursor = None;
        self.state = ConnectionState::Closed;
    }

    /// Accepted and ignored.
    pub fn cancel(&self) {
        tracing::debug!("NotImplemented: cancel");
    }

    /// Accepted and ignored.
    pub fn rollback(&self) {
        tracing::debug!("NotImplemented: rollback");
    }

    /// Accepted and ignored.
    pub fn commit(&self) {
        tracing::debug!("NotImplemented: commit");
    }
}

/// Outcome of [`FabricSparkConnectionManager::add_query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterResponse {
    /// Always `"OK"`; the remote engine reports no row counts
    pub message: String,
    /// Wall time of the statement
    pub elapsed: Duration,
}

impl AdapterResponse {
    fn ok(elapsed: Duration) -> Self {
        Self {
            message: "OK".to_string(),
            elapsed,
        }
    }
}

/// Entry point for SQL-emitting callers.
///
/// Owns the session registry, hands out one [`Connection`] per execution
/// context and tears every session down in [`Self::cleanup_all`].
#[derive(Debug)]
pub struct FabricSparkConnectionManager {
    registry: Arc<SessionRegistry>,
    policy: ConnectPolicy,
}

impl FabricSparkConnectionManager {
    /// Manager for `config`, using the wall clock and the tokio timer.
    ///
    /// Validates the configuration and the shortcut definitions before any
    /// network call.
    ///
    /// # Errors
    ///
    /// [`LivyError::Configuration`] or [`LivyError::Validation`].
    pub fn new(config: FabricSparkConfig) -> Result<Self> {
        let config = config.validated()?;
        let credentials = Arc::new(CredentialProvider::from_config(&config)?);
        let client = LivyClient::from_config(&config, credentials);
        Self::with_client(&config, client, Environment::system())
    }

    /// Manager over an explicit client and environment.
    ///
    /// # Errors
    ///
    /// [`LivyError::Configuration`] or [`LivyError::Validation`].
    pub fn with_client(config: &FabricSparkConfig, client: LivyClient, env: Environment) -> Result<Self> {
        let registry = SessionRegistry::new(client, env, config.session_request()?)
            .with_poll_intervals(config.session_poll_interval(), config.statement_poll_interval())
            .with_shortcuts(ShortcutProvisioner::from_config(config)?);
        Ok(Self {
            registry: Arc::new(registry),
            policy: ConnectPolicy::from_config(config),
        })
    }

    /// The session registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// An unopened connection for `key`.
    #[must_use]
    pub fn connection(&self, key: ContextKey) -> Connection {
        Connection::new(Arc::clone(&self.registry), key, self.policy)
    }

    /// An open connection for `key`.
    ///
    /// # Errors
    ///
    /// See [`Connection::open`].
    pub async fn open(&self, key: ContextKey) -> Result<Connection> {
        let mut connection = self.connection(key);
        connection.open().await?;
        Ok(connection)
    }

    /// Run one statement on `connection` and time it.
    ///
    /// With `abridge_sql_log` only the first 512 characters of the SQL are
    /// logged.
    ///
    /// # Errors
    ///
    /// The statement's error, see [`Connection::execute_with_retry`].
    pub async fn add_query(
        &self,
        connection: &mut Connection,
        sql: &str,
        bindings: Option<&[Binding]>,
        abridge_sql_log: bool,
        retryable: &[ErrorKind],
    ) -> Result<AdapterResponse> {
        self.begin();
        let log_sql = if abridge_sql_log {
            abridge(sql, ABRIDGED_SQL_CHARS)
        } else {
            sql.to_string()
        };
        tracing::debug!(context = %connection.key(), "On {}: {log_sql}", connection.key());

        let clock = Arc::clone(&self.registry.env().clock);
        let started = clock.now();
        if let Err(err) = connection.execute_with_retry(sql, bindings, retryable).await {
            tracing::debug!(error = %err, "Error while running:\n{log_sql}");
            return Err(err);
        }
        let elapsed = (clock.now() - started).to_std().unwrap_or_default();

        let response = AdapterResponse::ok(elapsed);
        tracing::debug!(
            status = %response.message,
            elapsed_secs = elapsed.as_secs_f64(),
            "SQL status: {} in {:.2} seconds",
            response.message,
            elapsed.as_secs_f64()
        );
        Ok(response)
    }

    /// Accepted and ignored; there are no transactions.
    pub fn begin(&self) {
        tracing::trace!("NotImplemented: add_begin_query");
    }

    /// Accepted and ignored; there are no transactions.
    pub fn commit(&self) {
        tracing::debug!("NotImplemented: commit");
    }

    /// Name of a column type as reported in a cursor description.
    #[must_use]
    pub fn data_type_code_to_name(type_code: &str) -> String {
        type_code.to_string()
    }

    /// Delete every session of every context.
    pub async fn cleanup_all(&self) {
        self.registry.disconnect().await;
    }
}
