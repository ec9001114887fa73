//! Statement submission, polling and result cursors.

use crate::control::PollControl;
use crate::metrics::{STATEMENTS_EXECUTED, STATEMENTS_FAILED, counter};
use crate::registry::{ContextKey, SessionRegistry, SharedSession};
use fabric_livy_core::binding::Binding;
use fabric_livy_core::error::{LivyError, Result};
use fabric_livy_core::sql::prepare_statement;
use fabric_livy_core::statement::{
    ColumnDescription, Field, Row, StatementKind, StatementOutput, StatementRequest,
    StatementState,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Runs statements on the session of one execution context.
///
/// Statements on a session run one at a time: the session lock is held
/// from submission until the result is in.
#[derive(Debug, Clone)]
pub struct StatementExecutor {
    registry: Arc<SessionRegistry>,
    key: ContextKey,
    session: Arc<Mutex<SharedSession>>,
}

impl StatementExecutor {
    /// Executor bound to `session`, the current session of `key`.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, key: ContextKey, session: SharedSession) -> Self {
        Self {
            registry,
            key,
            session: Arc::new(Mutex::new(session)),
        }
    }

    /// Context this executor runs in.
    #[must_use]
    pub const fn key(&self) -> &ContextKey {
        &self.key
    }

    /// Submit `code` and wait for its output.
    ///
    /// If the bound session was flagged for recreation, the registry is
    /// asked for a fresh one first.
    ///
    /// # Errors
    ///
    /// - [`LivyError::Database`] if the remote engine rejected the statement
    /// - request, reconnect and `control` errors
    pub async fn run(&self, code: &str, kind: StatementKind, control: &PollControl) -> Result<StatementOutput> {
        let env = self.registry.env();
        let control = &control.start(env.clock.as_ref());
        control.check(env.clock.as_ref())?;

        let mut shared = self.current();
        if shared.lock().await.new_session_required() {
            tracing::debug!(context = %self.key, "Session flagged for recreation, reconnecting");
            shared = self.registry.connect(&self.key, control).await?;
            *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&shared);
        }

        let session = shared.lock().await;
        let Some(session_id) = session.id().cloned() else {
            return Err(LivyError::ConnectFailed("session is not open".to_string()));
        };
        let client = session.client();

        let request = StatementRequest {
            code: code.to_string(),
            kind,
        };
        let statement_id = client.submit_statement(&session_id, &request).await?;
        tracing::debug!(
            session_id = %session_id,
            statement_id = %statement_id,
            kind = kind.as_str(),
            "Submitted statement"
        );

        let interval = self.registry.statement_poll_interval();
        let info = loop {
            let info = client.get_statement(&session_id, &statement_id).await?;
            match info.state {
                StatementState::Available | StatementState::Error | StatementState::Cancelled => {
                    break info;
                }
                _ => control.wait(env, interval).await?,
            }
        };
        drop(session);

        let Some(output) = info.output else {
            counter!(STATEMENTS_FAILED).increment(1);
            return Err(LivyError::Database(format!(
                "statement {statement_id} ended in state '{:?}' without output",
                info.state
            )));
        };
        if output.is_ok() {
            counter!(STATEMENTS_EXECUTED).increment(1);
            Ok(output)
        } else {
            counter!(STATEMENTS_FAILED).increment(1);
            tracing::debug!(
                statement_id = %statement_id,
                ename = output.ename.as_deref().unwrap_or_default(),
                "Statement failed"
            );
            Err(LivyError::Database(output.error_message()))
        }
    }

    fn current(&self) -> SharedSession {
        Arc::clone(&self.session.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Result state of the last statement.
///
/// `None` rows mean nothing ran successfully yet; an empty list means the
/// statement succeeded with zero rows.
#[derive(Debug)]
pub struct Cursor {
    executor: StatementExecutor,
    control: PollControl,
    rows: Option<VecDeque<Row>>,
    fields: Option<Vec<Field>>,
    text: Vec<String>,
}

impl Cursor {
    /// Cursor running statements through `executor`.
    #[must_use]
    pub fn new(executor: StatementExecutor, control: PollControl) -> Self {
        Self {
            executor,
            control,
            rows: None,
            fields: None,
            text: Vec::new(),
        }
    }

    /// The executor behind this cursor.
    #[must_use]
    pub const fn executor(&self) -> &StatementExecutor {
        &self.executor
    }

    /// Poll control used for every statement.
    #[must_use]
    pub const fn control(&self) -> &PollControl {
        &self.control
    }

    /// Execute SQL, substituting `bindings` textually.
    ///
    /// The substitution is plain text formatting, not a parameterized
    /// query: never pass untrusted input.
    ///
    /// # Errors
    ///
    /// - [`LivyError::Validation`] if the bindings do not fit the placeholders
    /// - [`LivyError::Database`] if the remote engine rejected the statement
    /// - request, reconnect and poll-control errors
    pub async fn execute(&mut self, sql: &str, bindings: Option<&[Binding]>) -> Result<()> {
        let code = prepare_statement(sql, bindings)?;
        self.execute_code(&code, StatementKind::Sql).await
    }

    /// Execute `code` as is, in the interpreter selected by `kind`.
    ///
    /// # Errors
    ///
    /// Same as [`Cursor::execute`], minus binding errors.
    pub async fn execute_code(&mut self, code: &str, kind: StatementKind) -> Result<()> {
        let outcome = self.executor.run(code, kind, &self.control).await;
        self.record(outcome)
    }

    /// Store the outcome of a statement, clearing the state on failure.
    pub(crate) fn record(&mut self, outcome: Result<StatementOutput>) -> Result<()> {
        self.close();
        let output = outcome?;
        let result = output.result_set()?;
        self.rows = Some(result.rows.into());
        self.fields = Some(result.fields);
        self.text = output.text_lines();
        Ok(())
    }

    /// Every remaining row, or `None` if nothing ran successfully.
    #[must_use]
    pub fn fetchall(&self) -> Option<Vec<Row>> {
        self.rows.as_ref().map(|rows| rows.iter().cloned().collect())
    }

    /// Take the next row.
    pub fn fetchone(&mut self) -> Option<Row> {
        self.rows.as_mut().and_then(VecDeque::pop_front)
    }

    /// Column metadata of the last result.
    #[must_use]
    pub fn description(&self) -> Option<Vec<ColumnDescription>> {
        self.fields
            .as_ref()
            .map(|fields| fields.iter().map(ColumnDescription::from).collect())
    }

    /// Plain-text output of the last statement, one entry per line.
    #[must_use]
    pub fn text_output(&self) -> &[String] {
        &self.text
    }

    /// Forget the last result.
    pub fn close(&mut self) {
        self.rows = None;
        self.fields = None;
        self.text.clear();
    }
}
