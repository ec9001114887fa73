//! Cancellation and deadlines for poll loops.

use chrono::{DateTime, Utc};
use fabric_livy_core::environment::{Clock, Environment, Sleeper};
use fabric_livy_core::error::{LivyError, Result};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Bounds the latency of session creation and statement polling.
///
/// Every wait inside a poll loop goes through [`PollControl::wait`], which
/// returns [`LivyError::Cancelled`] as soon as the token fires and
/// [`LivyError::DeadlineExceeded`] once the clock passes the deadline.
///
/// A timeout is a budget per operation, not per control: each session
/// creation, connection open or statement calls [`PollControl::start`],
/// which fixes the deadline at `now + budget` for that operation only.
/// The default control never cancels and has no deadline.
#[derive(Debug, Clone, Default)]
pub struct PollControl {
    token: CancellationToken,
    budget: Option<Duration>,
    deadline: Option<DateTime<Utc>>,
}

impl PollControl {
    /// Control that never cancels and has no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `token` for cancellation.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Give each operation at most `budget` before it fails.
    #[must_use]
    pub fn with_timeout(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Control scoped to one operation starting now on `clock`.
    ///
    /// A control that was already started keeps its deadline, so nested
    /// operations share the budget of the outermost one.
    #[must_use]
    pub fn start(&self, clock: &dyn Clock) -> Self {
        let mut scoped = self.clone();
        if scoped.deadline.is_none() {
            let now = clock.now();
            scoped.deadline = self
                .budget
                .and_then(|budget| chrono::Duration::from_std(budget).ok())
                .and_then(|delta| now.checked_add_signed(delta));
        }
        scoped
    }

    /// Handle to the cancellation token, for cancelling from another task.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel every loop using this control.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail if cancelled or past the deadline of a started operation.
    ///
    /// # Errors
    ///
    /// [`LivyError::Cancelled`] or [`LivyError::DeadlineExceeded`].
    pub fn check(&self, clock: &dyn Clock) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(LivyError::Cancelled);
        }
        match (self.deadline, self.budget) {
            (Some(at), Some(budget)) if clock.now() >= at => Err(LivyError::DeadlineExceeded(budget)),
            _ => Ok(()),
        }
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// # Errors
    ///
    /// [`LivyError::Cancelled`] or [`LivyError::DeadlineExceeded`], checked
    /// before and after the wait.
    pub async fn wait(&self, env: &Environment, duration: Duration) -> Result<()> {
        self.check(env.clock.as_ref())?;
        tokio::select! {
            () = env.sleeper.sleep(duration) => {}
            () = self.token.cancelled() => return Err(LivyError::Cancelled),
        }
        self.check(env.clock.as_ref())
    }

    /// A [`Sleeper`] whose waits go through [`PollControl::wait`].
    ///
    /// An interrupted wait returns early; the caller sees the cancellation
    /// or deadline at its next [`PollControl::check`].
    #[must_use]
    pub const fn sleeper<'a>(&'a self, env: &'a Environment) -> ControlledSleeper<'a> {
        ControlledSleeper { control: self, env }
    }
}

/// Sleeper returned by [`PollControl::sleeper`].
#[derive(Debug)]
pub struct ControlledSleeper<'a> {
    control: &'a PollControl,
    env: &'a Environment,
}

impl Sleeper for ControlledSleeper<'_> {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if let Err(err) = self.control.wait(self.env, duration).await {
                tracing::debug!(error = %err, "Wait interrupted");
            }
        })
    }
}
