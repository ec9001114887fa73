//! Mock token source.

use crate::providers::TokenSource;
use crate::token::AccessToken;
use chrono::{DateTime, Duration, Utc};
use fabric_livy_core::config::AuthenticationMethod;
use fabric_livy_core::error::{LivyError, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Mock token source.
///
/// Issues `token-1`, `token-2`, ... with a configurable lifetime and counts
/// acquisitions.
#[derive(Debug, Clone)]
pub struct MockTokenSource {
    issued: Arc<AtomicUsize>,
    lifetime: Duration,
    failing: Arc<AtomicBool>,
}

impl MockTokenSource {
    /// Source issuing one-hour tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lifetime(Duration::hours(1))
    }

    /// Source issuing tokens valid for `lifetime` after acquisition.
    #[must_use]
    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            issued: Arc::new(AtomicUsize::new(0)),
            lifetime,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Source that fails every acquisition.
    #[must_use]
    pub fn failing() -> Self {
        let source = Self::new();
        source.set_failing(true);
        source
    }

    /// Switch failure simulation on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of tokens issued so far.
    #[must_use]
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

impl Default for MockTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenSource for MockTokenSource {
    fn acquire(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken>> + Send + '_>> {
        let result = if self.failing.load(Ordering::SeqCst) {
            Err(LivyError::Authentication(
                "no local identity session".to_string(),
            ))
        } else {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(AccessToken::new(format!("token-{n}"), now + self.lifetime))
        };
        Box::pin(async move { result })
    }

    fn method(&self) -> AuthenticationMethod {
        AuthenticationMethod::Static
    }
}
