//! Pre-supplied tokens (notebook-injected or handed over by a caller).

use super::TokenSource;
use crate::token::AccessToken;
use chrono::{DateTime, Duration, Utc};
use fabric_livy_core::config::AuthenticationMethod;
use fabric_livy_core::error::{LivyError, Result};
use std::future::Future;
use std::pin::Pin;

/// Environment variable read by [`StaticTokenSource::from_env`].
pub const ACCESS_TOKEN_VAR: &str = "FABRIC_ACCESS_TOKEN";

/// Validity assumed for a static token, since its real expiry is unknown.
pub const STATIC_TOKEN_LIFETIME_SECS: i64 = 4500;

#[derive(Debug, Clone)]
enum Origin {
    Fixed(String),
    Env(String),
}

/// Token source that returns a token it was given.
///
/// The expiry is synthetic: acquisition time plus
/// [`STATIC_TOKEN_LIFETIME_SECS`].
#[derive(Clone)]
pub struct StaticTokenSource {
    origin: Origin,
}

impl StaticTokenSource {
    /// Serve `token`.
    #[must_use]
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            origin: Origin::Fixed(token.into()),
        }
    }

    /// Read [`ACCESS_TOKEN_VAR`] on every acquisition.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_var(ACCESS_TOKEN_VAR)
    }

    /// Read `var` on every acquisition.
    #[must_use]
    pub fn from_var(var: impl Into<String>) -> Self {
        Self {
            origin: Origin::Env(var.into()),
        }
    }

    fn read(&self) -> Result<String> {
        match &self.origin {
            Origin::Fixed(token) => Ok(token.clone()),
            Origin::Env(var) => std::env::var(var).map_err(|e| {
                LivyError::Authentication(format!("could not read access token from {var}: {e}"))
            }),
        }
    }
}

impl std::fmt::Debug for StaticTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let origin = match &self.origin {
            Origin::Fixed(_) => "fixed".to_string(),
            Origin::Env(var) => format!("env:{var}"),
        };
        f.debug_struct("StaticTokenSource")
            .field("origin", &origin)
            .finish()
    }
}

impl TokenSource for StaticTokenSource {
    fn acquire(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken>> + Send + '_>> {
        let token = self.read().and_then(|token| {
            if token.trim().is_empty() {
                Err(LivyError::Authentication("access token is empty".to_string()))
            } else {
                Ok(AccessToken::new(
                    token,
                    now + Duration::seconds(STATIC_TOKEN_LIFETIME_SECS),
                ))
            }
        });
        Box::pin(async move { token })
    }

    fn method(&self) -> AuthenticationMethod {
        AuthenticationMethod::Static
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_livy_core::Clock;
    use fabric_livy_testing::test_clock;

    #[tokio::test]
    async fn synthetic_expiry_from_acquisition_time() {
        let now = test_clock().now();
        let token = StaticTokenSource::fixed("abc").acquire(now).await.unwrap();
        assert_eq!(token.secret(), "abc");
        assert_eq!((token.expires_on() - now).num_seconds(), 4500);
    }

    #[tokio::test]
    async fn missing_variable_is_an_authentication_error() {
        let source = StaticTokenSource::from_var("FABRIC_LIVY_TEST_SURELY_UNSET_TOKEN_VAR");
        let err = source.acquire(test_clock().now()).await.unwrap_err();
        assert!(matches!(err, LivyError::Authentication(_)));
    }

    #[tokio::test]
    async fn empty_token_is_rejected() {
        let err = StaticTokenSource::fixed("  ")
            .acquire(test_clock().now())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
