//! Expiry-aware token cache.

use crate::providers::{self, TokenSource};
use crate::token::AccessToken;
use fabric_livy_core::config::FabricSparkConfig;
use fabric_livy_core::environment::{Clock, SystemClock};
use fabric_livy_core::error::{LivyError, Result};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Hands out bearer headers, acquiring a new token when the cached one is
/// missing or close to expiry.
///
/// The cached token is replaced as a whole (`Arc` swap under a lock), so a
/// concurrent reader sees either the old or the new token, never a mix.
/// Two contexts refreshing at once both acquire; the last write wins.
pub struct CredentialProvider {
    source: Arc<dyn TokenSource>,
    clock: Arc<dyn Clock>,
    cached: RwLock<Option<Arc<AccessToken>>>,
}

impl CredentialProvider {
    /// Provider over an explicit source and clock.
    #[must_use]
    pub fn new(source: Arc<dyn TokenSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            cached: RwLock::new(None),
        }
    }

    /// Provider for the source selected by `config.authentication`, on the
    /// wall clock.
    ///
    /// # Errors
    ///
    /// Returns [`LivyError::Configuration`] if a mode-specific setting is
    /// missing.
    pub fn from_config(config: &FabricSparkConfig) -> Result<Self> {
        Ok(Self::new(providers::from_config(config)?, Arc::new(SystemClock)))
    }

    /// A token that is good for at least five more minutes.
    ///
    /// With `force_refresh` a new token is acquired regardless of the cache.
    ///
    /// # Errors
    ///
    /// Returns [`LivyError::Authentication`] if acquisition fails; the
    /// previously cached token is left in place.
    pub async fn access_token(&self, force_refresh: bool) -> Result<Arc<AccessToken>> {
        let now = self.clock.now();
        if !force_refresh {
            if let Some(token) = self.cached.read().await.as_ref() {
                if !token.needs_refresh(now) {
                    return Ok(Arc::clone(token));
                }
            }
        }

        tracing::debug!(
            method = self.source.method().as_str(),
            force_refresh,
            "Acquiring access token"
        );
        let token = Arc::new(self.source.acquire(now).await?);
        tracing::info!(
            method = self.source.method().as_str(),
            expires_on = %token.expires_on(),
            "Access token acquired"
        );

        *self.cached.write().await = Some(Arc::clone(&token));
        Ok(token)
    }

    /// `Authorization: Bearer <token>` header.
    ///
    /// # Errors
    ///
    /// Returns [`LivyError::Authentication`] if no token can be obtained or
    /// the token is not a valid header value.
    pub async fn get_auth_header(&self, force_refresh: bool) -> Result<HeaderMap> {
        let token = self.access_token(force_refresh).await?;
        let mut value = HeaderValue::from_str(&token.bearer()).map_err(|_| {
            LivyError::Authentication("access token contains invalid characters".to_string())
        })?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// The cached token, if any, without refreshing.
    pub async fn cached(&self) -> Option<Arc<AccessToken>> {
        self.cached.read().await.clone()
    }

    /// Drop the cached token.
    pub async fn clear(&self) {
        *self.cached.write().await = None;
    }
}

impl std::fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialProvider")
            .field("method", &self.source.method())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockTokenSource;
    use chrono::Duration;
    use fabric_livy_testing::ManualClock;

    fn provider(source: &MockTokenSource) -> (CredentialProvider, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let provider = CredentialProvider::new(
            Arc::new(source.clone()),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        (provider, clock)
    }

    #[tokio::test]
    async fn acquires_lazily_and_reuses() {
        let source = MockTokenSource::new();
        let (provider, _clock) = provider(&source);
        assert!(provider.cached().await.is_none());
        assert_eq!(source.issued(), 0);

        let headers = provider.get_auth_header(false).await.unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer token-1");
        provider.get_auth_header(false).await.unwrap();
        assert_eq!(source.issued(), 1);
    }

    #[tokio::test]
    async fn refreshes_inside_the_margin() {
        let source = MockTokenSource::with_lifetime(Duration::minutes(30));
        let (provider, clock) = provider(&source);
        provider.access_token(false).await.unwrap();

        clock.advance(std::time::Duration::from_secs(24 * 60));
        assert_eq!(provider.access_token(false).await.unwrap().secret(), "token-1");

        // 4 minutes 59 seconds left
        clock.advance(std::time::Duration::from_secs(61));
        assert_eq!(provider.access_token(false).await.unwrap().secret(), "token-2");
        assert_eq!(source.issued(), 2);
    }

    #[tokio::test]
    async fn force_refresh_always_acquires() {
        let source = MockTokenSource::new();
        let (provider, _clock) = provider(&source);
        provider.access_token(false).await.unwrap();
        let token = provider.access_token(true).await.unwrap();
        assert_eq!(token.secret(), "token-2");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_token() {
        let source = MockTokenSource::with_lifetime(Duration::minutes(4));
        let (provider, _clock) = provider(&source);
        provider.access_token(false).await.unwrap();

        source.set_failing(true);
        let err = provider.access_token(false).await.unwrap_err();
        assert!(matches!(err, LivyError::Authentication(_)));
        assert_eq!(provider.cached().await.unwrap().secret(), "token-1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_refreshes_never_tear() {
        let source = MockTokenSource::new();
        let (provider, _clock) = provider(&source);
        let provider = Arc::new(provider);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.access_token(true).await })
            })
            .collect();
        for task in tasks {
            let token = task.await.unwrap().unwrap();
            assert!(token.secret().starts_with("token-"));
        }

        let cached = provider.cached().await.unwrap();
        let n: usize = cached.secret().trim_start_matches("token-").parse().unwrap();
        assert!((1..=16).contains(&n));
        assert_eq!(source.issued(), 16);
    }
}
