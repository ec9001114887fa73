//! Client-credentials exchange for a service principal.

use super::{FABRIC_SCOPE, TokenSource};
use crate::token::AccessToken;
use chrono::{DateTime, Duration, Utc};
use fabric_livy_core::config::AuthenticationMethod;
use fabric_livy_core::error::{LivyError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;

/// Default Microsoft identity platform authority.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Token source for a service principal (tenant / client id / secret).
///
/// # Example
///
/// ```no_run
/// use fabric_livy_auth::providers::ServicePrincipalTokenSource;
///
/// let source = ServicePrincipalTokenSource::new(
///     std::env::var("FABRIC_TENANT_ID").unwrap_or_default(),
///     std::env::var("FABRIC_CLIENT_ID").unwrap_or_default(),
///     std::env::var("FABRIC_CLIENT_SECRET").unwrap_or_default(),
/// );
/// ```
#[derive(Clone)]
pub struct ServicePrincipalTokenSource {
    /// Directory (tenant) id.
    tenant_id: String,

    /// Application (client) id.
    client_id: String,

    /// Client secret (keep confidential).
    client_secret: String,

    /// Authority root; overridable for sovereign clouds and tests.
    authority: String,

    /// HTTP client for making requests.
    http_client: Client,
}

impl ServicePrincipalTokenSource {
    /// Create a source against the public-cloud authority.
    #[must_use]
    pub fn new(tenant_id: String, client_id: String, client_secret: String) -> Self {
        Self {
            tenant_id,
            client_id,
            client_secret,
            authority: DEFAULT_AUTHORITY.to_string(),
            http_client: Client::new(),
        }
    }

    /// Use a different authority root.
    #[must_use]
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        )
    }

    async fn exchange(&self, now: DateTime<Utc>) -> Result<AccessToken> {
        // Build form data
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", FABRIC_SCOPE),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .http_client
            .post(self.token_url())
            .form(&params)
            .send()
            .await
            .map_err(|e| LivyError::Authentication(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!(%status, "Service principal token exchange failed: {}", error_body);
            return Err(LivyError::Authentication(format!(
                "service principal token exchange failed with status {status}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| LivyError::Authentication(e.to_string()))?;

        Ok(AccessToken::new(
            body.access_token,
            now + Duration::seconds(body.expires_in),
        ))
    }
}

impl std::fmt::Debug for ServicePrincipalTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePrincipalTokenSource")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("authority", &self.authority)
            .finish_non_exhaustive()
    }
}

impl TokenSource for ServicePrincipalTokenSource {
    fn acquire(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken>> + Send + '_>> {
        Box::pin(self.exchange(now))
    }

    fn method(&self) -> AuthenticationMethod {
        AuthenticationMethod::ServicePrincipal
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}
