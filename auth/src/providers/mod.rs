//! Token sources.
//!
//! A [`TokenSource`] knows how to obtain one fresh [`AccessToken`]. Caching
//! and expiry handling live in [`crate::CredentialProvider`]; sources are
//! called only when a new token is actually needed.

use crate::token::AccessToken;
use chrono::{DateTime, Utc};
use fabric_livy_core::config::{AuthenticationMethod, FabricSparkConfig};
use fabric_livy_core::error::{LivyError, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub mod cli;
pub mod service_principal;
pub mod static_token;

pub use cli::AzureCliTokenSource;
pub use service_principal::ServicePrincipalTokenSource;
pub use static_token::StaticTokenSource;

/// Audience of every token requested for Fabric.
pub const FABRIC_SCOPE: &str = "https://analysis.windows.net/powerbi/api/.default";

/// Resource form of [`FABRIC_SCOPE`], as the Azure CLI expects it.
pub const FABRIC_RESOURCE: &str = "https://analysis.windows.net/powerbi/api";

/// Source of fresh access tokens.
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so the configured source can be held as a trait object.
pub trait TokenSource: Send + Sync {
    /// Obtain a new token.
    ///
    /// `now` is the caller's notion of the current time, used for sources
    /// that only report a relative lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`LivyError::Authentication`] if no token can be obtained.
    fn acquire(
        &self,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken>> + Send + '_>>;

    /// Which acquisition mode this source implements.
    fn method(&self) -> AuthenticationMethod;
}

/// Build the token source selected by `config.authentication`.
///
/// # Errors
///
/// Returns [`LivyError::Configuration`] if a mode-specific setting is missing.
pub fn from_config(config: &FabricSparkConfig) -> Result<Arc<dyn TokenSource>> {
    let source: Arc<dyn TokenSource> = match config.authentication {
        AuthenticationMethod::Cli => Arc::new(AzureCliTokenSource::new()),
        AuthenticationMethod::ServicePrincipal => {
            let required = |value: &Option<String>, key: &str| {
                value.clone().filter(|v| !v.is_empty()).ok_or_else(|| {
                    LivyError::Configuration(format!(
                        "The config '{key}' is required when using service principal authentication"
                    ))
                })
            };
            Arc::new(ServicePrincipalTokenSource::new(
                required(&config.tenant_id, "tenant_id")?,
                required(&config.client_id, "client_id")?,
                required(&config.client_secret, "client_secret")?,
            ))
        }
        AuthenticationMethod::Static => match &config.access_token {
            Some(token) => Arc::new(StaticTokenSource::fixed(token.clone())),
            None => Arc::new(StaticTokenSource::from_env()),
        },
    };
    Ok(source)
}
