//! # Fabric Livy Authentication
//!
//! Bearer tokens for Fabric REST and Livy endpoints.
//!
//! ## Sources
//!
//! - **Azure CLI**: the locally logged-in identity (`az login`)
//! - **Service principal**: client-credentials exchange with a tenant, client id and secret
//! - **Static**: a token handed over by the caller or a notebook host
//!
//! [`CredentialProvider`] sits in front of a source and caches the token,
//! acquiring a new one whenever fewer than five minutes of validity remain.
//!
//! ## Example
//!
//! ```
//! use fabric_livy_auth::{CredentialProvider, providers::StaticTokenSource};
//! use fabric_livy_core::SystemClock;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> fabric_livy_core::Result<()> {
//! let provider = CredentialProvider::new(
//!     Arc::new(StaticTokenSource::fixed("token")),
//!     Arc::new(SystemClock),
//! );
//! let headers = provider.get_auth_header(false).await?;
//! assert_eq!(headers["authorization"], "Bearer token");
//! # Ok(())
//! # }
//! ```

pub mod credential;
pub mod providers;
pub mod token;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use credential::CredentialProvider;
pub use providers::{FABRIC_SCOPE, TokenSource};
pub use token::AccessToken;
