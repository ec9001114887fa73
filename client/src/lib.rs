//! # Fabric Livy Client
//!
//! Typed async client for the Livy session and statement endpoints of a
//! Fabric lakehouse.
//!
//! ## Example
//!
//! ```no_run
//! use fabric_livy_auth::CredentialProvider;
//! use fabric_livy_client::LivyClient;
//! use fabric_livy_core::{FabricSparkConfig, StatementRequest};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FabricSparkConfig::from_env()?.validated()?;
//!     let credentials = Arc::new(CredentialProvider::from_config(&config)?);
//!     let client = LivyClient::from_config(&config, credentials);
//!
//!     let session = client.create_session(&config.session_request()?).await?;
//!     let statement = client
//!         .submit_statement(&session, &StatementRequest::sql("select 1"))
//!         .await?;
//!     println!("{:?}", client.get_statement(&session, &statement).await?);
//!     Ok(())
//! }
//! ```
//!
//! The client issues single requests only. Polling, retries and session
//! reuse live in `fabric-livy-runtime`.

pub mod client;

pub use client::LivyClient;
