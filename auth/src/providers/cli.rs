//! Tokens from the locally logged-in Azure CLI.

use super::{FABRIC_RESOURCE, TokenSource};
use crate::token::AccessToken;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use fabric_livy_core::config::AuthenticationMethod;
use fabric_livy_core::error::{LivyError, Result};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use tokio::process::Command;

/// Token source that shells out to `az account get-access-token`.
#[derive(Debug, Clone)]
pub struct AzureCliTokenSource {
    program: String,
    resource: String,
}

impl AzureCliTokenSource {
    /// Use the `az` binary on `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: "az".to_string(),
            resource: FABRIC_RESOURCE.to_string(),
        }
    }

    /// Use a specific CLI binary.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn run(&self) -> Result<AccessToken> {
        let output = Command::new(&self.program)
            .args([
                "account",
                "get-access-token",
                "--resource",
                &self.resource,
                "--output",
                "json",
            ])
            .output()
            .await
            .map_err(|e| {
                LivyError::Authentication(format!(
                    "could not run the Azure CLI ({}): {e}. Install it and run `az login`.",
                    self.program
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(status = %output.status, "Azure CLI token request failed");
            return Err(LivyError::Authentication(format!(
                "Azure CLI did not return a token: {}. Re-run `az login`.",
                stderr.trim()
            )));
        }

        parse_cli_token(&output.stdout)
    }
}

impl Default for AzureCliTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenSource for AzureCliTokenSource {
    fn acquire(
        &self,
        _now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken>> + Send + '_>> {
        Box::pin(self.run())
    }

    fn method(&self) -> AuthenticationMethod {
        AuthenticationMethod::Cli
    }
}

#[derive(Deserialize)]
struct CliToken {
    #[serde(rename = "accessToken")]
    access_token: String,
    /// Epoch seconds; reported by recent CLI versions.
    #[serde(default)]
    expires_on: Option<i64>,
    /// Local wall-clock time; reported by every CLI version.
    #[serde(rename = "expiresOn", default)]
    expires_on_local: Option<String>,
}

/// Parse the JSON printed by `az account get-access-token`.
///
/// # Errors
///
/// Returns [`LivyError::Authentication`] if the output is not a token
/// document or carries no usable expiry.
pub fn parse_cli_token(stdout: &[u8]) -> Result<AccessToken> {
    let raw: CliToken = serde_json::from_slice(stdout)
        .map_err(|e| LivyError::Authentication(format!("unexpected Azure CLI output: {e}")))?;

    let expires_on = match (raw.expires_on, raw.expires_on_local.as_deref()) {
        (Some(epoch), _) => DateTime::from_timestamp(epoch, 0),
        (None, Some(local)) => parse_local_expiry(local),
        (None, None) => None,
    }
    .ok_or_else(|| LivyError::Authentication("Azure CLI token has no expiry".to_string()))?;

    Ok(AccessToken::new(raw.access_token, expires_on))
}

fn parse_local_expiry(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_epoch_expiry() {
        let token = parse_cli_token(
            br#"{
                "accessToken": "eyJ0eXAi",
                "expiresOn": "2025-01-01 01:00:00.000000",
                "expires_on": 1735693200,
                "tokenType": "Bearer"
            }"#,
        )
        .unwrap();
        assert_eq!(token.secret(), "eyJ0eXAi");
        assert_eq!(token.expires_on().timestamp(), 1_735_693_200);
    }

    #[test]
    fn falls_back_to_local_expiry() {
        let token = parse_cli_token(
            br#"{"accessToken": "abc", "expiresOn": "2025-01-01 01:00:00.000000"}"#,
        )
        .unwrap();
        let expected = Local
            .with_ymd_and_hms(2025, 1, 1, 1, 0, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(token.expires_on(), expected);
    }

    #[test]
    fn rejects_garbage() {
        let err = parse_cli_token(b"ERROR: Please run 'az login'").unwrap_err();
        assert!(matches!(err, LivyError::Authentication(_)));

        let err = parse_cli_token(br#"{"accessToken": "abc"}"#).unwrap_err();
        assert!(err.to_string().contains("no expiry"));
    }

    #[tokio::test]
    async fn missing_binary_is_an_authentication_error() {
        let source = AzureCliTokenSource::new().with_program("fabric-livy-no-such-az-binary");
        let err = source.acquire(Utc::now()).await.unwrap_err();
        assert!(err.to_string().contains("az login"));
    }
}
