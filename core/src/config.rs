//! Connection configuration.
//!
//! [`FabricSparkConfig`] is what a profile loader hands to this workspace.
//! It can be deserialized from any serde format or read from `FABRIC_*`
//! environment variables, and must pass [`FabricSparkConfig::validated`]
//! before any network call is made.

use crate::error::{LivyError, Result};
use crate::session::{SessionConfig, SessionRequest};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default Fabric REST root.
pub const DEFAULT_ENDPOINT: &str = "https://api.fabric.microsoft.com/v1";

/// Versioned Livy API root under a lakehouse.
pub const LIVY_API_VERSION: &str = "2023-12-01";

/// Default seconds between session-status polls.
pub const DEFAULT_SESSION_POLL_SECS: u64 = 45;

/// Default seconds between statement-status polls.
pub const DEFAULT_STATEMENT_POLL_SECS: u64 = 5;

/// How the identity-provider token is obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AuthenticationMethod {
    /// Token from the locally logged-in Azure CLI
    #[default]
    Cli,
    /// Client-credentials exchange with tenant / client id / secret
    ServicePrincipal,
    /// Pre-supplied token (e.g. injected into a notebook)
    Static,
}

impl AuthenticationMethod {
    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::ServicePrincipal => "service_principal",
            Self::Static => "static",
        }
    }
}

impl FromStr for AuthenticationMethod {
    type Err = LivyError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "cli" | "az_cli" | "azure_cli" => Ok(Self::Cli),
            "spn" | "service_principal" | "serviceprincipal" => Ok(Self::ServicePrincipal),
            "static" | "token" | "notebook" => Ok(Self::Static),
            other => Err(LivyError::Configuration(format!(
                "unknown authentication method '{other}' (expected cli, service_principal or static)"
            ))),
        }
    }
}

impl TryFrom<String> for AuthenticationMethod {
    type Error = LivyError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<AuthenticationMethod> for String {
    fn from(value: AuthenticationMethod) -> Self {
        value.as_str().to_string()
    }
}

/// Where shortcut definitions come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortcutSource {
    /// JSON document given inline
    Inline(String),
    /// Path to a JSON document
    File(PathBuf),
}

impl ShortcutSource {
    /// Read the JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`LivyError::Configuration`] if the file cannot be read.
    pub fn read(&self) -> Result<String> {
        match self {
            Self::Inline(json) => Ok(json.clone()),
            Self::File(path) => std::fs::read_to_string(path).map_err(|e| {
                LivyError::Configuration(format!(
                    "Could not read shortcuts JSON file at {}: {e}",
                    path.display()
                ))
            }),
        }
    }
}

/// Connection settings for one lakehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricSparkConfig {
    /// Workspace GUID
    pub workspace_id: Option<String>,
    /// Lakehouse GUID
    pub lakehouse_id: Option<String>,
    /// Lakehouse name
    pub lakehouse: Option<String>,
    /// Target schema
    pub schema: Option<String>,
    /// Not supported; must stay unset
    pub database: Option<String>,
    /// Whether the lakehouse has schemas enabled
    pub lakehouse_schemas_enabled: bool,
    /// Fabric REST root
    pub endpoint: String,
    /// Token acquisition mode
    pub authentication: AuthenticationMethod,
    /// Service principal tenant
    pub tenant_id: Option<String>,
    /// Service principal client id
    pub client_id: Option<String>,
    /// Service principal secret
    pub client_secret: Option<String>,
    /// Pre-supplied token for [`AuthenticationMethod::Static`]
    pub access_token: Option<String>,
    /// Extra connect attempts after the first
    pub connect_retries: u32,
    /// Seconds to wait between connect attempts
    pub connect_timeout: u64,
    /// Retry every connect failure, not just transient-looking ones
    pub retry_all: bool,
    /// Livy session settings
    pub session_config: SessionConfig,
    /// Provision shortcuts when a new session is created
    pub create_shortcuts: bool,
    /// Inline shortcut definitions
    pub shortcuts_json_str: Option<String>,
    /// Shortcut definitions file
    pub shortcuts_json_path: Option<PathBuf>,
    /// Seconds between session-status polls
    pub session_poll_interval: u64,
    /// Seconds between statement-status polls
    pub statement_poll_interval: u64,
}

impl Default for FabricSparkConfig {
    fn default() -> Self {
        Self {
            workspace_id: None,
            lakehouse_id: None,
            lakehouse: None,
            schema: None,
            database: None,
            lakehouse_schemas_enabled: false,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            authentication: AuthenticationMethod::Cli,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            access_token: None,
            connect_retries: 1,
            connect_timeout: 10,
            retry_all: false,
            session_config: SessionConfig::default(),
            create_shortcuts: false,
            shortcuts_json_str: None,
            shortcuts_json_path: None,
            session_poll_interval: DEFAULT_SESSION_POLL_SECS,
            statement_poll_interval: DEFAULT_STATEMENT_POLL_SECS,
        }
    }
}

impl FabricSparkConfig {
    /// Read settings from `FABRIC_*` environment variables.
    ///
    /// The result still has to be validated.
    ///
    /// # Errors
    ///
    /// Returns [`LivyError::Configuration`] if a numeric or boolean variable
    /// does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`LivyError::Configuration`] if a numeric or boolean variable
    /// does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            workspace_id: lookup("FABRIC_WORKSPACE_ID"),
            lakehouse_id: lookup("FABRIC_LAKEHOUSE_ID"),
            lakehouse: lookup("FABRIC_LAKEHOUSE"),
            schema: lookup("FABRIC_SCHEMA"),
            tenant_id: lookup("FABRIC_TENANT_ID"),
            client_id: lookup("FABRIC_CLIENT_ID"),
            client_secret: lookup("FABRIC_CLIENT_SECRET"),
            access_token: lookup("FABRIC_ACCESS_TOKEN"),
            shortcuts_json_path: lookup("FABRIC_SHORTCUTS_JSON").map(PathBuf::from),
            ..Self::default()
        };
        if let Some(endpoint) = lookup("FABRIC_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(method) = lookup("FABRIC_AUTHENTICATION") {
            config.authentication = method.parse()?;
        }
        if let Some(value) = lookup("FABRIC_CONNECT_RETRIES") {
            config.connect_retries = parse_var("FABRIC_CONNECT_RETRIES", &value)?;
        }
        if let Some(value) = lookup("FABRIC_CONNECT_TIMEOUT") {
            config.connect_timeout = parse_var("FABRIC_CONNECT_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("FABRIC_RETRY_ALL") {
            config.retry_all = parse_var("FABRIC_RETRY_ALL", &value)?;
        }
        if let Some(value) = lookup("FABRIC_CREATE_SHORTCUTS") {
            config.create_shortcuts = parse_var("FABRIC_CREATE_SHORTCUTS", &value)?;
        }
        config.session_config.name = lookup("FABRIC_SESSION_NAME");
        Ok(config)
    }

    /// Check required settings without consuming the configuration.
    ///
    /// # Errors
    ///
    /// See [`FabricSparkConfig::validated`].
    pub fn validate(&self) -> Result<()> {
        self.clone().validated().map(drop)
    }

    /// Check required settings and normalise the schema.
    ///
    /// When lakehouse schemas are disabled and a lakehouse name is given,
    /// the schema becomes the lakehouse name.
    ///
    /// # Errors
    ///
    /// Returns [`LivyError::Configuration`] naming the first problem found.
    pub fn validated(mut self) -> Result<Self> {
        if self.workspace_id.is_none() {
            return Err(config_error("Must specify `workspace guid` in profile"));
        }
        if self.lakehouse_id.is_none() {
            return Err(config_error("Must specify `lakehouse guid` in profile"));
        }
        if self.schema.is_none() {
            return Err(config_error("Must specify `schema` in profile"));
        }
        if self.database.is_some() {
            return Err(config_error(
                "database property is not supported by adapter. Set database as none and use lakehouse instead.",
            ));
        }
        if !self.lakehouse_schemas_enabled {
            if let Some(lakehouse) = &self.lakehouse {
                self.schema = Some(lakehouse.clone());
            }
        }
        if self.authentication == AuthenticationMethod::ServicePrincipal {
            for (key, value) in [
                ("tenant_id", &self.tenant_id),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ] {
                if value.as_deref().is_none_or(str::is_empty) {
                    return Err(config_error(&format!(
                        "The config '{key}' is required when using service principal authentication"
                    )));
                }
            }
        }
        if self.create_shortcuts && self.shortcut_source().is_none() {
            return Err(config_error(
                "create_shortcuts is enabled but neither shortcuts_json_str nor shortcuts_json_path is set",
            ));
        }
        SessionRequest::new(self.session_config.clone())
            .map_err(|e| LivyError::Configuration(e.to_string()))?;
        Ok(self)
    }

    /// Livy API root for this lakehouse.
    #[must_use]
    pub fn lakehouse_endpoint(&self) -> String {
        format!(
            "{}/workspaces/{}/lakehouses/{}/livyapi/versions/{LIVY_API_VERSION}",
            self.endpoint.trim_end_matches('/'),
            self.workspace_id.as_deref().unwrap_or_default(),
            self.lakehouse_id.as_deref().unwrap_or_default(),
        )
    }

    /// Shortcut definitions, inline text taking precedence over a path.
    #[must_use]
    pub fn shortcut_source(&self) -> Option<ShortcutSource> {
        self.shortcuts_json_str
            .clone()
            .map(ShortcutSource::Inline)
            .or_else(|| self.shortcuts_json_path.clone().map(ShortcutSource::File))
    }

    /// Wait between connect attempts.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Wait between session-status polls.
    #[must_use]
    pub const fn session_poll_interval(&self) -> Duration {
        Duration::from_secs(self.session_poll_interval)
    }

    /// Wait between statement-status polls.
    #[must_use]
    pub const fn statement_poll_interval(&self) -> Duration {
        Duration::from_secs(self.statement_poll_interval)
    }

    /// Session creation body.
    ///
    /// # Errors
    ///
    /// Returns [`LivyError::Validation`] if the session name is missing.
    pub fn session_request(&self) -> Result<SessionRequest> {
        SessionRequest::new(self.session_config.clone())
    }
}

fn config_error(message: &str) -> LivyError {
    LivyError::Configuration(message.to_string())
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| LivyError::Configuration(format!("{key} has an invalid value '{value}'")))
}
