//! Livy session wire types.

use crate::error::{LivyError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Session identifier assigned by the control plane.
///
/// Some deployments return numeric ids, others GUID strings; both are kept
/// as their string rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        id_from_json(deserializer).map(Self)
    }
}

impl SessionId {
    /// Wrap a raw identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as used in URLs.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render a JSON id (string or number) as a string.
///
/// Returns `None` for any other JSON shape.
#[must_use]
pub fn id_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn id_from_json<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    id_to_string(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected string or number id, got {value}")))
}

/// Lifecycle state reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum SessionState {
    /// Accepted but not scheduled yet
    NotStarted,
    /// Resources are being acquired
    Starting,
    /// Ready for statements
    Idle,
    /// Running a statement
    Busy,
    /// Being torn down
    ShuttingDown,
    /// Failed while running
    Error,
    /// Terminated abnormally
    Dead,
    /// Terminated by request
    Killed,
    /// Finished successfully (batch semantics)
    Success,
    /// Recovering after a driver restart
    Recovering,
    /// Anything this client does not know about
    Unknown(String),
}

impl From<String> for SessionState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "not_started" => Self::NotStarted,
            "starting" => Self::Starting,
            "idle" => Self::Idle,
            "busy" => Self::Busy,
            "shutting_down" => Self::ShuttingDown,
            "error" => Self::Error,
            "dead" => Self::Dead,
            "killed" => Self::Killed,
            "success" => Self::Success,
            "recovering" => Self::Recovering,
            _ => Self::Unknown(value),
        }
    }
}

impl SessionState {
    /// Still being provisioned.
    #[must_use]
    pub const fn is_starting(&self) -> bool {
        matches!(self, Self::NotStarted | Self::Starting)
    }

    /// A session in this state must be discarded, never reused.
    #[must_use]
    pub const fn is_unusable(&self) -> bool {
        matches!(self, Self::Dead | Self::ShuttingDown | Self::Killed)
    }

    /// Wire name of the state.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::NotStarted => "not_started",
            Self::Starting => "starting",
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::ShuttingDown => "shutting_down",
            Self::Error => "error",
            Self::Dead => "dead",
            Self::Killed => "killed",
            Self::Success => "success",
            Self::Recovering => "recovering",
            Self::Unknown(other) => other,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nested Livy liveness block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LivyInfo {
    /// Liveness of the underlying Livy session
    #[serde(rename = "currentState")]
    pub current_state: Option<SessionState>,
}

/// Session resource as returned by `GET /sessions/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionInfo {
    /// Session id
    pub id: SessionId,
    /// Top-level scheduling state
    pub state: SessionState,
    /// Nested liveness, when reported
    #[serde(rename = "livyInfo", default)]
    pub livy_info: Option<LivyInfo>,
}

impl SessionInfo {
    /// Nested liveness, falling back to the top-level state.
    #[must_use]
    pub fn liveness(&self) -> &SessionState {
        self.livy_info
            .as_ref()
            .and_then(|info| info.current_state.as_ref())
            .unwrap_or(&self.state)
    }
}

/// Session creation settings (`spark_config` in a profile).
///
/// Only `name` is required. Values in `conf` and `tags` are always sent as
/// strings; numeric or boolean profile values are stringified on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Session display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Spark configuration
    #[serde(
        default,
        deserialize_with = "stringified_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub conf: BTreeMap<String, String>,
    /// Free-form tags
    #[serde(
        default,
        deserialize_with = "stringified_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub tags: BTreeMap<String, String>,
    /// Archives to ship with the session
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub archives: Vec<String>,
    /// Driver memory, e.g. `"2g"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_memory: Option<String>,
    /// Driver cores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_cores: Option<u32>,
    /// Executor memory, e.g. `"4g"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_memory: Option<String>,
    /// Executor cores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_cores: Option<u32>,
    /// Number of executors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_executors: Option<u32>,
}

impl SessionConfig {
    /// Config with only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Add a Spark conf entry.
    #[must_use]
    pub fn with_conf(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conf.insert(key.into(), value.into());
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

fn stringified_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

/// Body of `POST /sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SessionRequest(SessionConfig);

impl SessionRequest {
    /// Validate a session config into a request body.
    ///
    /// # Errors
    ///
    /// Returns [`LivyError::Validation`] if `name` is missing or blank.
    pub fn new(config: SessionConfig) -> Result<Self> {
        match config.name.as_deref() {
            Some(name) if !name.trim().is_empty() => Ok(Self(config)),
            _ => Err(LivyError::Validation(
                "Missing required key: name".to_string(),
            )),
        }
    }

    /// Session name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.name.as_deref().unwrap_or_default()
    }

    /// The underlying config.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_info_accepts_numeric_and_string_ids() {
        let numeric: SessionInfo = serde_json::from_value(json!({
            "id": 7,
            "state": "idle",
            "livyInfo": {"currentState": "idle"}
        }))
        .unwrap();
        assert_eq!(numeric.id.as_str(), "7");

        let guid: SessionInfo = serde_json::from_value(json!({
            "id": "5a1f9c7e-0000-4000-8000-000000000000",
            "state": "starting"
        }))
        .unwrap();
        assert_eq!(guid.id.as_str(), "5a1f9c7e-0000-4000-8000-000000000000");
        assert_eq!(guid.liveness(), &SessionState::Starting);
    }

    #[test]
    fn liveness_prefers_nested_state() {
        let info: SessionInfo = serde_json::from_value(json!({
            "id": "1",
            "state": "idle",
            "livyInfo": {"currentState": "dead"}
        }))
        .unwrap();
        assert_eq!(info.liveness(), &SessionState::Dead);
        assert!(info.liveness().is_unusable());
    }

    #[test]
    fn unknown_states_are_preserved() {
        let state = SessionState::from("rebalancing".to_string());
        assert_eq!(state, SessionState::Unknown("rebalancing".to_string()));
        assert_eq!(state.to_string(), "rebalancing");
        assert!(!state.is_unusable());
    }

    #[test]
    fn unusable_states() {
        for state in ["dead", "killed", "shutting_down"] {
            assert!(SessionState::from(state.to_string()).is_unusable());
        }
        for state in ["idle", "busy", "starting", "not_started"] {
            assert!(!SessionState::from(state.to_string()).is_unusable());
        }
    }

    #[test]
    fn session_config_serializes_camel_case_and_stringifies_conf() {
        let config: SessionConfig = serde_json::from_value(json!({
            "name": "dbt-session",
            "conf": {"spark.executor.cores": 2, "spark.dynamicAllocation.enabled": true},
            "driverMemory": "2g",
            "numExecutors": 3
        }))
        .unwrap();
        assert_eq!(config.conf["spark.executor.cores"], "2");
        assert_eq!(config.conf["spark.dynamicAllocation.enabled"], "true");

        let request = SessionRequest::new(config).unwrap();
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["name"], "dbt-session");
        assert_eq!(body["driverMemory"], "2g");
        assert_eq!(body["numExecutors"], 3);
        assert!(body.get("tags").is_none());
    }

    #[test]
    fn session_request_requires_name() {
        let err = SessionRequest::new(SessionConfig::default()).unwrap_err();
        assert_eq!(err, LivyError::Validation("Missing required key: name".to_string()));
    }
}
