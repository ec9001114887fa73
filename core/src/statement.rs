//! Livy statement wire types and result extraction.

use crate::error::{LivyError, Result};
use crate::session::id_to_string;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// MIME key of tabular statement output.
pub const JSON_OUTPUT: &str = "application/json";

/// MIME key of plain-text statement output.
pub const TEXT_OUTPUT: &str = "text/plain";

/// One result row, values in schema order.
pub type Row = Vec<serde_json::Value>;

/// Statement identifier assigned by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StatementId(String);

impl<'de> Deserialize<'de> for StatementId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        crate::session::id_from_json(deserializer).map(Self)
    }
}

impl StatementId {
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

    /// Parse from a raw JSON id.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        id_to_string(value).map(Self)
    }
}

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Interpreter a statement is submitted to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    /// Spark SQL
    #[default]
    Sql,
    /// Python
    Pyspark,
    /// Scala
    Spark,
    /// R
    Sparkr,
}

impl StatementKind {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Pyspark => "pyspark",
            Self::Spark => "spark",
            Self::Sparkr => "sparkr",
        }
    }
}

/// Body of `POST /sessions/{id}/statements`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementRequest {
    /// Code to run
    pub code: String,
    /// Interpreter
    pub kind: StatementKind,
}

impl StatementRequest {
    /// A SQL statement.
    #[must_use]
    pub fn sql(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            kind: StatementKind::Sql,
        }
    }
}

/// Progress of a statement.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum StatementState {
    /// Queued behind another statement
    Waiting,
    /// Executing
    Running,
    /// Finished; output is present
    Available,
    /// Failed before producing output
    Error,
    /// Cancel requested
    Cancelling,
    /// Cancelled
    Cancelled,
    /// Anything this client does not know about
    Unknown(String),
}

impl From<String> for StatementState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "waiting" => Self::Waiting,
            "running" => Self::Running,
            "available" => Self::Available,
            "error" => Self::Error,
            "cancelling" => Self::Cancelling,
            "cancelled" => Self::Cancelled,
            _ => Self::Unknown(value),
        }
    }
}

/// Statement resource as returned by `GET /sessions/{id}/statements/{id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatementInfo {
    /// Statement id
    pub id: StatementId,
    /// Progress
    pub state: StatementState,
    /// Output, present once `state` is `available`
    #[serde(default)]
    pub output: Option<StatementOutput>,
}

/// Output block of a finished statement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatementOutput {
    /// `"ok"` or `"error"`
    pub status: String,
    /// Interpreter execution counter
    #[serde(default)]
    pub execution_count: Option<u64>,
    /// MIME-keyed payloads
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
    /// Error name
    #[serde(default)]
    pub ename: Option<String>,
    /// Error value (message)
    #[serde(default)]
    pub evalue: Option<String>,
    /// Remote traceback lines
    #[serde(default)]
    pub traceback: Vec<String>,
}

impl StatementOutput {
    /// Whether the remote engine reported success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// Error text reported by the remote engine.
    #[must_use]
    pub fn error_message(&self) -> String {
        match (&self.ename, &self.evalue) {
            (_, Some(value)) => value.clone(),
            (Some(name), None) => name.clone(),
            (None, None) => format!("statement finished with status '{}'", self.status),
        }
    }

    /// Extract the tabular payload.
    ///
    /// A missing or empty `application/json` payload is an empty result set,
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns [`LivyError::InvalidResponse`] if the payload is present but
    /// does not have the `{data, schema: {fields}}` shape.
    pub fn result_set(&self) -> Result<ResultSet> {
        let Some(payload) = self.data.get(JSON_OUTPUT) else {
            return Ok(ResultSet::default());
        };
        match payload {
            serde_json::Value::Null => Ok(ResultSet::default()),
            serde_json::Value::Object(map) if map.is_empty() => Ok(ResultSet::default()),
            other => {
                let raw: RawTable = serde_json::from_value(other.clone())
                    .map_err(|e| LivyError::InvalidResponse(format!("malformed result set: {e}")))?;
                Ok(ResultSet {
                    rows: raw.data,
                    fields: raw.schema.fields,
                })
            }
        }
    }

    /// Plain-text payload, split into lines.
    #[must_use]
    pub fn text_lines(&self) -> Vec<String> {
        self.data
            .get(TEXT_OUTPUT)
            .and_then(serde_json::Value::as_str)
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct RawTable {
    #[serde(default)]
    data: Vec<Row>,
    #[serde(default)]
    schema: RawSchema,
}

#[derive(Default, Deserialize)]
struct RawSchema {
    #[serde(default)]
    fields: Vec<Field>,
}

/// One column of a result schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Column name
    pub name: String,
    /// Spark type: a name such as `"integer"`, or a nested type object
    #[serde(rename = "type")]
    pub data_type: serde_json::Value,
    /// Whether nulls are allowed
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

const fn default_nullable() -> bool {
    true
}

impl Field {
    /// The type rendered as a string.
    #[must_use]
    pub fn type_name(&self) -> String {
        match &self.data_type {
            serde_json::Value::String(name) => name.clone(),
            other => other.to_string(),
        }
    }
}

/// Rows plus schema of a finished statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Row values
    pub rows: Vec<Row>,
    /// Column schema
    pub fields: Vec<Field>,
}

/// Cursor column description.
///
/// Carries the three meaningful members of the conventional 7-member
/// description; see [`ColumnDescription::as_tuple`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    /// Column name
    pub name: String,
    /// Remote type name
    pub type_code: String,
    /// Whether nulls are allowed
    pub nullable: bool,
}

/// `(name, type, display_size, internal_size, precision, scale, nullable)`.
pub type DescriptionTuple = (
    String,
    String,
    Option<u32>,
    Option<u32>,
    Option<u32>,
    Option<u32>,
    bool,
);

impl ColumnDescription {
    /// The conventional 7-member shape; the four sizes are always `None`.
    #[must_use]
    pub fn as_tuple(&self) -> DescriptionTuple {
        (
            self.name.clone(),
            self.type_code.clone(),
            None,
            None,
            None,
            None,
            self.nullable,
        )
    }
}

impl From<&Field> for ColumnDescription {
    fn from(field: &Field) -> Self {
        Self {
            name: field.name.clone(),
            type_code: field.type_name(),
            nullable: field.nullable,
        }
    }
}
