//! Shortcut definitions and their validation.
//!
//! Definitions come from a JSON array such as:
//!
//! ```json
//! [
//!   {
//!     "path": "Tables",
//!     "shortcut_name": "customers",
//!     "target": "onelake",
//!     "source_workspace_id": "...",
//!     "source_item_id": "...",
//!     "source_path": "Tables/customers"
//!   }
//! ]
//! ```
//!
//! Every entry is validated while parsing, so an invalid definition never
//! reaches the network.

use fabric_livy_core::config::ShortcutSource;
use fabric_livy_core::error::{LivyError, Result};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::fmt;

/// Storage a shortcut points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortcutTarget {
    /// Another OneLake item
    OneLake {
        /// Source workspace id
        workspace_id: String,
        /// Source item id
        item_id: String,
        /// Path inside the source item
        path: String,
    },
    /// An S3 bucket through a Fabric connection
    AmazonS3 {
        /// Bucket URL
        location: String,
        /// Path inside the bucket
        subpath: String,
        /// Fabric connection id
        connection_id: String,
    },
    /// An ADLS Gen2 account through a Fabric connection
    AdlsGen2 {
        /// Account URL
        location: String,
        /// Container and path
        subpath: String,
        /// Fabric connection id
        connection_id: String,
    },
    /// A Dataverse table
    Dataverse {
        /// Fabric connection id
        connection_id: String,
        /// Delta Lake folder of the table
        delta_lake_folder: String,
        /// Dataverse environment URL
        environment_domain: String,
        /// Table name
        table_name: String,
    },
}

impl ShortcutTarget {
    /// Key of this target kind in REST bodies.
    #[must_use]
    pub const fn api_key(&self) -> &'static str {
        match self {
            Self::OneLake { .. } => "oneLake",
            Self::AmazonS3 { .. } => "amazonS3",
            Self::AdlsGen2 { .. } => "adlsGen2",
            Self::Dataverse { .. } => "dataverse",
        }
    }

    fn fields(&self) -> Map<String, Value> {
        let pairs: Vec<(&str, &str)> = match self {
            Self::OneLake {
                workspace_id,
                item_id,
                path,
            } => vec![
                ("workspaceId", workspace_id.as_str()),
                ("itemId", item_id.as_str()),
                ("path", path.as_str()),
            ],
            Self::AmazonS3 {
                location,
                subpath,
                connection_id,
            }
            | Self::AdlsGen2 {
                location,
                subpath,
                connection_id,
            } => vec![
                ("location", location.as_str()),
                ("subpath", subpath.as_str()),
                ("connectionId", connection_id.as_str()),
            ],
            Self::Dataverse {
                connection_id,
                delta_lake_folder,
                environment_domain,
                table_name,
            } => vec![
                ("connectionId", connection_id.as_str()),
                ("deltaLakeFolder", delta_lake_folder.as_str()),
                ("environmentDomain", environment_domain.as_str()),
                ("tableName", table_name.as_str()),
            ],
        };
        pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
            .collect()
    }

    /// The `target` body sent when creating the shortcut.
    #[must_use]
    pub fn body(&self) -> Value {
        json!({ self.api_key(): Value::Object(self.fields()) })
    }

    /// Whether an existing shortcut's `target` body points at the same
    /// storage.
    ///
    /// The kind key is matched case-insensitively; extra keys the service
    /// adds (such as `type`) are ignored.
    #[must_use]
    pub fn matches(&self, existing: &Value) -> bool {
        let Some(existing) = existing.as_object() else {
            return false;
        };
        let Some(Value::Object(inner)) = existing
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(self.api_key()))
            .map(|(_, value)| value)
        else {
            return false;
        };
        self.fields()
            .iter()
            .all(|(key, value)| inner.get(key) == Some(value))
    }

    fn source_description(&self) -> &str {
        match self {
            Self::OneLake { path, .. } => path,
            Self::AmazonS3 { location, .. } | Self::AdlsGen2 { location, .. } => location,
            Self::Dataverse { table_name, .. } => table_name,
        }
    }
}

/// A validated shortcut definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcut {
    /// Folder of the lakehouse the shortcut is created in
    pub path: String,
    /// Shortcut name
    pub name: String,
    /// What it points at
    pub target: ShortcutTarget,
}

impl Shortcut {
    /// Full create-request body.
    #[must_use]
    pub fn create_body(&self) -> Value {
        json!({
            "path": self.path,
            "name": self.name,
            "target": self.target.body(),
        })
    }
}

impl fmt::Display for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Shortcut: {} from {} to {}",
            self.name,
            self.target.source_description(),
            self.path
        )
    }
}

/// One entry of a shortcuts document, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShortcutSpec {
    /// Destination folder
    pub path: Option<String>,
    /// Shortcut name
    #[serde(alias = "name")]
    pub shortcut_name: Option<String>,
    /// Target kind: `onelake`, `amazonS3`, `adlsGen2` or `dataverse`
    #[serde(alias = "target_name")]
    pub target: Option<String>,
    /// Endpoint override carried by some documents; ignored
    pub endpoint: Option<String>,
    /// OneLake source path
    pub source_path: Option<String>,
    /// OneLake source workspace
    pub source_workspace_id: Option<String>,
    /// OneLake source item
    pub source_item_id: Option<String>,
    /// S3 / ADLS location
    pub location: Option<String>,
    /// S3 / ADLS subpath
    pub subpath: Option<String>,
    /// S3 / ADLS / Dataverse connection
    pub connection_id: Option<String>,
    /// Dataverse Delta Lake folder
    pub delta_lake_folder: Option<String>,
    /// Dataverse environment
    pub environment_domain: Option<String>,
    /// Dataverse table
    pub table_name: Option<String>,
}

fn required(value: Option<String>, field: &str, kind: &str) -> Result<String> {
    value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
        LivyError::Validation(if kind.is_empty() {
            format!("{field} is required")
        } else {
            format!("{field} is required for {kind}")
        })
    })
}

impl TryFrom<ShortcutSpec> for Shortcut {
    type Error = LivyError;

    fn try_from(spec: ShortcutSpec) -> Result<Self> {
        let path = required(spec.path, "destination path", "")?;
        let name = required(spec.shortcut_name, "shortcut_name", "")?;
        let kind = required(spec.target, "target", "")?;

        let target = match kind.to_ascii_lowercase().as_str() {
            "onelake" => ShortcutTarget::OneLake {
                workspace_id: required(spec.source_workspace_id, "source_workspace_id", &kind)?,
                item_id: required(spec.source_item_id, "source_item_id", &kind)?,
                path: required(spec.source_path, "source_path", &kind)?,
            },
            "amazons3" => ShortcutTarget::AmazonS3 {
                location: required(spec.location, "location", &kind)?,
                subpath: required(spec.subpath, "subpath", &kind)?,
                connection_id: required(spec.connection_id, "connection_id", &kind)?,
            },
            "adlsgen2" => ShortcutTarget::AdlsGen2 {
                location: required(spec.location, "location", &kind)?,
                subpath: required(spec.subpath, "subpath", &kind)?,
                connection_id: required(spec.connection_id, "connection_id", &kind)?,
            },
            "dataverse" => ShortcutTarget::Dataverse {
                connection_id: required(spec.connection_id, "connection_id", &kind)?,
                delta_lake_folder: required(spec.delta_lake_folder, "delta_lake_folder", &kind)?,
                environment_domain: required(spec.environment_domain, "environment_domain", &kind)?,
                table_name: required(spec.table_name, "table_name", &kind)?,
            },
            _ => {
                return Err(LivyError::Validation(format!(
                    "target must be one of 'onelake', 'amazonS3', 'adlsGen2', or 'dataverse', got '{kind}'"
                )));
            }
        };

        Ok(Self { path, name, target })
    }
}

/// Parse and validate a shortcuts document.
///
/// # Errors
///
/// Returns [`LivyError::Validation`] if the document is not a JSON array of
/// shortcut objects or any entry fails validation.
pub fn parse_shortcuts(json: &str) -> Result<Vec<Shortcut>> {
    let specs: Vec<ShortcutSpec> = serde_json::from_str(json)
        .map_err(|e| LivyError::Validation(format!("improperly formatted shortcuts JSON: {e}")))?;
    specs.into_iter().map(Shortcut::try_from).collect()
}

/// Read and validate the shortcuts document named by `source`.
///
/// # Errors
///
/// Returns [`LivyError::Configuration`] if a file cannot be read and
/// [`LivyError::Validation`] if the document is invalid.
pub fn load_shortcuts(source: &ShortcutSource) -> Result<Vec<Shortcut>> {
    parse_shortcuts(&source.read()?)
}
