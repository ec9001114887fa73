//! # Fabric Livy Shortcuts
//!
//! Idempotent provisioning of lakehouse shortcuts from a JSON document.
//!
//! Each definition names a folder of the lakehouse (`path`), a shortcut
//! name and a target: another OneLake item, an S3 or ADLS Gen2 location
//! reached through a connection, or a Dataverse table. Provisioning checks
//! each shortcut first. An identical one is left alone, one with a
//! different target is deleted and recreated, and a missing one is created.
//!
//! ```
//! use fabric_livy_shortcuts::parse_shortcuts;
//!
//! let shortcuts = parse_shortcuts(r#"[{
//!     "path": "Tables",
//!     "shortcut_name": "customers",
//!     "target": "onelake",
//!     "source_workspace_id": "ws",
//!     "source_item_id": "item",
//!     "source_path": "Tables/customers"
//! }]"#)?;
//! assert_eq!(shortcuts[0].name, "customers");
//! # Ok::<(), fabric_livy_core::LivyError>(())
//! ```

pub mod client;
pub mod shortcut;

pub use client::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, ShortcutClient, ShortcutProvisioner};
pub use shortcut::{Shortcut, ShortcutSpec, ShortcutTarget, load_shortcuts, parse_shortcuts};
