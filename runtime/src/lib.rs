//! # Fabric Livy Runtime
//!
//! Session reuse and statement execution for SQL-emitting callers.
//!
//! ## Core Components
//!
//! - **Session handle**: create, validate and delete one remote session
//! - **Statement executor**: submit a statement, poll it, extract rows
//! - **Session registry**: one session per execution context, reused across calls
//! - **Connection**: open/execute/fetch/close with connect and query retries
//! - **Connection manager**: the entry point owning the registry
//!
//! ## Example
//!
//! ```no_run
//! use fabric_livy_core::FabricSparkConfig;
//! use fabric_livy_runtime::{ContextKey, FabricSparkConnectionManager};
//!
//! # async fn example() -> fabric_livy_core::Result<()> {
//! let manager = FabricSparkConnectionManager::new(FabricSparkConfig::from_env()?)?;
//! let mut connection = manager.open(ContextKey::current_thread()).await?;
//!
//! connection.execute("select 1 as id;", None).await?;
//! println!("{:?}", connection.fetchall());
//!
//! manager.cleanup_all().await;
//! # Ok(())
//! # }
//! ```

/// Connections and the connection manager
pub mod connection;

/// Cancellation and deadlines for poll loops
pub mod control;

/// Statement execution and cursors
pub mod executor;

/// Counters for session and statement activity
pub mod metrics;

/// Python model submission
pub mod python;

/// Per-context session cache
pub mod registry;

/// Bounded retry with a fixed wait
pub mod retry;

/// One remote session
pub mod session;

pub use connection::{
    AdapterResponse, CONNECT_FAILURE_HINT, ConnectPolicy, Connection, ConnectionState,
    FabricSparkConnectionManager,
};
pub use control::PollControl;
pub use executor::{Cursor, StatementExecutor};
pub use python::{PythonModel, PythonModelSubmitter};
pub use registry::{ContextKey, SessionRegistry, SharedSession};
pub use retry::{RetryPolicy, retry_with_predicate};
pub use session::SessionHandle;
