//! # Fabric Livy Core
//!
//! Shared types for talking to Spark through a Fabric lakehouse Livy
//! endpoint.
//!
//! This crate performs no I/O. It provides:
//!
//! - **Errors**: [`LivyError`] with its [`ErrorKind`] and [`ErrorCategory`]
//! - **Configuration**: [`FabricSparkConfig`] and its validation
//! - **Wire types**: session and statement resources of the Livy API
//! - **Bindings**: textual rendering of bound parameters into SQL
//! - **SQL preparation**: terminator and comment stripping
//! - **Environment**: injectable [`Clock`] and [`Sleeper`]
//!
//! ## Example
//!
//! ```
//! use fabric_livy_core::{Binding, prepare_statement};
//!
//! let code = prepare_statement(
//!     "/* model.orders */ select * from orders where id = %s;",
//!     Some(&[Binding::from(42)]),
//! )?;
//! assert_eq!(code, "select * from orders where id = 42.0");
//! # Ok::<(), fabric_livy_core::LivyError>(())
//! ```

pub mod binding;
pub mod config;
pub mod environment;
pub mod error;
pub mod session;
pub mod sql;
pub mod statement;

pub use binding::{Binding, substitute};
pub use config::{AuthenticationMethod, FabricSparkConfig, ShortcutSource};
pub use environment::{Clock, Environment, Sleeper, SystemClock, TokioSleeper};
pub use error::{ErrorCategory, ErrorKind, LivyError, Result};
pub use session::{SessionConfig, SessionId, SessionInfo, SessionRequest, SessionState};
pub use sql::{abridge, prepare_statement};
pub use statement::{
    ColumnDescription, Field, ResultSet, Row, StatementId, StatementInfo, StatementKind,
    StatementOutput, StatementRequest, StatementState,
};
