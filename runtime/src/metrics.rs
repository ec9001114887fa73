//! Counters for session and statement activity.
//!
//! Names are registered with descriptions by [`describe_metrics`]; no
//! exporter is installed here, so counters are no-ops until the embedding
//! process installs a `metrics` recorder.

use metrics::describe_counter;

// Re-export metrics macros for use in other modules
pub use metrics::counter;

/// Sessions that reached `idle`.
pub const SESSIONS_CREATED: &str = "fabric_livy.sessions.created";

/// Sessions deleted by this process.
pub const SESSIONS_DELETED: &str = "fabric_livy.sessions.deleted";

/// Statements that finished with status `ok`.
pub const STATEMENTS_EXECUTED: &str = "fabric_livy.statements.executed";

/// Statements the remote engine rejected.
pub const STATEMENTS_FAILED: &str = "fabric_livy.statements.failed";

/// Connection attempts retried after a failure.
pub const CONNECT_RETRIES: &str = "fabric_livy.connect.retries";

/// Register descriptions for every counter.
pub fn describe_metrics() {
    describe_counter!(SESSIONS_CREATED, "Livy sessions created and ready");
    describe_counter!(SESSIONS_DELETED, "Livy sessions deleted");
    describe_counter!(STATEMENTS_EXECUTED, "Statements finished successfully");
    describe_counter!(STATEMENTS_FAILED, "Statements rejected by the remote engine");
    describe_counter!(CONNECT_RETRIES, "Connection attempts retried");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describing_without_a_recorder_is_harmless() {
        describe_metrics();
        counter!(SESSIONS_CREATED).increment(1);
    }
}
