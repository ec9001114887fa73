//! URL paths for mounting `wiremock` routes.
//!
//! All paths assume the ids of [`crate::fixtures::test_config`].

use crate::fixtures::{LAKEHOUSE_ID, WORKSPACE_ID};
use fabric_livy_core::config::LIVY_API_VERSION;
use wiremock::MockServer;

/// Livy API root path under the mock server.
#[must_use]
pub fn livy_root() -> String {
    format!(
        "/workspaces/{WORKSPACE_ID}/lakehouses/{LAKEHOUSE_ID}/livyapi/versions/{LIVY_API_VERSION}"
    )
}

/// `/sessions`.
#[must_use]
pub fn sessions() -> String {
    format!("{}/sessions", livy_root())
}

/// `/sessions/{id}`.
#[must_use]
pub fn session(id: &str) -> String {
    format!("{}/sessions/{id}", livy_root())
}

/// `/sessions/{id}/statements`.
#[must_use]
pub fn statements(session_id: &str) -> String {
    format!("{}/statements", session(session_id))
}

/// `/sessions/{id}/statements/{id}`.
#[must_use]
pub fn statement(session_id: &str, statement_id: u64) -> String {
    format!("{}/{statement_id}", statements(session_id))
}

/// Shortcut collection of the lakehouse.
#[must_use]
pub fn shortcuts() -> String {
    format!("/workspaces/{WORKSPACE_ID}/items/{LAKEHOUSE_ID}/shortcuts")
}

/// One shortcut of the lakehouse.
#[must_use]
pub fn shortcut(path: &str, name: &str) -> String {
    format!("{}/{path}/{name}", shortcuts())
}

/// Start a mock server together with a config pointing at it.
pub async fn mock_fabric() -> (MockServer, fabric_livy_core::FabricSparkConfig) {
    let server = MockServer::start().await;
    let config = crate::fixtures::test_config(&server.uri());
    (server, config)
}
