//! JSON bodies shaped like Livy and Fabric responses.

use fabric_livy_core::config::{AuthenticationMethod, FabricSparkConfig};
use fabric_livy_core::session::SessionConfig;
use serde_json::{Value, json};

/// Workspace id used by [`test_config`].
pub const WORKSPACE_ID: &str = "11111111-1111-1111-1111-111111111111";

/// Lakehouse id used by [`test_config`].
pub const LAKEHOUSE_ID: &str = "22222222-2222-2222-2222-222222222222";

/// Token served by [`test_config`]'s static authentication.
pub const ACCESS_TOKEN: &str = "test-access-token";

/// A valid config pointing at `endpoint` with static authentication.
#[must_use]
pub fn test_config(endpoint: &str) -> FabricSparkConfig {
    FabricSparkConfig {
        workspace_id: Some(WORKSPACE_ID.to_string()),
        lakehouse_id: Some(LAKEHOUSE_ID.to_string()),
        lakehouse: Some("lakehouse".to_string()),
        schema: Some("lakehouse".to_string()),
        endpoint: endpoint.to_string(),
        authentication: AuthenticationMethod::Static,
        access_token: Some(ACCESS_TOKEN.to_string()),
        session_config: SessionConfig::named("dbt-fabricspark"),
        ..FabricSparkConfig::default()
    }
}

/// Response to `POST /sessions`.
#[must_use]
pub fn session_created(id: &str) -> Value {
    json!({
        "id": id,
        "state": "not_started",
        "name": "dbt-fabricspark"
    })
}

/// Response to `GET /sessions/{id}`.
///
/// `state` is reported both at the top level and as the nested liveness.
#[must_use]
pub fn session(id: &str, state: &str) -> Value {
    json!({
        "id": id,
        "state": state,
        "livyInfo": {"currentState": state}
    })
}

/// Response to `POST /sessions/{id}/statements`.
#[must_use]
pub fn statement_submitted(id: u64) -> Value {
    json!({"id": id, "state": "waiting", "output": null})
}

/// Statement still executing.
#[must_use]
pub fn statement_running(id: u64) -> Value {
    json!({"id": id, "state": "running", "output": null})
}

/// Finished statement with a tabular payload.
///
/// `fields` are `(name, type)` pairs.
#[must_use]
pub fn statement_rows(id: u64, fields: &[(&str, &str)], rows: &Value) -> Value {
    let fields: Vec<Value> = fields
        .iter()
        .map(|(name, data_type)| {
            json!({"name": name, "type": data_type, "nullable": true, "metadata": {}})
        })
        .collect();
    json!({
        "id": id,
        "state": "available",
        "output": {
            "status": "ok",
            "execution_count": id,
            "data": {
                "application/json": {
                    "data": rows,
                    "schema": {"type": "struct", "fields": fields}
                }
            }
        }
    })
}

/// Finished statement with no tabular payload (DDL, inserts).
#[must_use]
pub fn statement_empty(id: u64) -> Value {
    json!({
        "id": id,
        "state": "available",
        "output": {"status": "ok", "execution_count": id, "data": {"application/json": {}}}
    })
}

/// Finished statement with a plain-text payload.
#[must_use]
pub fn statement_text(id: u64, text: &str) -> Value {
    json!({
        "id": id,
        "state": "available",
        "output": {"status": "ok", "execution_count": id, "data": {"text/plain": text}}
    })
}

/// Statement the remote engine rejected.
#[must_use]
pub fn statement_failed(id: u64, ename: &str, evalue: &str) -> Value {
    json!({
        "id": id,
        "state": "available",
        "output": {
            "status": "error",
            "execution_count": id,
            "ename": ename,
            "evalue": evalue,
            "traceback": []
        }
    })
}

/// Response of the identity provider's token endpoint.
#[must_use]
pub fn token_response(token: &str, expires_in: u64) -> Value {
    json!({
        "token_type": "Bearer",
        "expires_in": expires_in,
        "access_token": token
    })
}

/// Existing OneLake shortcut as returned by `GET .../shortcuts/{path}/{name}`.
#[must_use]
pub fn onelake_shortcut(path: &str, name: &str, workspace_id: &str, item_id: &str, source_path: &str) -> Value {
    json!({
        "path": path,
        "name": name,
        "target": {
            "type": "OneLake",
            "oneLake": {
                "workspaceId": workspace_id,
                "itemId": item_id,
                "path": source_path
            }
        }
    })
}
