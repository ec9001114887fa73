//! Run one Spark SQL query against a Fabric lakehouse.
//!
//! # Usage
//!
//! ```bash
//! FABRIC_ENDPOINT=https://api.fabric.microsoft.com/v1 \
//! FABRIC_WORKSPACE_ID=... FABRIC_LAKEHOUSE_ID=... FABRIC_LAKEHOUSE=sales \
//! FABRIC_AUTHENTICATION=CLI \
//!   cargo run --bin run-sql -- "select count(*) from sales.orders"
//! ```
//!
//! Settings may also come from a `.env` file in the working directory.
//! Without an argument the query is read from `RUN_SQL_QUERY`.

use anyhow::Context;
use fabric_livy_core::FabricSparkConfig;
use fabric_livy_runtime::{ContextKey, FabricSparkConnectionManager};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_QUERY: &str = "show databases";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("run_sql=info,fabric_livy_runtime=info")),
        )
        .init();
    fabric_livy_runtime::metrics::describe_metrics();

    let query = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("RUN_SQL_QUERY").ok())
        .unwrap_or_else(|| DEFAULT_QUERY.to_string());

    let config = FabricSparkConfig::from_env().context("reading FABRIC_* settings")?;
    let manager = FabricSparkConnectionManager::new(config).context("invalid configuration")?;

    let result = run(&manager, &query).await;
    manager.cleanup_all().await;
    result
}

async fn run(manager: &FabricSparkConnectionManager, query: &str) -> anyhow::Result<()> {
    let mut connection = manager
        .open(ContextKey::new("run-sql"))
        .await
        .context("opening a Livy session")?;
    info!(query, "Running query");
    connection
        .execute(query, None)
        .await
        .context("query failed")?;

    if let Some(columns) = connection.description() {
        let header: Vec<&str> = columns.iter().map(|column| column.name.as_str()).collect();
        println!("{}", header.join("\t"));
    }
    let rows = connection.fetchall().unwrap_or_default();
    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .map(|value| match value {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", cells.join("\t"));
    }
    info!(rows = rows.len(), "Query finished");

    connection.close();
    Ok(())
}
