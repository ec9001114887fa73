//! Python model submission.

use crate::connection::Connection;
use fabric_livy_core::error::{LivyError, Result};
use fabric_livy_core::statement::StatementKind;

/// Identifies the model a piece of compiled `PySpark` code builds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PythonModel {
    /// Relation the model materialises
    pub relation_name: String,
    /// Source file of the model
    pub original_file_path: String,
    /// Submission method named by the model config
    pub submission_method: String,
}

/// Runs compiled Python models on the session of a connection.
#[derive(Debug)]
pub struct PythonModelSubmitter {
    model: PythonModel,
    connection: Connection,
}

impl PythonModelSubmitter {
    /// Submitter for `model`, opening `connection` if needed.
    ///
    /// # Errors
    ///
    /// See [`Connection::open`].
    pub async fn new(model: PythonModel, mut connection: Connection) -> Result<Self> {
        connection.open().await?;
        Ok(Self { model, connection })
    }

    /// The model being submitted.
    #[must_use]
    pub const fn model(&self) -> &PythonModel {
        &self.model
    }

    /// Run `compiled_code` as `PySpark` and return its output lines.
    ///
    /// # Errors
    ///
    /// A remote failure becomes [`LivyError::Runtime`] naming the model;
    /// other errors pass through.
    pub async fn submit(&mut self, compiled_code: &str) -> Result<Vec<String>> {
        let cursor = self.connection.cursor()?;
        match cursor.execute_code(compiled_code, StatementKind::Pyspark).await {
            Ok(()) => {}
            Err(LivyError::Database(message)) => {
                return Err(LivyError::Runtime(format!(
                    "Unable to create model {}(file: {}) with a {} type submission. Caused by:\n{message}",
                    self.model.relation_name, self.model.original_file_path, self.model.submission_method
                )));
            }
            Err(err) => return Err(err),
        }

        let mut lines: Vec<String> = cursor
            .fetchall()
            .unwrap_or_default()
            .iter()
            .map(|row| serde_json::Value::Array(row.clone()).to_string())
            .collect();
        lines.extend(cursor.text_output().iter().cloned());
        for line in &lines {
            tracing::info!(relation = %self.model.relation_name, "{line}");
        }
        Ok(lines)
    }

    /// Give the connection back.
    #[must_use]
    pub fn into_connection(self) -> Connection {
        self.connection
    }
}
