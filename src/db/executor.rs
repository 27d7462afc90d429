//! Query Executor
//!
//! Runs validated SQL through the connection manager. A connection-class
//! failure gets one reconnect and one more attempt; anything else is final.

use super::connection::{ConnectionManager, QueryOutput};
use crate::schema::Record;
use crate::validator::SqlValidator;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// First attempt plus one retry after reconnecting.
pub const MAX_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    /// Rejected by the validator, never sent to the database.
    Validation,
    /// No session could be established (or re-established).
    Connection,
    /// The database rejected the statement.
    Statement,
    /// Still failing after the reconnect-and-retry.
    RetryExhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub data: Option<Vec<Record>>,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ExecutionErrorKind>,
}

impl ExecutionResult {
    pub fn failure(kind: ExecutionErrorKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            columns: Vec::new(),
            row_count: 0,
            error: Some(error.into()),
            error_kind: Some(kind),
        }
    }

    /// Pair each row positionally with the column names, keeping row order.
    pub fn from_output(output: QueryOutput) -> Self {
        let data: Vec<Record> = output
            .rows
            .into_iter()
            .map(|row| output.columns.iter().cloned().zip(row).collect())
            .collect();

        Self {
            success: true,
            row_count: data.len(),
            data: Some(data),
            columns: output.columns,
            error: None,
            error_kind: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryExecutor {
    validator: SqlValidator,
}

impl QueryExecutor {
    pub fn new(validator: SqlValidator) -> Self {
        Self { validator }
    }

    pub async fn execute(&self, connections: &mut ConnectionManager, sql: &str) -> ExecutionResult {
        let verdict = self.validator.validate(sql);
        if !verdict.valid {
            return ExecutionResult::failure(
                ExecutionErrorKind::Validation,
                verdict.error.unwrap_or_else(|| "Query rejected".to_string()),
            );
        }

        if let Err(e) = connections.ensure_connection().await {
            return ExecutionResult::failure(
                ExecutionErrorKind::Connection,
                format!("Failed to establish database connection: {}", e),
            );
        }

        info!("Executing query...");
        let mut attempt = 1;
        loop {
            match connections.run(sql).await {
                Ok(output) => {
                    let result = ExecutionResult::from_output(output);
                    info!("Query executed successfully, retrieved {} rows", result.row_count);
                    return result;
                }
                Err(e) if attempt > 1 => {
                    warn!("Query failed again after reconnect: {}", e);
                    return ExecutionResult::failure(
                        ExecutionErrorKind::RetryExhausted,
                        format!("Query execution failed after reconnect: {}", e),
                    );
                }
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    warn!("Connection error: {}. Attempting to reconnect...", e);
                    connections.reset().await;
                    if let Err(reconnect) = connections.ensure_connection().await {
                        warn!("Reconnect failed: {}", reconnect);
                        return ExecutionResult::failure(
                            ExecutionErrorKind::Connection,
                            format!("Failed to reconnect to database: {}", e),
                        );
                    }
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Database error: {}", e);
                    return ExecutionResult::failure(
                        ExecutionErrorKind::Statement,
                        format!("Database error: {}", e),
                    );
                }
            }
        }
    }
}
