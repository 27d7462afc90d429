use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("LLM error: {0}")]
    Llm(String),

    /// Session-level failure; reconnecting may fix it.
    #[error("{0}")]
    Connection(String),

    /// The database rejected the statement itself.
    #[error("{0}")]
    Statement(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether a fresh session could make the failed call succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Connection(_))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => EngineError::Connection(error.to_string()),
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
                // SQLSTATE class 08 is connection exception, 57P0x is server shutdown
                if code.starts_with("08") || code.starts_with("57P0") {
                    EngineError::Connection(db.message().to_string())
                } else {
                    EngineError::Statement(db.message().to_string())
                }
            }
            _ => EngineError::Statement(error.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_errors_are_transient() {
        assert!(EngineError::Connection("server closed the connection".to_string()).is_transient());
        assert!(!EngineError::Statement("column \"foo\" does not exist".to_string()).is_transient());
        assert!(!EngineError::Config("rules.json missing".to_string()).is_transient());
    }

    #[test]
    fn test_io_errors_from_driver_are_connection_class() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err: EngineError = sqlx::Error::Io(io).into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_column_decode_errors_are_statement_class() {
        let err: EngineError = sqlx::Error::ColumnNotFound("amount".to_string()).into();
        assert!(!err.is_transient());
    }
}
