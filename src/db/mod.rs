//! Database module
//!
//! One PostgreSQL session per engine, liveness-checked before use, and the
//! executor that runs validated statements on it.

pub mod connection;
pub mod executor;
pub mod postgres;

pub use connection::{ConnectionManager, ConnectionState, Connector, DbSession, QueryOutput};
pub use executor::{ExecutionErrorKind, ExecutionResult, QueryExecutor, MAX_ATTEMPTS};
pub use postgres::PgConnector;
