//! askdb: natural-language questions answered with read-only SQL over a
//! known PostgreSQL schema.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod interpret;
pub mod llm;
pub mod prompt;
pub mod relevance;
pub mod schema;
pub mod synthesizer;
pub mod validator;

pub use config::{DatabaseConfig, EngineConfig, LlmConfig};
pub use db::{ExecutionErrorKind, ExecutionResult};
pub use engine::{AnswerResponse, HealthReport, HealthStatus, QueryResponse, SchemaInfo, TextToSqlEngine};
pub use error::{EngineError, Result};
pub use interpret::{ChartConfig, ChartType};
pub use llm::{LanguageModel, LlmClient};
pub use schema::{Record, SchemaDescription};
pub use synthesizer::GeneratedQuery;
pub use validator::{SqlValidator, ValidationResult};
