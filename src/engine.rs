//! Text-to-SQL engine
//!
//! Owns the schema snapshot, the model-backed stages and the single database
//! session. Operations that touch the session take `&mut self`, so one caller
//! drives an engine at a time.

use crate::config::EngineConfig;
use crate::db::{ConnectionManager, Connector, ExecutionResult, PgConnector, QueryExecutor};
use crate::error::Result;
use crate::interpret::{ChartAdvisor, ChartConfig, NarrativeWriter};
use crate::llm::{LanguageModel, LlmClient};
use crate::prompt::PromptBuilder;
use crate::relevance::RelevanceSelector;
use crate::schema::{Record, SchemaDescription, SchemaMetadata};
use crate::synthesizer::{GeneratedQuery, SqlSynthesizer};
use crate::validator::{SqlValidator, ValidationResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of `query`: generated SQL and, when executed, its rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub sql: Option<String>,
    pub data: Option<Vec<Record>>,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub error: Option<String>,
    pub pending_execution: bool,
}

impl QueryResponse {
    fn generation_failed(error: Option<String>) -> Self {
        Self {
            success: false,
            sql: None,
            data: None,
            columns: Vec::new(),
            row_count: 0,
            error: Some(format!(
                "SQL generation failed: {}",
                error.unwrap_or_else(|| "unknown error".to_string())
            )),
            pending_execution: false,
        }
    }
}

/// Outcome of `ask`: rows plus a chart suggestion and a plain-language answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub success: bool,
    pub sql: Option<String>,
    pub data: Option<Vec<Record>>,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub error: Option<String>,
    pub narrative: Option<String>,
    /// Present only when a chart is recommended.
    pub chart: Option<ChartConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub database_connected: bool,
    pub schema_loaded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub metadata: SchemaMetadata,
    pub tables: Vec<String>,
    pub total_tables: usize,
}

pub struct TextToSqlEngine {
    schema: SchemaDescription,
    selector: RelevanceSelector,
    prompts: PromptBuilder,
    synthesizer: SqlSynthesizer,
    validator: SqlValidator,
    executor: QueryExecutor,
    connections: ConnectionManager,
    charts: ChartAdvisor,
    narrator: NarrativeWriter,
}

impl TextToSqlEngine {
    pub fn new(
        schema: SchemaDescription,
        llm: Arc<dyn LanguageModel>,
        connector: Box<dyn Connector>,
        prompts: PromptBuilder,
    ) -> Self {
        Self {
            schema,
            selector: RelevanceSelector::default(),
            prompts,
            synthesizer: SqlSynthesizer::new(llm.clone()),
            validator: SqlValidator::new(),
            executor: QueryExecutor::default(),
            connections: ConnectionManager::new(connector),
            charts: ChartAdvisor::new(llm.clone()),
            narrator: NarrativeWriter::new(llm),
        }
    }

    /// Build an engine against the configured PostgreSQL database and model.
    /// Fails if the schema snapshot cannot be loaded; the database is only
    /// contacted on first use.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let schema = SchemaDescription::load(&config.schema_path)?;
        info!(
            "Loaded schema with {} tables from {}",
            schema.tables.len(),
            config.schema_path.display()
        );

        let connector = PgConnector::from_config(&config.database)?;
        let llm = LlmClient::from_config(&config.llm);
        info!("Using model {}", llm.model());

        let prompts = PromptBuilder::new(config.rules_path.clone(), config.business_context_path.clone());
        Ok(Self::new(schema, Arc::new(llm), Box::new(connector), prompts))
    }

    pub fn with_selector(mut self, selector: RelevanceSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn schema(&self) -> &SchemaDescription {
        &self.schema
    }

    pub fn relevant_tables(&self, question: &str) -> Vec<String> {
        self.selector.select(question)
    }

    pub fn build_prompt(&self, question: &str) -> Result<String> {
        let tables = self.relevant_tables(question);
        info!("Relevant tables: {}", tables.join(", "));
        self.prompts.build(&self.schema, &tables, question)
    }

    /// One model call. Missing prompt documents fail the request.
    pub async fn generate(&self, question: &str) -> GeneratedQuery {
        info!("Question: {}", question);
        let prompt = match self.build_prompt(question) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("Could not build prompt: {}", e);
                return GeneratedQuery::failed(e.to_string());
            }
        };
        self.synthesizer.synthesize(&prompt).await
    }

    pub fn validate(&self, sql: &str) -> ValidationResult {
        self.validator.validate(sql)
    }

    pub async fn execute(&mut self, sql: &str) -> ExecutionResult {
        self.executor.execute(&mut self.connections, sql).await
    }

    pub async fn classify_chart(&self, question: &str, data: &[Record], columns: &[String]) -> ChartConfig {
        self.charts.classify(question, data, columns).await
    }

    pub async fn summarize(
        &self,
        question: &str,
        sql: &str,
        result: &ExecutionResult,
        chart: Option<&ChartConfig>,
    ) -> String {
        self.narrator.summarize(question, sql, result, chart).await
    }

    pub async fn ensure_connection(&mut self) -> bool {
        self.connections.ensure_connection().await.is_ok()
    }

    pub fn is_connected(&self) -> bool {
        self.connections.is_connected()
    }

    pub async fn close(&mut self) {
        self.connections.close().await;
    }

    /// Generate SQL and, if asked to, run it.
    pub async fn query(&mut self, question: &str, auto_execute: bool) -> QueryResponse {
        let generated = self.generate(question).await;
        let sql = match (generated.success, generated.sql) {
            (true, Some(sql)) => sql,
            _ => return QueryResponse::generation_failed(generated.error),
        };

        if !auto_execute {
            return QueryResponse {
                success: true,
                sql: Some(sql),
                data: None,
                columns: Vec::new(),
                row_count: 0,
                error: None,
                pending_execution: true,
            };
        }

        let result = self.execute(&sql).await;
        QueryResponse {
            success: result.success,
            sql: Some(sql),
            data: result.data,
            columns: result.columns,
            row_count: result.row_count,
            error: result.error,
            pending_execution: false,
        }
    }

    /// Full pipeline: generate, execute, then chart and narrative.
    pub async fn ask(&mut self, question: &str) -> AnswerResponse {
        let generated = self.generate(question).await;
        let sql = match (generated.success, generated.sql) {
            (true, Some(sql)) => sql,
            _ => {
                return AnswerResponse {
                    success: false,
                    sql: None,
                    data: None,
                    columns: Vec::new(),
                    row_count: 0,
                    error: generated.error,
                    narrative: None,
                    chart: None,
                }
            }
        };

        let result = self.execute(&sql).await;

        let chart = match result.data.as_deref() {
            Some(rows) if result.success && !rows.is_empty() => {
                Some(self.classify_chart(question, rows, &result.columns).await)
            }
            _ => None,
        };
        let narrative = self.summarize(question, &sql, &result, chart.as_ref()).await;

        AnswerResponse {
            success: result.success,
            sql: Some(sql),
            data: result.data,
            columns: result.columns,
            row_count: result.row_count,
            error: result.error,
            narrative: Some(narrative),
            chart: chart.filter(|c| c.should_visualize),
        }
    }

    /// Pings the database, so a dropped session is noticed and replaced.
    pub async fn health(&mut self) -> HealthReport {
        let database_connected = self.ensure_connection().await;
        let schema_loaded = !self.schema.tables.is_empty();
        let status = if database_connected && schema_loaded {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        HealthReport {
            status,
            database_connected,
            schema_loaded,
        }
    }

    pub fn schema_info(&self) -> SchemaInfo {
        SchemaInfo {
            metadata: self.schema.metadata.clone(),
            tables: self.schema.table_names(),
            total_tables: self.schema.tables.len(),
        }
    }
}
