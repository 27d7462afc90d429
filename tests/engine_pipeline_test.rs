//! End-to-end pipeline tests with a scripted model and database.

use askdb::db::{Connector, DbSession, QueryOutput};
use askdb::engine::{HealthStatus, TextToSqlEngine};
use askdb::error::{EngineError, Result};
use askdb::llm::LanguageModel;
use askdb::prompt::PromptBuilder;
use askdb::schema::SchemaDescription;
use askdb::{ChartType, ExecutionErrorKind};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const SCHEMA: &str = r#"{
    "metadata": {"extracted_at": "2025-06-01T10:00:00", "database": "crm", "host": "localhost", "total_tables": 2},
    "tables": {
        "lead_master": {
            "columns": [
                {"name": "id", "type": "integer", "nullable": false},
                {"name": "source", "type": "text", "nullable": true},
                {"name": "lead_date", "type": "date", "nullable": true}
            ],
            "primary_keys": ["id"],
            "foreign_keys": [],
            "indexes": [],
            "row_count": 1520,
            "sample_data": [{"id": 1, "source": "Website", "lead_date": "2025-05-01"}]
        },
        "users": {
            "columns": [{"name": "id", "type": "integer", "nullable": false}],
            "primary_keys": ["id"],
            "row_count": 12
        }
    }
}"#;

/// Replies in order and remembers every prompt.
#[derive(Default)]
struct ScriptedModel {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn replying(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("no reply scripted".to_string()))
            .map_err(EngineError::Llm)
    }
}

#[derive(Default)]
struct Database {
    reachable: bool,
    outputs: VecDeque<Result<QueryOutput>>,
    executed: Vec<String>,
}

#[derive(Clone)]
struct FakeConnector(Arc<Mutex<Database>>);

struct FakeSession(Arc<Mutex<Database>>);

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn DbSession>> {
        if self.0.lock().unwrap().reachable {
            Ok(Box::new(FakeSession(self.0.clone())))
        } else {
            Err(EngineError::Connection("connection refused".to_string()))
        }
    }

    fn target(&self) -> String {
        "fake://crm".to_string()
    }
}

#[async_trait]
impl DbSession for FakeSession {
    async fn ping(&mut self) -> Result<()> {
        Ok(())
    }

    async fn run(&mut self, sql: &str) -> Result<QueryOutput> {
        let mut db = self.0.lock().unwrap();
        db.executed.push(sql.to_string());
        db.outputs.pop_front().unwrap_or_else(|| Ok(QueryOutput::default()))
    }

    async fn close(self: Box<Self>) {}
}

struct Fixture {
    _dir: TempDir,
    engine: TextToSqlEngine,
    model: Arc<ScriptedModel>,
    db: Arc<Mutex<Database>>,
}

fn fixture(replies: &[&str], outputs: Vec<Result<QueryOutput>>) -> Fixture {
    let dir = TempDir::new().unwrap();
    let schema_path = dir.path().join("schema.json");
    let rules_path = dir.path().join("rules.json");
    let context_path = dir.path().join("business_context.json");
    fs::write(&schema_path, SCHEMA).unwrap();
    fs::write(
        &rules_path,
        r#"{"important_rules": ["Always use lead_date for lead timing", "Never modify data"]}"#,
    )
    .unwrap();
    fs::write(&context_path, r#"{"company": "Example Motors", "week_starts_on": "Monday"}"#).unwrap();

    let schema = SchemaDescription::load(&schema_path).unwrap();
    let model = ScriptedModel::replying(replies);
    let db = Arc::new(Mutex::new(Database {
        reachable: true,
        outputs: outputs.into(),
        executed: Vec::new(),
    }));
    let engine = TextToSqlEngine::new(
        schema,
        model.clone(),
        Box::new(FakeConnector(db.clone())),
        PromptBuilder::new(rules_path, context_path),
    );

    Fixture {
        _dir: dir,
        engine,
        model,
        db,
    }
}

fn count_output(n: i64) -> QueryOutput {
    QueryOutput {
        columns: vec!["total_leads".to_string()],
        rows: vec![vec![json!(n)]],
    }
}

#[tokio::test]
async fn test_leads_last_week_answer() {
    let mut f = fixture(
        &[
            "```sql\nSELECT COUNT(*) AS total_leads FROM lead_master WHERE lead_date >= CURRENT_DATE - INTERVAL '7 days'\n```",
            "You received 12 leads last week.",
        ],
        vec![Ok(count_output(12))],
    );

    assert!(f
        .engine
        .relevant_tables("How many leads last week?")
        .contains(&"lead_master".to_string()));

    let answer = f.engine.ask("How many leads last week?").await;
    assert!(answer.success, "{:?}", answer.error);
    assert_eq!(answer.row_count, 1);
    assert_eq!(answer.columns, vec!["total_leads"]);
    assert_eq!(answer.data.as_ref().unwrap()[0]["total_leads"], json!(12));
    assert_eq!(answer.narrative.as_deref(), Some("You received 12 leads last week."));
    assert!(answer.chart.is_none());

    // SQL prompt and narrative prompt only; one row never reaches the chart model
    let prompts = f.model.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("lead_master"));
    assert!(prompts[0].contains("1. Always use lead_date for lead timing"));
    assert!(prompts[0].contains("Example Motors"));
    assert!(prompts[0].contains("How many leads last week?"));

    let db = f.db.lock().unwrap();
    assert_eq!(db.executed.len(), 1);
    assert!(db.executed[0].starts_with("SELECT COUNT(*) AS total_leads FROM lead_master"));
    assert!(db.executed[0].ends_with(';'));
}

#[tokio::test]
async fn test_delete_request_is_never_executed() {
    let mut f = fixture(&["DELETE FROM lead_master", "Nothing was changed."], vec![]);

    let response = f.engine.query("Delete all leads", true).await;
    assert!(!response.success);
    assert_eq!(
        response.error.as_deref(),
        Some("Query contains forbidden operation: DELETE")
    );
    assert!(f.db.lock().unwrap().executed.is_empty());
}

#[tokio::test]
async fn test_select_wrapped_delete_is_rejected() {
    let mut f = fixture(
        &["WITH gone AS (DELETE FROM lead_master RETURNING id) SELECT COUNT(*) FROM gone"],
        vec![],
    );

    let result = f.engine.query("Delete all leads", true).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("DELETE"));
    assert!(f.db.lock().unwrap().executed.is_empty());
}

#[tokio::test]
async fn test_query_without_execution_is_pending() {
    let mut f = fixture(&["SELECT source, COUNT(*) FROM lead_master GROUP BY source"], vec![]);

    let response = f.engine.query("Leads by source", false).await;
    assert!(response.success);
    assert!(response.pending_execution);
    assert_eq!(
        response.sql.as_deref(),
        Some("SELECT source, COUNT(*) FROM lead_master GROUP BY source;")
    );
    assert!(response.data.is_none());
    assert!(f.db.lock().unwrap().executed.is_empty());
    assert!(!f.engine.is_connected());
}

#[tokio::test]
async fn test_generation_failure_is_reported() {
    let mut f = fixture(&[], vec![]);

    let response = f.engine.query("How many users?", true).await;
    assert!(!response.success);
    assert!(response
        .error
        .unwrap()
        .starts_with("SQL generation failed: LLM error: no reply scripted"));
    assert!(!response.pending_execution);
}

#[tokio::test]
async fn test_missing_rules_document_fails_request() {
    let mut f = fixture(&["SELECT 1"], vec![]);
    fs::remove_file(f._dir.path().join("rules.json")).unwrap();

    let response = f.engine.query("How many users?", true).await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("Configuration error"));
    assert!(f.model.prompts().is_empty());
}

#[tokio::test]
async fn test_answer_with_chart() {
    let breakdown = QueryOutput {
        columns: vec!["source".to_string(), "leads".to_string()],
        rows: vec![
            vec![json!("Website"), json!(42)],
            vec![json!("Walk-in"), json!(17)],
            vec![json!("Referral"), json!(5)],
        ],
    };
    let mut f = fixture(
        &[
            "SELECT source, COUNT(*) AS leads FROM lead_master GROUP BY source",
            r#"{"should_visualize": true, "chart_type": "pie", "x_axis": "source", "y_axis": "leads", "explanation": "Share of leads per source"}"#,
            "Most leads came from the website.",
        ],
        vec![Ok(breakdown)],
    );

    let answer = f.engine.ask("Show the breakdown of leads by source").await;
    assert!(answer.success);
    let chart = answer.chart.expect("chart recommended");
    assert_eq!(chart.chart_type, Some(ChartType::Pie));
    assert_eq!(chart.x_axis.as_deref(), Some("source"));
    assert_eq!(answer.narrative.as_deref(), Some("Most leads came from the website."));
    assert_eq!(f.model.prompts().len(), 3);
}

#[tokio::test]
async fn test_statement_error_answer_uses_fallback_narrative() {
    let mut f = fixture(
        &["SELECT lead_count FROM lead_master"],
        vec![Err(EngineError::Statement(
            "column \"lead_count\" does not exist".to_string(),
        ))],
    );

    let answer = f.engine.ask("How many leads?").await;
    assert!(!answer.success);
    assert_eq!(
        answer.error.as_deref(),
        Some("Database error: column \"lead_count\" does not exist")
    );
    assert!(answer.chart.is_none());
    assert_eq!(
        answer.narrative.as_deref(),
        Some("I couldn't find any results matching your question.")
    );
}

#[tokio::test]
async fn test_unreachable_database() {
    let mut f = fixture(&[], vec![]);
    f.db.lock().unwrap().reachable = false;

    let result = f.engine.execute("SELECT 1;").await;
    assert_eq!(result.error_kind, Some(ExecutionErrorKind::Connection));

    let report = f.engine.health().await;
    assert_eq!(report.status, HealthStatus::Degraded);
    assert!(!report.database_connected);
    assert!(report.schema_loaded);
}

#[tokio::test]
async fn test_health_and_schema_info() {
    let mut f = fixture(&[], vec![]);

    let report = f.engine.health().await;
    assert_eq!(report.status, HealthStatus::Healthy);
    assert!(f.engine.ensure_connection().await);

    let info = f.engine.schema_info();
    assert_eq!(info.tables, vec!["lead_master", "users"]);
    assert_eq!(info.total_tables, 2);
    assert_eq!(info.metadata.database.as_deref(), Some("crm"));

    f.engine.close().await;
    f.engine.close().await;
    assert!(!f.engine.is_connected());
}
