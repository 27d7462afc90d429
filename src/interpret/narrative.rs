//! Plain-language summary of an execution result.

use super::chart::ChartConfig;
use crate::db::ExecutionResult;
use crate::llm::LanguageModel;
use std::sync::Arc;
use tracing::{debug, warn};

/// Rows shown to the model.
pub const SUMMARY_SAMPLE_ROWS: usize = 5;

/// Templated summary used whenever the model cannot produce one.
pub fn fallback_summary(row_count: usize) -> String {
    if row_count > 0 {
        format!("I found {} result(s) for your question.", row_count)
    } else {
        "I couldn't find any results matching your question.".to_string()
    }
}

pub struct NarrativeWriter {
    llm: Arc<dyn LanguageModel>,
}

impl NarrativeWriter {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub async fn summarize(
        &self,
        question: &str,
        sql: &str,
        result: &ExecutionResult,
        chart: Option<&ChartConfig>,
    ) -> String {
        let prompt = build_prompt(question, sql, result, chart);
        match self.llm.generate(&prompt).await {
            Ok(reply) => {
                let reply = reply.trim();
                if reply.is_empty() {
                    debug!("Model returned an empty summary");
                    fallback_summary(result.row_count)
                } else {
                    reply.to_string()
                }
            }
            Err(e) => {
                warn!("Summary generation failed: {}", e);
                fallback_summary(result.row_count)
            }
        }
    }
}

fn build_prompt(
    question: &str,
    sql: &str,
    result: &ExecutionResult,
    chart: Option<&ChartConfig>,
) -> String {
    let outcome = if result.success {
        "Query succeeded".to_string()
    } else {
        format!(
            "Query failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        )
    };

    let sample = result
        .data
        .as_deref()
        .map(|rows| &rows[..rows.len().min(SUMMARY_SAMPLE_ROWS)])
        .and_then(|rows| serde_json::to_string_pretty(rows).ok())
        .unwrap_or_else(|| "[]".to_string());

    let chart_note = match chart {
        Some(c) if c.should_visualize => format!(
            "A {} chart of {} by {} is shown alongside this answer.",
            c.chart_type.map(|t| t.to_string()).unwrap_or_default(),
            c.y_axis.as_deref().unwrap_or("values"),
            c.x_axis.as_deref().unwrap_or("category"),
        ),
        _ => "No chart is shown.".to_string(),
    };

    format!(
        r#"You explain database query results to a non-technical user.

User question: "{question}"
SQL executed:
{sql}

{outcome}
Row count: {rows}
Columns: {columns}
Sample rows:
{sample}

{chart_note}

Answer the question in two or three plain sentences. Mention the key numbers.
If the query failed or returned nothing, say so plainly. Do not mention SQL."#,
        rows = result.row_count,
        columns = result.columns.join(", "),
    )
}
