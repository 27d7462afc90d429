//! Prompt Builder
//!
//! Renders the schema context for the selected tables and combines it with the
//! business rule list, the business-context document and the user question.

use crate::error::{EngineError, Result};
use crate::schema::{Record, SchemaDescription};
use serde::Deserialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Sample rows rendered per table.
pub const PROMPT_SAMPLE_ROWS: usize = 3;

#[derive(Debug, Deserialize)]
struct RulesDocument {
    #[serde(default)]
    important_rules: Vec<String>,
}

/// Locations of the two static documents. Both are re-read on every build.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    rules_path: PathBuf,
    business_context_path: PathBuf,
}

impl PromptBuilder {
    pub fn new(rules_path: impl Into<PathBuf>, business_context_path: impl Into<PathBuf>) -> Self {
        Self {
            rules_path: rules_path.into(),
            business_context_path: business_context_path.into(),
        }
    }

    pub fn build(&self, schema: &SchemaDescription, tables: &[String], question: &str) -> Result<String> {
        let schema_context = schema_context(schema, tables);
        let rules_text = self.rules_text()?;
        let business_context_text = self.business_context_text()?;

        Ok(format!(
            r#"You are an expert SQL query generator for a CRM system database.
Your task is to convert natural language questions into valid PostgreSQL SQL queries.

{schema_context}
## IMPORTANT RULES:
{rules_text}

## BUSINESS CONTEXT:
{business_context_text}

## USER QUERY:
{question}

## YOUR RESPONSE:
Generate ONLY the SQL query without any explanations, code blocks, or formatting.
Just the raw SQL query.
"#
        ))
    }

    fn rules_text(&self) -> Result<String> {
        let rules: RulesDocument = load_document(&self.rules_path)?;
        Ok(rules
            .important_rules
            .iter()
            .enumerate()
            .map(|(i, rule)| format!("{}. {}", i + 1, rule))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn business_context_text(&self) -> Result<String> {
        let context: serde_json::Value = load_document(&self.business_context_path)?;
        Ok(serde_json::to_string_pretty(&context)?)
    }
}

fn load_document<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| EngineError::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Schema section of the prompt. Unknown table names are skipped.
pub fn schema_context(schema: &SchemaDescription, tables: &[String]) -> String {
    let mut context = String::from("# DATABASE SCHEMA\n\n");

    for name in tables {
        let Some(table) = schema.table(name) else {
            continue;
        };

        let _ = writeln!(context, "## Table: {}", name);
        let _ = writeln!(context, "Row count: {}\n", table.row_count);

        context.push_str("### Columns:\n");
        for col in &table.columns {
            let pk = if table.is_primary_key(&col.name) { " (PRIMARY KEY)" } else { "" };
            let nullable = if col.nullable { "NULL" } else { "NOT NULL" };
            let _ = writeln!(context, "- {}: {} {}{}", col.name, col.data_type, nullable, pk);
        }

        if !table.foreign_keys.is_empty() {
            context.push_str("\n### Foreign Keys:\n");
            for fk in &table.foreign_keys {
                let _ = writeln!(
                    context,
                    "- {} → {}.{}",
                    fk.column, fk.references_table, fk.references_column
                );
            }
        }

        if !table.sample_data.is_empty() {
            let _ = writeln!(context, "\n### Sample Data (first {} rows):", PROMPT_SAMPLE_ROWS);
            let rows = &table.sample_data[..table.sample_data.len().min(PROMPT_SAMPLE_ROWS)];
            context.push_str(&render_table(&record_columns(rows), rows));
        }

        let _ = write!(context, "\n{}\n\n", "-".repeat(80));
    }

    context
}

/// Column names in first-seen order across the rows.
pub fn record_columns(rows: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

pub fn display_value(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => "None".to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Right-aligned text table with a header line, one line per row.
pub fn render_table(columns: &[String], rows: &[Record]) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| columns.iter().map(|c| display_value(row.get(c))).collect())
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: &[String]| -> String {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:>width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" ")
    };

    let mut out = line(columns);
    out.push('\n');
    for row in &cells {
        out.push_str(&line(row));
        out.push('\n');
    }
    out
}
