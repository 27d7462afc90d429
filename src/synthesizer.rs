//! SQL Synthesizer
//!
//! Sends the assembled prompt to the language model once and normalizes the
//! reply into a single semicolon-terminated statement.

use crate::llm::LanguageModel;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub success: bool,
    pub sql: Option<String>,
    pub error: Option<String>,
}

impl GeneratedQuery {
    pub fn ok(sql: String) -> Self {
        Self {
            success: true,
            sql: Some(sql),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            sql: None,
            error: Some(error.into()),
        }
    }
}

fn fence_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?mi)^```sql\s*").unwrap(),
            Regex::new(r"(?m)^```\s*").unwrap(),
            Regex::new(r"(?m)```$").unwrap(),
        ]
    })
}

/// Strip code fences, trim, and terminate with `;`. Idempotent.
pub fn clean_sql(raw: &str) -> String {
    // Removing one fence can expose another, so strip until nothing changes.
    let mut sql = raw.trim().to_string();
    loop {
        let mut stripped = sql.clone();
        for pattern in fence_patterns() {
            stripped = pattern.replace_all(&stripped, "").into_owned();
        }
        let stripped = stripped.trim().to_string();
        if stripped == sql {
            break;
        }
        sql = stripped;
    }

    if !sql.ends_with(';') {
        sql.push(';');
    }
    sql
}

pub struct SqlSynthesizer {
    llm: Arc<dyn LanguageModel>,
}

impl SqlSynthesizer {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// One model call, no retry. Failures never carry partial SQL.
    pub async fn synthesize(&self, prompt: &str) -> GeneratedQuery {
        info!("Asking the language model to generate SQL");
        let raw = match self.llm.generate(prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("SQL generation failed: {}", e);
                return GeneratedQuery::failed(e.to_string());
            }
        };

        let sql = clean_sql(&raw);
        if sql == ";" {
            warn!("Language model returned no SQL");
            return GeneratedQuery::failed("Language model returned an empty response");
        }

        info!("Generated SQL: {}", sql);
        GeneratedQuery::ok(sql)
    }
}
