//! Relevance Selector
//!
//! Maps a free-text question to the subset of tables whose curated keywords
//! appear in it, so the prompt only carries the schema it needs.

use tracing::debug;

#[derive(Debug, Clone)]
pub struct TableKeywords {
    pub table: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RelevanceSelector {
    /// Selection order follows this list.
    table_keywords: Vec<TableKeywords>,
    default_tables: Vec<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl RelevanceSelector {
    pub fn new(table_keywords: Vec<TableKeywords>, default_tables: Vec<String>) -> Self {
        Self {
            table_keywords,
            default_tables,
        }
    }

    /// Keyword map for the dealership CRM schema.
    pub fn crm() -> Self {
        let entries: [(&str, &[&str]); 8] = [
            ("lead_master", &["lead", "customer", "mobile", "phone", "source", "cre", "follow"]),
            ("ps_followup_master", &["followup", "follow-up", "follow up", "ps", "pre-sales", "presales"]),
            ("qualified_leads", &["qualified", "qualify"]),
            ("booking_and_retail_master", &["booking", "retail", "booked", "retailed"]),
            ("trade_in_master", &["trade", "trade-in", "exchange"]),
            ("users", &["user", "employee", "staff", "cre", "sales"]),
            ("duplicate_leads", &["duplicate", "duplicates"]),
            ("source_subsource_mapping", &["source", "subsource", "sub-source"]),
        ];

        let table_keywords = entries
            .iter()
            .map(|(table, keywords)| TableKeywords {
                table: table.to_string(),
                keywords: owned(keywords),
            })
            .collect();

        Self::new(
            table_keywords,
            owned(&["lead_master", "ps_followup_master", "qualified_leads", "users"]),
        )
    }

    /// Tables whose keywords occur in the question, or the default set when
    /// nothing matches. Never empty unless the default set is.
    pub fn select(&self, question: &str) -> Vec<String> {
        let question = question.to_lowercase();

        let selected: Vec<String> = self
            .table_keywords
            .iter()
            .filter(|entry| {
                entry
                    .keywords
                    .iter()
                    .any(|kw| question.contains(&kw.to_lowercase()))
            })
            .map(|entry| entry.table.clone())
            .collect();

        if selected.is_empty() {
            debug!("No table keywords matched, using default tables");
            return self.default_tables.clone();
        }
        selected
    }
}

impl Default for RelevanceSelector {
    fn default() -> Self {
        Self::crm()
    }
}
