//! Schema Store
//!
//! Immutable snapshot of the database structure (tables, columns, keys,
//! sample rows, row counts) produced once by an external extraction step and
//! loaded at startup.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One row of sample or result data, keyed by column name in projection order.
pub type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub metadata: SchemaMetadata,
    pub tables: BTreeMap<String, TableInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    #[serde(default)]
    pub extracted_at: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub total_tables: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub columns: Vec<ColumnInfo>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyInfo>,
    #[serde(default)]
    pub indexes: Vec<IndexInfo>,
    #[serde(default)]
    pub row_count: i64,
    #[serde(default)]
    pub sample_data: Vec<Record>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub max_length: Option<i64>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
    #[serde(default)]
    pub on_update: Option<String>,
    #[serde(default)]
    pub on_delete: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    /// Older snapshots store a single `column`.
    #[serde(default, alias = "column", deserialize_with = "one_or_many")]
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(column) => vec![column],
        OneOrMany::Many(columns) => columns,
    })
}

impl TableInfo {
    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_keys.iter().any(|pk| pk == column)
    }
}

impl SchemaDescription {
    /// Load the snapshot; the engine cannot start without it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Schema(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&content)
            .map_err(|e| EngineError::Schema(format!("Failed to parse {}: {}", path.display(), e)))
    }

    pub fn from_json(content: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Human-readable overview of every table, for operators.
    pub fn summary(&self) -> String {
        let rule = "=".repeat(80);
        let mut out = Vec::new();
        out.push(rule.clone());
        out.push("DATABASE SCHEMA SUMMARY".to_string());
        out.push(rule.clone());
        out.push(format!(
            "Extracted: {}",
            self.metadata.extracted_at.as_deref().unwrap_or("unknown")
        ));
        out.push(format!(
            "Database: {}",
            self.metadata.database.as_deref().unwrap_or("unknown")
        ));
        out.push(format!("Total Tables: {}", self.tables.len()));
        out.push(rule);

        for (name, table) in &self.tables {
            out.push(format!("\nTABLE: {}", name));
            out.push(format!("   Rows: {}", table.row_count));
            let pks = if table.primary_keys.is_empty() {
                "None".to_string()
            } else {
                table.primary_keys.join(", ")
            };
            out.push(format!("   Primary Keys: {}", pks));

            out.push(format!("   Columns ({}):", table.columns.len()));
            for col in &table.columns {
                let nullable = if col.nullable { "NULL" } else { "NOT NULL" };
                let pk = if table.is_primary_key(&col.name) { " [PK]" } else { "" };
                out.push(format!("      - {}: {} {}{}", col.name, col.data_type, nullable, pk));
            }

            if !table.foreign_keys.is_empty() {
                out.push("   Foreign Keys:".to_string());
                for fk in &table.foreign_keys {
                    out.push(format!(
                        "      - {} → {}.{}",
                        fk.column, fk.references_table, fk.references_column
                    ));
                }
            }

            if !table.indexes.is_empty() {
                out.push("   Indexes:".to_string());
                for idx in &table.indexes {
                    let kind = if idx.unique { "Unique" } else { "Regular" };
                    out.push(format!("      {}: {} on ({})", kind, idx.name, idx.columns.join(", ")));
                }
            }

            out.push("-".repeat(80));
        }

        out.join("\n")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE_SCHEMA: &str = r#"{
        "metadata": {
            "extracted_at": "2025-06-01T10:00:00",
            "database": "postgres",
            "host": "db.example.internal",
            "total_tables": 2
        },
        "tables": {
            "lead_master": {
                "columns": [
                    {"name": "id", "type": "integer", "max_length": null, "nullable": false, "default": null},
                    {"name": "customer_name", "type": "character varying", "max_length": 255, "nullable": true, "default": null},
                    {"name": "source", "type": "text", "nullable": true},
                    {"name": "created_at", "type": "timestamp without time zone", "nullable": true}
                ],
                "primary_keys": ["id"],
                "foreign_keys": [
                    {"column": "cre_id", "references_table": "users", "references_column": "id", "on_update": "NO ACTION", "on_delete": "SET NULL"}
                ],
                "indexes": [
                    {"name": "idx_lead_source", "columns": ["source"], "unique": false}
                ],
                "row_count": 1520,
                "sample_data": [
                    {"id": "1", "customer_name": "Asha", "source": "Walk-in", "created_at": "2025-05-01 09:00:00"},
                    {"id": "2", "customer_name": "Ravi", "source": "Website", "created_at": "2025-05-02 11:30:00"},
                    {"id": "3", "customer_name": null, "source": "Referral", "created_at": "2025-05-03 14:15:00"},
                    {"id": "4", "customer_name": "Meena", "source": "Website", "created_at": "2025-05-04 16:45:00"}
                ]
            },
            "users": {
                "columns": [
                    {"name": "id", "type": "integer", "nullable": false},
                    {"name": "name", "type": "text", "nullable": false}
                ],
                "primary_keys": ["id"],
                "foreign_keys": [],
                "indexes": [{"name": "users_name_key", "column": "name", "unique": true}],
                "row_count": 12,
                "sample_data": []
            }
        }
    }"#;

    pub(crate) fn sample_schema() -> SchemaDescription {
        SchemaDescription::from_json(SAMPLE_SCHEMA).unwrap()
    }

    #[test]
    fn test_parse_snapshot() {
        let schema = sample_schema();
        assert_eq!(schema.metadata.total_tables, 2);
        let leads = schema.table("lead_master").unwrap();
        assert_eq!(leads.columns.len(), 4);
        assert_eq!(leads.columns[1].max_length, Some(255));
        assert!(!leads.columns[0].nullable);
        assert!(leads.is_primary_key("id"));
        assert_eq!(leads.foreign_keys[0].references_table, "users");
        assert_eq!(leads.row_count, 1520);
    }

    #[test]
    fn test_sample_rows_keep_column_order() {
        let schema = sample_schema();
        let row = &schema.table("lead_master").unwrap().sample_data[0];
        let keys: Vec<&String> = row.keys().collect();
        assert_eq!(keys, vec!["id", "customer_name", "source", "created_at"]);
    }

    #[test]
    fn test_legacy_single_column_index() {
        let schema = sample_schema();
        let idx = &schema.table("users").unwrap().indexes[0];
        assert_eq!(idx.columns, vec!["name".to_string()]);
        assert!(idx.unique);
    }

    #[test]
    fn test_load_missing_file_is_schema_error() {
        let err = SchemaDescription::load("/nonexistent/schema.json").unwrap_err();
        assert!(matches!(err, EngineError::Schema(_)));
    }

    #[test]
    fn test_summary_lists_tables() {
        let summary = sample_schema().summary();
        assert!(summary.contains("TABLE: lead_master"));
        assert!(summary.contains("cre_id → users.id"));
        assert!(summary.contains("Unique: users_name_key on (name)"));
    }
}
