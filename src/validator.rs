//! SQL Validator
//!
//! Textual deny-list/allow-list check applied before anything reaches the
//! database, backed by a parse of the statement when the parser understands it.
//!
//! The keyword scan is substring based: identifiers such as `created_at` or
//! `updated_by` trip it (false positives), and it knows nothing about quoting.

use serde::{Deserialize, Serialize};
use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::{debug, warn};

/// Checked in this order; the first hit is reported.
pub const FORBIDDEN_KEYWORDS: [&str; 9] = [
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub error: Option<String>,
}

impl ValidationResult {
    fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    fn rejected(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SqlValidator;

impl SqlValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, sql: &str) -> ValidationResult {
        let sql_upper = sql.to_uppercase();

        if let Some(keyword) = FORBIDDEN_KEYWORDS.iter().find(|kw| sql_upper.contains(*kw)) {
            warn!("Rejected SQL containing {}", keyword);
            return ValidationResult::rejected(format!("Query contains forbidden operation: {}", keyword));
        }

        if !sql_upper.trim().starts_with("SELECT") {
            warn!("Rejected non-SELECT SQL");
            return ValidationResult::rejected("Only SELECT queries are allowed");
        }

        match Parser::parse_sql(&PostgreSqlDialect {}, sql) {
            Ok(statements) => {
                if statements.len() != 1 {
                    return ValidationResult::rejected(format!(
                        "Only a single SELECT statement is allowed, found {}",
                        statements.len()
                    ));
                }
                match &statements[0] {
                    Statement::Query(query) => {
                        if let SetExpr::Select(select) = query.body.as_ref() {
                            if select.into.is_some() {
                                return ValidationResult::rejected("SELECT ... INTO is not allowed");
                            }
                        }
                    }
                    _ => return ValidationResult::rejected("Only SELECT queries are allowed"),
                }
            }
            // The database is the final judge of syntax the parser does not know.
            Err(e) => debug!("SQL did not parse, relying on keyword checks: {}", e),
        }

        ValidationResult::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_select_is_valid() {
        let result = SqlValidator::new().validate("SELECT COUNT(*) FROM lead_master WHERE source = 'Website';");
        assert_eq!(result, ValidationResult::ok());
    }

    #[test]
    fn test_forbidden_keywords_any_case_anywhere() {
        let validator = SqlValidator::new();
        for keyword in FORBIDDEN_KEYWORDS {
            let sql = format!("SELECT 1; {} something;", keyword.to_lowercase());
            let result = validator.validate(&sql);
            assert!(!result.valid);
            assert_eq!(
                result.error.as_deref(),
                Some(format!("Query contains forbidden operation: {}", keyword).as_str())
            );
        }
    }

    #[test]
    fn test_first_keyword_in_list_order_is_reported() {
        let result = SqlValidator::new().validate("INSERT INTO t SELECT * FROM s; DROP TABLE s;");
        assert_eq!(result.error.as_deref(), Some("Query contains forbidden operation: DROP"));
    }

    #[test]
    fn test_non_select_rejected() {
        let validator = SqlValidator::new();
        for sql in ["WITH x AS (SELECT 1) SELECT * FROM x;", "EXPLAIN SELECT 1;", "SHOW search_path;"] {
            let result = validator.validate(sql);
            assert_eq!(result.error.as_deref(), Some("Only SELECT queries are allowed"), "{}", sql);
        }
    }

    #[test]
    fn test_leading_whitespace_is_ignored() {
        assert!(SqlValidator::new().validate("\n   select 1;").valid);
    }

    #[test]
    fn test_identifier_false_positive_is_rejected() {
        // known limitation of the substring scan
        let result = SqlValidator::new().validate("SELECT created_at FROM lead_master;");
        assert_eq!(result.error.as_deref(), Some("Query contains forbidden operation: CREATE"));
    }

    #[test]
    fn test_multiple_statements_rejected() {
        let result = SqlValidator::new().validate("SELECT 1; SELECT 2;");
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("single SELECT"));
    }

    #[test]
    fn test_select_into_rejected() {
        let result = SqlValidator::new().validate("SELECT * INTO leads_copy FROM lead_master;");
        assert!(!result.valid);
    }

    #[test]
    fn test_unparseable_select_falls_back_to_keyword_verdict() {
        assert!(SqlValidator::new().validate("SELECT (((( FROM lead_master;").valid);
    }
}
