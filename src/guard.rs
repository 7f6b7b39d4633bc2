//! Read-only policy gate
//!
//! Runs before any statement is sent to the store. A statement that does not
//! start with the SELECT keyword is rejected outright. When the statement
//! parses, it must also be exactly one query; unparseable SQL is passed on
//! and left for SQLite to reject.

use crate::error::{AgentError, Result};
use sqlparser::ast::Statement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use tracing::{debug, warn};

pub const POLICY_VIOLATION_MESSAGE: &str = "Only SELECT queries are allowed";

/// Whether the first token of `sql` is SELECT (case-insensitive)
pub fn starts_with_select(sql: &str) -> bool {
    let trimmed = sql.trim_start();
    let Some(head) = trimmed.get(..6) else {
        return false;
    };
    if !head.eq_ignore_ascii_case("select") {
        return false;
    }
    match trimmed[6..].chars().next() {
        None => true,
        Some(c) => !(c.is_alphanumeric() || c == '_'),
    }
}

/// Check `sql` against the read-only policy
pub fn check_read_only(sql: &str) -> Result<()> {
    if !starts_with_select(sql) {
        warn!(sql = %sql, "Rejected non-SELECT statement");
        return Err(AgentError::PolicyViolation(POLICY_VIOLATION_MESSAGE.to_string()));
    }

    match Parser::parse_sql(&SQLiteDialect {}, sql) {
        Ok(statements) => {
            if statements.len() > 1 {
                warn!(count = statements.len(), "Rejected multi-statement SQL");
                return Err(AgentError::PolicyViolation(POLICY_VIOLATION_MESSAGE.to_string()));
            }
            if let Some(stmt) = statements.first() {
                if !matches!(stmt, Statement::Query(_)) {
                    return Err(AgentError::PolicyViolation(POLICY_VIOLATION_MESSAGE.to_string()));
                }
            }
        }
        Err(e) => {
            debug!("SQL parsing failed ({}), leaving validation to SQLite", e);
        }
    }

    Ok(())
}
