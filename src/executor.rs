//! Guarded Query Executor
//!
//! Every statement goes through the read-only gate first. The store is only
//! opened when the gate passes, once per query, read-only. Whatever happens,
//! the caller gets a `QueryResult` envelope back instead of an error.

use crate::error::{AgentError, Result};
use crate::guard;
use crate::store::SalesStore;
use rusqlite::types::ValueRef;
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// One cell of a result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl CellValue {
    fn from_sql(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => CellValue::Null,
            ValueRef::Integer(i) => CellValue::Integer(i),
            ValueRef::Real(f) => CellValue::Real(f),
            ValueRef::Text(bytes) => CellValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => CellValue::Text(format!("<{} bytes>", bytes.len())),
        }
    }

    /// Numeric view used by charts and spreadsheets
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Real(f) => Some(*f),
            CellValue::Text(s) => s.trim().parse().ok(),
            CellValue::Null => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Real(v) => write!(f, "{}", v),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryErrorKind {
    PolicyViolation,
    Execution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
}

impl From<QueryError> for AgentError {
    fn from(err: QueryError) -> Self {
        match err.kind {
            QueryErrorKind::PolicyViolation => AgentError::PolicyViolation(err.message),
            QueryErrorKind::Execution => AgentError::Execution(err.message),
        }
    }
}

/// Uniform result envelope returned for every statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Success status
    pub success: bool,

    /// The statement as it was submitted
    pub sql: String,

    /// Column names, in result order
    pub columns: Vec<String>,

    /// Materialized rows, each aligned with `columns`
    pub rows: Vec<Vec<CellValue>>,

    /// Number of rows returned
    pub row_count: usize,

    /// Set when `success` is false
    pub error: Option<QueryError>,

    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create a successful result
    pub fn success(sql: &str, columns: Vec<String>, rows: Vec<Vec<CellValue>>, execution_time_ms: u64) -> Self {
        let row_count = rows.len();
        Self {
            success: true,
            sql: sql.to_string(),
            columns,
            rows,
            row_count,
            error: None,
            execution_time_ms,
        }
    }

    /// Create an error result
    pub fn failure(sql: &str, kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            sql: sql.to_string(),
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            error: Some(QueryError {
                kind,
                message: message.into(),
            }),
            execution_time_ms: 0,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    /// Rows as JSON objects keyed by column name
    pub fn rows_as_json(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let object: serde_json::Map<String, serde_json::Value> = self
                    .columns
                    .iter()
                    .zip(row.iter())
                    .map(|(col, cell)| (col.clone(), serde_json::to_value(cell).unwrap_or(serde_json::Value::Null)))
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect()
    }
}

/// Runs statements against the sales database file
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    db_path: PathBuf,
}

impl QueryExecutor {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// Run a model- or user-supplied statement
    pub fn execute(&self, sql: &str) -> QueryResult {
        self.execute_with_params(sql, &[])
    }

    /// Run a statement with bound parameters (`?1`, `?2`, ...)
    pub fn execute_with_params(&self, sql: &str, params: &[&dyn ToSql]) -> QueryResult {
        if let Err(e) = guard::check_read_only(sql) {
            return QueryResult::failure(sql, QueryErrorKind::PolicyViolation, policy_message(e));
        }

        let started = Instant::now();
        match self.run(sql, params) {
            Ok((columns, rows)) => {
                let elapsed = started.elapsed().as_millis() as u64;
                info!(rows = rows.len(), elapsed_ms = elapsed, "Query executed");
                QueryResult::success(sql, columns, rows, elapsed)
            }
            Err(e) => {
                warn!(sql = %sql, "Query failed: {}", e);
                QueryResult::failure(
                    sql,
                    QueryErrorKind::Execution,
                    format!("{} (query: {})", e, sql),
                )
            }
        }
    }

    fn run(&self, sql: &str, params: &[&dyn ToSql]) -> Result<(Vec<String>, Vec<Vec<CellValue>>)> {
        if !self.db_path.exists() {
            return Err(AgentError::Execution(format!(
                "database file not found: {}",
                self.db_path.display()
            )));
        }

        let conn = SalesStore::open_read_only(&self.db_path)?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query(params)?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(CellValue::from_sql(row.get_ref(idx)?));
            }
            rows.push(values);
        }

        Ok((columns, rows))
    }
}

fn policy_message(err: AgentError) -> String {
    match err {
        AgentError::PolicyViolation(msg) => msg,
        other => other.to_string(),
    }
}
