//! SQL Synthesis - turn a request plus the schema into one SQL statement
//!
//! The model is asked for a bare SELECT, but the reply is always cleaned up
//! afterwards. Whether the statement is actually read-only is checked later
//! by the guard, not here.

use crate::error::{AgentError, Result};
use crate::intent::fold_text;
use crate::llm::ModelGateway;
use tracing::{debug, info};

const RULES: &str = r#"You translate requests about a sales database into SQLite SQL.

Rules:
1. Only SELECT queries
2. No semicolon at the end
3. No markdown formatting and no code blocks
4. No explanations or comments, only the SQL
If the request cannot be answered with a query over this schema, reply exactly:
cannot produce a query for that request"#;

/// Refusal phrases the model uses when it will not write a query
const REFUSALS: &[&str] = &[
    "cannot produce a query for that request",
    "no puedo generar una querry sql",
    "no puedo generar una consulta sql",
];

pub struct SqlSynthesizer<'a> {
    gateway: &'a dyn ModelGateway,
}

impl<'a> SqlSynthesizer<'a> {
    pub fn new(gateway: &'a dyn ModelGateway) -> Self {
        Self { gateway }
    }

    /// Ask the model for SQL answering `request` and clean up the reply
    pub async fn synthesize(&self, request: &str, schema_description: &str) -> Result<String> {
        let (system, user) = build_prompt(request, schema_description);
        let raw = self.gateway.complete(&system, &user).await?;
        debug!(raw = %raw, "Raw synthesis reply");

        let sql = sanitize_sql(&raw);
        if sql.is_empty() {
            return Err(AgentError::SynthesisDegenerate(
                "the model returned an empty reply".to_string(),
            ));
        }
        if is_refusal(&sql) {
            return Err(AgentError::SynthesisDegenerate(sql));
        }

        info!(sql = %sql, "Synthesized SQL");
        Ok(sql)
    }
}

/// System instruction and user message for one synthesis call
pub fn build_prompt(request: &str, schema_description: &str) -> (String, String) {
    let system = format!("{}\n\nSchema:\n{}", RULES, schema_description);
    let user = format!(
        "User request: {}\n\nReply ONLY with the SQL statement:",
        request
    );
    (system, user)
}

/// Strip whitespace, every code fence marker and the trailing semicolon.
/// A run like `;;` is removed entirely so the result never ends in `;`.
pub fn sanitize_sql(raw: &str) -> String {
    let without_fences = raw.replace("```sql", "").replace("```SQL", "").replace("```", "");
    without_fences
        .trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string()
}

fn is_refusal(text: &str) -> bool {
    let folded = fold_text(text);
    REFUSALS.iter().any(|r| folded.contains(r))
}
