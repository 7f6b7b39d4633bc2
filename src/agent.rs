//! Tool Agent - let the model pick one tool, run it, then answer from its output
//!
//! The model sees the tool catalogue and replies either with a JSON tool call
//! or with a plain answer. A tool call is validated and dispatched, and the
//! payload goes back to the model for the final wording.

use crate::error::{AgentError, Result};
use crate::llm::ModelGateway;
use crate::synthesis::sanitize_sql;
use crate::tools::{tool_descriptors, ToolCall, ToolDispatcher};
use serde_json::Value;
use std::fmt::Write as _;
use tracing::{debug, info};

/// Tool payloads longer than this are cut before the answer prompt
const MAX_PAYLOAD_CHARS: usize = 12_000;

const ANSWER_RULES: &str = "You answer questions about sales data. Use only the tool result \
you are given. Be brief and answer in the language of the question.";

/// What happened during one agent request
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTurn {
    pub tool_call: Option<ToolCall>,
    pub tool_output: Option<String>,
    pub answer: String,
}

impl AgentTurn {
    pub fn render(&self) -> String {
        let mut out = String::new();
        match (&self.tool_call, &self.tool_output) {
            (Some(call), Some(output)) => {
                let arguments = serde_json::to_value(call)
                    .map(|v| v["arguments"].to_string())
                    .unwrap_or_default();
                let _ = writeln!(out, "Tool calls:");
                let _ = writeln!(out, "- {} with arguments {}", call.name(), arguments);
                let _ = writeln!(out, "Tool response:");
                let _ = writeln!(out, "{}", output);
            }
            _ => {
                let _ = writeln!(out, "No tools were used.");
            }
        }
        let _ = writeln!(out, "Final answer:");
        let _ = writeln!(out, "{}", self.answer);
        out
    }
}

/// The model's first reply, once parsed
#[derive(Debug, PartialEq)]
enum Decision {
    Call(ToolCall),
    Answer(String),
}

pub struct ToolAgent<'a> {
    gateway: &'a dyn ModelGateway,
    tools: &'a dyn ToolDispatcher,
}

impl<'a> ToolAgent<'a> {
    pub fn new(gateway: &'a dyn ModelGateway, tools: &'a dyn ToolDispatcher) -> Self {
        Self { gateway, tools }
    }

    pub async fn run(&self, request: &str) -> Result<AgentTurn> {
        let reply = self.gateway.complete(&selection_prompt(), request).await?;
        debug!(reply = %reply, "Tool selection reply");

        let call = match parse_decision(&reply)? {
            Decision::Answer(answer) => {
                info!("Model answered without a tool");
                return Ok(AgentTurn {
                    tool_call: None,
                    tool_output: None,
                    answer,
                });
            }
            Decision::Call(call) => call,
        };

        info!(tool = call.name(), "Dispatching tool call");
        let output = self.tools.dispatch(&call).await?;

        let user = format!(
            "Question: {}\n\nTool {} returned:\n{}",
            request,
            call.name(),
            truncate_chars(&output, MAX_PAYLOAD_CHARS)
        );
        let answer = self.gateway.complete(ANSWER_RULES, &user).await?;

        Ok(AgentTurn {
            tool_call: Some(call),
            tool_output: Some(output),
            answer: answer.trim().to_string(),
        })
    }
}

fn selection_prompt() -> String {
    let catalogue = serde_json::to_string_pretty(&tool_descriptors()).unwrap_or_default();
    format!(
        "You can call one of these tools over a sales database:\n{}\n\n\
         If a tool helps, reply ONLY with a JSON object like \
         {{\"name\": \"fetch_top_n\", \"arguments\": {{\"top\": 5}}}}.\n\
         If no tool is needed, reply with {{\"answer\": \"...\"}}.",
        catalogue
    )
}

fn parse_decision(reply: &str) -> Result<Decision> {
    // sanitize_sql also removes code fences, which models add around JSON too
    let cleaned = sanitize_sql(reply);
    let object = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => return Ok(Decision::Answer(cleaned)),
    };

    let value: Value = match serde_json::from_str(object) {
        Ok(v) => v,
        Err(_) => return Ok(Decision::Answer(cleaned)),
    };

    if let Some(name) = value.get("name").and_then(Value::as_str) {
        let call = ToolCall::from_parts(name, value.get("arguments").cloned())?;
        return Ok(Decision::Call(call));
    }
    if let Some(answer) = value.get("answer").and_then(Value::as_str) {
        return Ok(Decision::Answer(answer.to_string()));
    }
    Err(AgentError::InvalidToolArguments(format!(
        "reply is neither a tool call nor an answer: {}",
        object
    )))
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
