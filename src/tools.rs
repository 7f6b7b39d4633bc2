//! Tool Server - fixed, parameterized sales queries exposed over stdio JSON-RPC
//!
//! Each tool maps to a single statement with bound parameters. Arguments are
//! validated before anything touches the store. The server remembers the last
//! fetched result so `export_last_result` can write it out afterwards.
//!
//! `query_sales` and `export_query` take free SQL; it goes through the same
//! read-only gate as model-written statements.
//!
//! `ToolClient` is the other side: it spawns the server as a subprocess and
//! talks to it line by line.

use crate::config::AppConfig;
use crate::error::{AgentError, Result};
use crate::executor::{QueryExecutor, QueryResult};
use crate::export::Exporter;
use crate::intent::fold_text;
use crate::store::{SELLERS, SITES};
use async_trait::async_trait;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const MAX_TOP: u32 = 500;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_SQL_LEN: usize = 10_000;

/// Minimum Jaro-Winkler similarity for offering a known name as a suggestion
const SUGGESTION_THRESHOLD: f64 = 0.85;

const SCHEMA_SQL: &str = "SELECT m.name AS tabla, p.name AS columna, p.type AS tipo, \
     p.\"notnull\" AS no_nulo, p.pk AS pk \
     FROM sqlite_master AS m, pragma_table_info(m.name) AS p \
     WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%' ORDER BY m.name, p.cid";

const STATISTICS_SQL: &str = "SELECT COUNT(*) AS total_ventas, \
     COALESCE(SUM(cantidad * precio), 0) AS monto_total, \
     AVG(cantidad * precio) AS promedio FROM ventas";

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

lazy_static! {
    static ref MONTH_RE: Regex = Regex::new(r"^(\d{4}-)?(0[1-9]|1[0-2])$").unwrap();
}

/// One invocation of a tool, as carried in `tools/call`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    FetchTopN { top: u32 },
    FetchByMonth { month: String },
    FetchBySite { site: String },
    FetchBySeller { seller: String },
    ExportLastResult {},
    QuerySales { sql: String },
    DescribeSchema {},
    SalesStatistics {},
    ExportQuery { sql: String, file_name: String },
}

impl ToolCall {
    /// Build a call from a tool name and its (possibly absent) arguments
    pub fn from_parts(name: &str, arguments: Option<Value>) -> Result<Self> {
        let arguments = arguments.unwrap_or_else(|| json!({}));
        let call: ToolCall = serde_json::from_value(json!({ "name": name, "arguments": arguments }))
            .map_err(|e| AgentError::InvalidToolArguments(format!("{}: {}", name, e)))?;
        call.validate()?;
        Ok(call)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::FetchTopN { .. } => "fetch_top_n",
            ToolCall::FetchByMonth { .. } => "fetch_by_month",
            ToolCall::FetchBySite { .. } => "fetch_by_site",
            ToolCall::FetchBySeller { .. } => "fetch_by_seller",
            ToolCall::ExportLastResult {} => "export_last_result",
            ToolCall::QuerySales { .. } => "query_sales",
            ToolCall::DescribeSchema {} => "describe_schema",
            ToolCall::SalesStatistics {} => "sales_statistics",
            ToolCall::ExportQuery { .. } => "export_query",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ToolCall::FetchTopN { top } => {
                if *top == 0 || *top > MAX_TOP {
                    return Err(AgentError::InvalidToolArguments(format!(
                        "top must be between 1 and {}, got {}",
                        MAX_TOP, top
                    )));
                }
            }
            ToolCall::FetchByMonth { month } => {
                if !MONTH_RE.is_match(month.trim()) {
                    return Err(AgentError::InvalidToolArguments(format!(
                        "month must look like YYYY-MM or MM, got {:?}",
                        month
                    )));
                }
            }
            ToolCall::FetchBySite { site: name } | ToolCall::FetchBySeller { seller: name } => {
                let trimmed = name.trim();
                if trimmed.is_empty() {
                    return Err(AgentError::InvalidToolArguments(format!(
                        "{} needs a non-empty name",
                        self.name()
                    )));
                }
                if trimmed.chars().count() > MAX_NAME_LEN {
                    return Err(AgentError::InvalidToolArguments(format!(
                        "names are limited to {} characters",
                        MAX_NAME_LEN
                    )));
                }
            }
            ToolCall::QuerySales { sql } => validate_sql(sql)?,
            ToolCall::ExportQuery { sql, file_name } => {
                validate_sql(sql)?;
                validate_file_name(file_name)?;
            }
            ToolCall::ExportLastResult {} | ToolCall::DescribeSchema {} | ToolCall::SalesStatistics {} => {}
        }
        Ok(())
    }
}

fn validate_sql(sql: &str) -> Result<()> {
    if sql.trim().is_empty() {
        return Err(AgentError::InvalidToolArguments("sql must not be empty".to_string()));
    }
    if sql.len() > MAX_SQL_LEN {
        return Err(AgentError::InvalidToolArguments(format!(
            "sql is limited to {} bytes",
            MAX_SQL_LEN
        )));
    }
    Ok(())
}

/// A bare file name: no directories, nothing that climbs out of the output dir
fn validate_file_name(file_name: &str) -> Result<()> {
    let trimmed = file_name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_LEN {
        return Err(AgentError::InvalidToolArguments(format!(
            "file_name must be 1 to {} characters",
            MAX_NAME_LEN
        )));
    }
    if trimmed.contains(['/', '\\']) || trimmed.contains("..") {
        return Err(AgentError::InvalidToolArguments(format!(
            "file_name must not contain a path, got {:?}",
            file_name
        )));
    }
    Ok(())
}

/// Tool descriptors returned by `tools/list`
pub fn tool_descriptors() -> Value {
    json!([
        {
            "name": "fetch_top_n",
            "description": "Return the first N sales records",
            "inputSchema": {
                "type": "object",
                "properties": { "top": { "type": "integer", "minimum": 1, "maximum": MAX_TOP } },
                "required": ["top"]
            }
        },
        {
            "name": "fetch_by_month",
            "description": "Return the sales of one month, given as YYYY-MM or MM",
            "inputSchema": {
                "type": "object",
                "properties": { "month": { "type": "string" } },
                "required": ["month"]
            }
        },
        {
            "name": "fetch_by_site",
            "description": format!("Return the sales of one site ({})", SITES.join(", ")),
            "inputSchema": {
                "type": "object",
                "properties": { "site": { "type": "string" } },
                "required": ["site"]
            }
        },
        {
            "name": "fetch_by_seller",
            "description": "Return the sales of one seller",
            "inputSchema": {
                "type": "object",
                "properties": { "seller": { "type": "string" } },
                "required": ["seller"]
            }
        },
        {
            "name": "export_last_result",
            "description": "Write the last fetched result to a CSV file and return its path",
            "inputSchema": { "type": "object", "properties": {} }
        },
        {
            "name": "query_sales",
            "description": "Run one read-only SELECT statement against the sales database",
            "inputSchema": {
                "type": "object",
                "properties": { "sql": { "type": "string", "maxLength": MAX_SQL_LEN } },
                "required": ["sql"]
            }
        },
        {
            "name": "describe_schema",
            "description": "List every table with its columns, types, NOT NULL flags and primary key",
            "inputSchema": { "type": "object", "properties": {} }
        },
        {
            "name": "sales_statistics",
            "description": "Number of sales, total amount and average amount per sale",
            "inputSchema": { "type": "object", "properties": {} }
        },
        {
            "name": "export_query",
            "description": "Run one read-only SELECT statement and write its result to a named CSV file",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "sql": { "type": "string", "maxLength": MAX_SQL_LEN },
                    "file_name": { "type": "string", "maxLength": MAX_NAME_LEN }
                },
                "required": ["sql", "file_name"]
            }
        }
    ])
}

fn fold_name(name: &str) -> String {
    fold_text(name).split_whitespace().join(" ")
}

/// The known name equal to `input` once case, accents and spacing are
/// ignored. Anything else is returned trimmed and matched as typed.
pub fn resolve_name(input: &str, known: &[&str]) -> String {
    let trimmed = input.trim();
    let folded = fold_name(trimmed);

    known
        .iter()
        .find(|candidate| fold_name(candidate) == folded)
        .map(|candidate| candidate.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Closest known name to a near miss, if any is similar enough.
/// Never used as a filter value; only reported back to the caller.
pub fn suggest_name(input: &str, known: &[&str]) -> Option<String> {
    let folded = fold_name(input);

    known
        .iter()
        .map(|candidate| (candidate, fold_name(candidate)))
        .filter(|(_, candidate)| *candidate != folded)
        .map(|(name, candidate)| (name, strsim::jaro_winkler(&folded, &candidate)))
        .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| name.to_string())
}

fn envelope(result: &QueryResult) -> Value {
    match result.error_message() {
        Some(message) => json!({ "ok": false, "error": message }),
        None => json!({
            "ok": true,
            "row_count": result.row_count,
            "columns": result.columns,
            "rows": result.rows_as_json(),
        }),
    }
}

fn error_envelope(err: &AgentError) -> Value {
    json!({ "ok": false, "error": err.to_string() })
}

/// Executes tool calls against the sales store
pub struct ToolServer {
    executor: QueryExecutor,
    exporter: Exporter,
    last_result: Mutex<Option<QueryResult>>,
}

impl ToolServer {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            executor: QueryExecutor::new(&config.db_path),
            exporter: Exporter::new(&config.output_dir),
            last_result: Mutex::new(None),
        }
    }

    /// Run one call and return its JSON envelope
    pub fn call(&self, call: &ToolCall) -> Value {
        if let Err(e) = call.validate() {
            return error_envelope(&e);
        }
        info!(tool = call.name(), "Tool call");

        match call {
            ToolCall::FetchTopN { top } => {
                let top = i64::from(*top);
                self.fetch("SELECT * FROM ventas LIMIT ?1", &[&top])
            }
            ToolCall::FetchByMonth { month } => {
                let month = month.trim();
                let sql = if month.len() == 2 {
                    "SELECT * FROM ventas WHERE strftime('%m', fecha) = ?1 ORDER BY fecha"
                } else {
                    "SELECT * FROM ventas WHERE strftime('%Y-%m', fecha) = ?1 ORDER BY fecha"
                };
                self.fetch(sql, &[&month])
            }
            ToolCall::FetchBySite { site } => {
                self.fetch_by_name("SELECT * FROM ventas WHERE sede = ?1 ORDER BY fecha", site, &SITES)
            }
            ToolCall::FetchBySeller { seller } => {
                self.fetch_by_name("SELECT * FROM ventas WHERE vendedor = ?1 ORDER BY fecha", seller, &SELLERS)
            }
            ToolCall::ExportLastResult {} => self.export_last(),
            ToolCall::QuerySales { sql } => self.fetch(sql, &[]),
            ToolCall::DescribeSchema {} => self.describe_schema(),
            ToolCall::SalesStatistics {} => self.fetch(STATISTICS_SQL, &[]),
            ToolCall::ExportQuery { sql, file_name } => self.export_query(sql, file_name.trim()),
        }
    }

    /// Exact-name filter. An empty result carries a `suggestion` when the
    /// name looks like a typo of a known one.
    fn fetch_by_name(&self, sql: &str, input: &str, known: &[&str]) -> Value {
        let name = resolve_name(input, known);
        let mut payload = self.fetch(sql, &[&name]);

        if payload["row_count"] == json!(0) {
            if let (Some(suggestion), Some(fields)) = (suggest_name(&name, known), payload.as_object_mut()) {
                debug!(input = %name, %suggestion, "No exact match");
                fields.insert("suggestion".to_string(), Value::String(suggestion));
            }
        }
        payload
    }

    fn describe_schema(&self) -> Value {
        let result = self.executor.execute(SCHEMA_SQL);
        if result.error_message().is_some() {
            return envelope(&result);
        }

        let mut tables = Map::new();
        for mut column in result.rows_as_json() {
            let Some(fields) = column.as_object_mut() else {
                continue;
            };
            let table = match fields.remove("tabla") {
                Some(Value::String(name)) => name,
                _ => continue,
            };
            let entry = tables.entry(table).or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(columns) = entry {
                columns.push(column);
            }
        }
        json!({ "ok": true, "tables": tables })
    }

    fn export_query(&self, sql: &str, file_name: &str) -> Value {
        let result = self.executor.execute(sql);
        if result.error_message().is_some() {
            return envelope(&result);
        }

        match self.exporter.export_csv(&result, Some(file_name)) {
            Ok(path) => json!({
                "ok": true,
                "path": path.display().to_string(),
                "row_count": result.row_count,
            }),
            Err(e) => error_envelope(&e),
        }
    }

    fn fetch(&self, sql: &str, params: &[&dyn ToSql]) -> Value {
        let result = self.executor.execute_with_params(sql, params);
        let payload = envelope(&result);
        if result.success {
            if let Ok(mut last) = self.last_result.lock() {
                *last = Some(result);
            }
        }
        payload
    }

    fn export_last(&self) -> Value {
        let last = match self.last_result.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        let Some(result) = last else {
            return json!({ "ok": false, "error": "nothing has been fetched yet" });
        };

        match self.exporter.export_csv(&result, None) {
            Ok(path) => json!({
                "ok": true,
                "path": path.display().to_string(),
                "row_count": result.row_count,
            }),
            Err(e) => error_envelope(&e),
        }
    }

    /// Handle one JSON-RPC line. Notifications produce no response.
    pub fn handle_line(&self, line: &str) -> Option<String> {
        let response = match serde_json::from_str::<RpcRequest>(line) {
            Ok(request) => self.handle_request(request)?,
            Err(e) => {
                debug!("Malformed request line: {}", e);
                RpcResponse::error(Value::Null, PARSE_ERROR, format!("parse error: {}", e))
            }
        };
        serde_json::to_string(&response).ok()
    }

    fn handle_request(&self, request: RpcRequest) -> Option<RpcResponse> {
        let id = request.id?;

        let response = match request.method.as_str() {
            "initialize" => RpcResponse::result(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": { "name": "ventas-tools", "version": env!("CARGO_PKG_VERSION") }
                }),
            ),
            "tools/list" => RpcResponse::result(id, json!({ "tools": tool_descriptors() })),
            "tools/call" => {
                let name = request.params.get("name").and_then(Value::as_str);
                let Some(name) = name else {
                    return Some(RpcResponse::error(id, INVALID_PARAMS, "missing tool name"));
                };
                let payload = match ToolCall::from_parts(name, request.params.get("arguments").cloned()) {
                    Ok(call) => self.call(&call),
                    Err(e) => error_envelope(&e),
                };
                let is_error = payload["ok"] != Value::Bool(true);
                RpcResponse::result(
                    id,
                    json!({
                        "content": [{ "type": "text", "text": payload.to_string() }],
                        "isError": is_error
                    }),
                )
            }
            other => RpcResponse::error(id, METHOD_NOT_FOUND, format!("unknown method: {}", other)),
        };
        Some(response)
    }
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RpcResponse {
    jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
    #[serde(default)]
    id: Value,
}

impl RpcResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(json!({ "code": code, "message": message.into() })),
            id,
        }
    }
}

/// Serve tool calls on stdin/stdout until stdin closes
pub async fn serve_stdio(server: ToolServer) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    info!("Tool server listening on stdio");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = server.handle_line(&line) {
            stdout.write_all(response.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    info!("stdin closed, tool server stopping");
    Ok(())
}

/// Anything that can run a tool call and hand back its JSON payload as text
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn dispatch(&self, call: &ToolCall) -> Result<String>;
}

#[async_trait]
impl ToolDispatcher for ToolServer {
    async fn dispatch(&self, call: &ToolCall) -> Result<String> {
        Ok(self.call(call).to_string())
    }
}

struct ClientIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

/// Client for a tool server running as a child process
pub struct ToolClient {
    child: Child,
    io: tokio::sync::Mutex<ClientIo>,
}

impl ToolClient {
    /// Spawn the configured server and complete the `initialize` handshake
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let server = &config.tool_server;
        let mut child = Command::new(&server.command)
            .args(&server.args)
            .env("VENTAS_DB_PATH", &config.db_path)
            .env("VENTAS_OUTPUT_DIR", &config.output_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AgentError::ToolProtocol(format!("cannot start {}: {}", server.command.display(), e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::ToolProtocol("tool server stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::ToolProtocol("tool server stdout unavailable".to_string()))?;

        let client = Self {
            child,
            io: tokio::sync::Mutex::new(ClientIo {
                stdin,
                stdout: BufReader::new(stdout).lines(),
                next_id: 1,
            }),
        };
        client.initialize().await?;
        Ok(client)
    }

    async fn initialize(&self) -> Result<Value> {
        let info = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": { "name": "ventas-agent", "version": env!("CARGO_PKG_VERSION") }
                }),
            )
            .await?;
        self.notify("notifications/initialized").await?;
        debug!(server = %info["serverInfo"], "Tool server initialized");
        Ok(info)
    }

    pub async fn list_tools(&self) -> Result<Vec<String>> {
        let listing = self.request("tools/list", json!({})).await?;
        let tools = listing["tools"]
            .as_array()
            .ok_or_else(|| AgentError::ToolProtocol("tools/list returned no tool array".to_string()))?;
        Ok(tools
            .iter()
            .filter_map(|t| t["name"].as_str().map(str::to_string))
            .collect())
    }

    /// Invoke a tool and return the text payload it produced
    pub async fn call(&self, call: &ToolCall) -> Result<String> {
        let params = serde_json::to_value(call)?;
        let reply = self.request("tools/call", params).await?;
        reply["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AgentError::ToolProtocol(format!("tool reply without text content: {}", reply)))
    }

    /// Close the server's stdin and wait for it to exit
    pub async fn shutdown(self) -> Result<()> {
        let ToolClient { mut child, io } = self;
        drop(io);
        let status = child.wait().await?;
        debug!(?status, "Tool server exited");
        Ok(())
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let mut io = self.io.lock().await;
        let line = json!({ "jsonrpc": "2.0", "method": method }).to_string();
        write_line(&mut io.stdin, &line).await
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let mut io = self.io.lock().await;
        let id = io.next_id;
        io.next_id += 1;

        let line = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }).to_string();
        write_line(&mut io.stdin, &line).await?;

        loop {
            let Some(raw) = io.stdout.next_line().await? else {
                return Err(AgentError::ToolProtocol(format!(
                    "tool server closed the connection during {}",
                    method
                )));
            };
            let response: RpcResponse = match serde_json::from_str(&raw) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping non-JSON line from tool server: {}", e);
                    continue;
                }
            };
            if response.id != json!(id) {
                continue;
            }
            if let Some(error) = response.error {
                return Err(AgentError::ToolProtocol(format!("{} failed: {}", method, error)));
            }
            return Ok(response.result.unwrap_or(Value::Null));
        }
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await?;
    Ok(())
}

#[async_trait]
impl ToolDispatcher for ToolClient {
    async fn dispatch(&self, call: &ToolCall) -> Result<String> {
        self.call(call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_wire_shape() {
        let call = ToolCall::FetchTopN { top: 5 };
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value, json!({ "name": "fetch_top_n", "arguments": { "top": 5 } }));

        let export = ToolCall::from_parts("export_last_result", None).unwrap();
        assert_eq!(export, ToolCall::ExportLastResult {});
    }

    #[test]
    fn test_argument_validation() {
        assert!(ToolCall::from_parts("fetch_top_n", Some(json!({ "top": 0 }))).is_err());
        assert!(ToolCall::from_parts("fetch_top_n", Some(json!({ "top": 501 }))).is_err());
        assert!(ToolCall::from_parts("fetch_top_n", Some(json!({ "top": "5" }))).is_err());
        assert!(ToolCall::from_parts("fetch_top_n", Some(json!({ "top": 500 }))).is_ok());

        assert!(ToolCall::from_parts("fetch_by_month", Some(json!({ "month": "2025-03" }))).is_ok());
        assert!(ToolCall::from_parts("fetch_by_month", Some(json!({ "month": "03" }))).is_ok());
        assert!(ToolCall::from_parts("fetch_by_month", Some(json!({ "month": "13" }))).is_err());
        assert!(ToolCall::from_parts("fetch_by_month", Some(json!({ "month": "03%' OR 1=1" }))).is_err());

        assert!(ToolCall::from_parts("fetch_by_site", Some(json!({ "site": "  " }))).is_err());
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(ToolCall::from_parts("fetch_by_seller", Some(json!({ "seller": long }))).is_err());

        let err = ToolCall::from_parts("drop_everything", None).unwrap_err();
        assert!(matches!(err, AgentError::InvalidToolArguments(_)));

        assert!(ToolCall::from_parts("query_sales", Some(json!({ "sql": "SELECT 1" }))).is_ok());
        assert!(ToolCall::from_parts("query_sales", Some(json!({ "sql": " " }))).is_err());
        assert!(ToolCall::from_parts("query_sales", None).is_err());
        let huge = format!("SELECT '{}'", "x".repeat(MAX_SQL_LEN));
        assert!(ToolCall::from_parts("query_sales", Some(json!({ "sql": huge }))).is_err());

        let export = |file_name: &str| {
            ToolCall::from_parts(
                "export_query",
                Some(json!({ "sql": "SELECT * FROM ventas", "file_name": file_name })),
            )
        };
        assert!(export("ventas_cali").is_ok());
        assert!(export("informe.csv").is_ok());
        assert!(export("").is_err());
        assert!(export("../ventas").is_err());
        assert!(export("/tmp/ventas").is_err());
        assert!(export("sub\\ventas").is_err());

        assert_eq!(
            ToolCall::from_parts("describe_schema", None).unwrap(),
            ToolCall::DescribeSchema {}
        );
    }

    #[test]
    fn test_resolve_name() {
        assert_eq!(resolve_name("bogota", &SITES), "Bogotá");
        assert_eq!(resolve_name("MEDELLIN ", &SITES), "Medellín");
        assert_eq!(resolve_name("maria  lopez", &SELLERS), "María López");
        assert_eq!(resolve_name("Tokyo", &SITES), "Tokyo");

        // near misses are matched as typed
        assert_eq!(resolve_name("Luis Martin", &SELLERS), "Luis Martin");
        assert_eq!(resolve_name("Cal", &SITES), "Cal");
    }

    #[test]
    fn test_suggest_name() {
        assert_eq!(suggest_name("Luis Martin", &SELLERS).as_deref(), Some("Luis Martínez"));
        assert_eq!(suggest_name("Cal", &SITES).as_deref(), Some("Cali"));
        assert_eq!(suggest_name("cali", &SITES), None);
        assert_eq!(suggest_name("Tokyo", &SITES), None);
    }

    #[test]
    fn test_descriptors_cover_every_tool() {
        let names: Vec<String> = tool_descriptors()
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        for call in [
            ToolCall::FetchTopN { top: 1 },
            ToolCall::FetchByMonth { month: "01".into() },
            ToolCall::FetchBySite { site: "Cali".into() },
            ToolCall::FetchBySeller { seller: "Ana García".into() },
            ToolCall::ExportLastResult {},
            ToolCall::QuerySales { sql: "SELECT 1".into() },
            ToolCall::DescribeSchema {},
            ToolCall::SalesStatistics {},
            ToolCall::ExportQuery { sql: "SELECT 1".into(), file_name: "uno".into() },
        ] {
            assert!(names.contains(&call.name().to_string()));
        }
        assert_eq!(names.len(), 9);
    }
}
