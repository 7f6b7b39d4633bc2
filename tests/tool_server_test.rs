use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::TempDir;
use ventas_agent::config::AppConfig;
use ventas_agent::store::{SalesStore, SEED_ROWS};
use ventas_agent::tools::{ToolCall, ToolClient, ToolDispatcher, ToolServer};

fn seeded_config(temp_dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::from_lookup(|_| None).unwrap();
    config.db_path = temp_dir.path().join("ventas.db");
    config.output_dir = temp_dir.path().join("outputs");

    let mut store = SalesStore::open(&config.db_path).unwrap();
    let today = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
    store.seed(&mut StdRng::seed_from_u64(3), today).unwrap();
    config
}

fn rpc(server: &ToolServer, request: Value) -> Value {
    let line = server.handle_line(&request.to_string()).expect("a response");
    serde_json::from_str(&line).unwrap()
}

/// Run `tools/call` and decode the text payload
fn call_tool(server: &ToolServer, id: u64, name: &str, arguments: Value) -> (bool, Value) {
    let response = rpc(
        server,
        json!({ "jsonrpc": "2.0", "id": id, "method": "tools/call",
                "params": { "name": name, "arguments": arguments } }),
    );
    let result = &response["result"];
    let payload: Value = serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
    (result["isError"].as_bool().unwrap(), payload)
}

#[test]
fn test_initialize_and_list() {
    let temp_dir = TempDir::new().unwrap();
    let server = ToolServer::new(&seeded_config(&temp_dir));

    let init = rpc(&server, json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }));
    assert_eq!(init["id"], 1);
    assert_eq!(init["result"]["serverInfo"]["name"], "ventas-tools");

    let list = rpc(&server, json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }));
    let names: Vec<&str> = list["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "fetch_top_n",
            "fetch_by_month",
            "fetch_by_site",
            "fetch_by_seller",
            "export_last_result",
            "query_sales",
            "describe_schema",
            "sales_statistics",
            "export_query"
        ]
    );
}

#[test]
fn test_protocol_errors() {
    let temp_dir = TempDir::new().unwrap();
    let server = ToolServer::new(&seeded_config(&temp_dir));

    let parse = server.handle_line("{not json").unwrap();
    let parse: Value = serde_json::from_str(&parse).unwrap();
    assert_eq!(parse["error"]["code"], -32700);

    let unknown = rpc(&server, json!({ "jsonrpc": "2.0", "id": 9, "method": "resources/list" }));
    assert_eq!(unknown["error"]["code"], -32601);

    let notification = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
    assert!(server.handle_line(&notification.to_string()).is_none());
}

#[test]
fn test_fetch_then_export() {
    let temp_dir = TempDir::new().unwrap();
    let config = seeded_config(&temp_dir);
    let server = ToolServer::new(&config);

    let (is_error, payload) = call_tool(&server, 1, "export_last_result", json!({}));
    assert!(is_error);
    assert_eq!(payload["ok"], false);

    let (is_error, payload) = call_tool(&server, 2, "fetch_top_n", json!({ "top": 5 }));
    assert!(!is_error);
    assert_eq!(payload["row_count"], 5);
    assert_eq!(payload["rows"].as_array().unwrap().len(), 5);

    let (is_error, payload) = call_tool(&server, 3, "export_last_result", json!({}));
    assert!(!is_error);
    let path = PathBuf::from(payload["path"].as_str().unwrap());
    assert_eq!(path.extension().unwrap(), "csv");
    assert!(path.starts_with(&config.output_dir));
    assert_eq!(payload["row_count"], 5);
}

#[test]
fn test_site_and_month_filters() {
    let temp_dir = TempDir::new().unwrap();
    let server = ToolServer::new(&seeded_config(&temp_dir));

    let (_, payload) = call_tool(&server, 1, "fetch_by_site", json!({ "site": "bogota" }));
    assert_eq!(payload["ok"], true);
    let rows = payload["rows"].as_array().unwrap();
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|r| r["sede"] == "Bogotá"));

    let (_, payload) = call_tool(&server, 2, "fetch_by_month", json!({ "month": "2025-05" }));
    assert_eq!(payload["ok"], true);
    let rows = payload["rows"].as_array().unwrap();
    assert!(rows
        .iter()
        .all(|r| r["fecha"].as_str().unwrap().starts_with("2025-05")));

    let (is_error, payload) = call_tool(&server, 3, "fetch_by_month", json!({ "month": "mayo" }));
    assert!(is_error);
    assert!(payload["error"].as_str().unwrap().contains("YYYY-MM"));
}

#[test]
fn test_injection_through_tool_arguments() {
    let temp_dir = TempDir::new().unwrap();
    let config = seeded_config(&temp_dir);
    let server = ToolServer::new(&config);

    let (is_error, payload) = call_tool(
        &server,
        1,
        "fetch_by_seller",
        json!({ "seller": "'; DROP TABLE ventas; --" }),
    );
    assert!(!is_error);
    assert_eq!(payload["row_count"], 0);

    let store = SalesStore::open(&config.db_path).unwrap();
    assert_eq!(store.row_count().unwrap(), SEED_ROWS as i64);
}

#[test]
fn test_near_miss_names_are_not_snapped() {
    let temp_dir = TempDir::new().unwrap();
    let server = ToolServer::new(&seeded_config(&temp_dir));

    let (is_error, payload) = call_tool(&server, 1, "fetch_by_seller", json!({ "seller": "Luis Martin" }));
    assert!(!is_error);
    assert_eq!(payload["row_count"], 0);
    assert_eq!(payload["suggestion"], "Luis Martínez");

    let (_, payload) = call_tool(&server, 2, "fetch_by_site", json!({ "site": "Cal" }));
    assert_eq!(payload["row_count"], 0);
    assert_eq!(payload["suggestion"], "Cali");

    let (_, payload) = call_tool(&server, 3, "fetch_by_site", json!({ "site": "cali" }));
    assert!(payload["row_count"].as_u64().unwrap() > 0);
    assert!(payload.get("suggestion").is_none());
}

#[test]
fn test_query_sales_and_statistics() {
    let temp_dir = TempDir::new().unwrap();
    let server = ToolServer::new(&seeded_config(&temp_dir));

    let (is_error, payload) = call_tool(
        &server,
        1,
        "query_sales",
        json!({ "sql": "SELECT sede, COUNT(*) AS n FROM ventas GROUP BY sede ORDER BY sede" }),
    );
    assert!(!is_error);
    assert_eq!(payload["columns"], json!(["sede", "n"]));
    let total: i64 = payload["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["n"].as_i64().unwrap())
        .sum();
    assert_eq!(total, SEED_ROWS as i64);

    let (is_error, payload) = call_tool(&server, 2, "sales_statistics", json!({}));
    assert!(!is_error);
    let stats = &payload["rows"][0];
    assert_eq!(stats["total_ventas"], SEED_ROWS as i64);
    assert!(stats["monto_total"].as_f64().unwrap() > 0.0);
    assert!(stats["promedio"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_query_sales_rejects_writes_before_the_store() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = AppConfig::from_lookup(|_| None).unwrap();
    config.db_path = temp_dir.path().join("missing.db");
    config.output_dir = temp_dir.path().join("outputs");
    let server = ToolServer::new(&config);

    for (id, sql) in [(1, "DELETE FROM ventas"), (2, "SELECT 1; DROP TABLE ventas")] {
        let (is_error, payload) = call_tool(&server, id, "query_sales", json!({ "sql": sql }));
        assert!(is_error);
        assert_eq!(payload["error"], "Only SELECT queries are allowed");
    }
    let (is_error, _) = call_tool(
        &server,
        3,
        "export_query",
        json!({ "sql": "UPDATE ventas SET precio = 0", "file_name": "x" }),
    );
    assert!(is_error);

    assert!(!config.db_path.exists());
    assert!(!config.output_dir.exists());

    let config = seeded_config(&temp_dir);
    let server = ToolServer::new(&config);
    let (is_error, _) = call_tool(&server, 4, "query_sales", json!({ "sql": "DROP TABLE ventas" }));
    assert!(is_error);
    let store = SalesStore::open(&config.db_path).unwrap();
    assert_eq!(store.row_count().unwrap(), SEED_ROWS as i64);
}

#[test]
fn test_describe_schema() {
    let temp_dir = TempDir::new().unwrap();
    let server = ToolServer::new(&seeded_config(&temp_dir));

    let (is_error, payload) = call_tool(&server, 1, "describe_schema", json!({}));
    assert!(!is_error);
    let columns: Vec<&str> = payload["tables"]["ventas"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["columna"].as_str().unwrap())
        .collect();
    for expected in ["id", "vendedor", "sede", "producto", "cantidad", "precio", "fecha"] {
        assert!(columns.contains(&expected), "{} missing from {:?}", expected, columns);
    }
    let id = payload["tables"]["ventas"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["columna"] == "id")
        .unwrap();
    assert_eq!(id["pk"], 1);
}

#[test]
fn test_export_query_writes_named_file() {
    let temp_dir = TempDir::new().unwrap();
    let config = seeded_config(&temp_dir);
    let server = ToolServer::new(&config);

    let (is_error, payload) = call_tool(
        &server,
        1,
        "export_query",
        json!({ "sql": "SELECT * FROM ventas WHERE sede = 'Cali'", "file_name": "ventas_cali" }),
    );
    assert!(!is_error);
    let path = PathBuf::from(payload["path"].as_str().unwrap());
    assert_eq!(path, config.output_dir.join("ventas_cali.csv"));
    assert!(path.exists());
    assert!(payload["row_count"].as_u64().unwrap() > 0);

    let (is_error, payload) = call_tool(
        &server,
        2,
        "export_query",
        json!({ "sql": "SELECT * FROM ventas", "file_name": "../fuera" }),
    );
    assert!(is_error);
    assert!(payload["error"].as_str().unwrap().contains("file_name"));
}

#[tokio::test]
async fn test_in_process_dispatch() {
    let temp_dir = TempDir::new().unwrap();
    let server = ToolServer::new(&seeded_config(&temp_dir));

    let text = server
        .dispatch(&ToolCall::FetchBySeller { seller: "ana garcia".into() })
        .await
        .unwrap();
    let payload: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(payload["ok"], true);
    assert!(payload["rows"]
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["vendedor"] == "Ana García"));
}

#[tokio::test]
async fn test_client_against_spawned_server() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = seeded_config(&temp_dir);
    config.tool_server.command = PathBuf::from(env!("CARGO_BIN_EXE_ventas-agent"));
    config.tool_server.args = vec!["serve-tools".to_string()];

    let client = ToolClient::connect(&config).await.unwrap();
    let tools = client.list_tools().await.unwrap();
    assert!(tools.contains(&"fetch_by_site".to_string()));

    let text = client.call(&ToolCall::FetchTopN { top: 3 }).await.unwrap();
    let payload: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(payload["row_count"], 3);

    let text = client.dispatch(&ToolCall::ExportLastResult {}).await.unwrap();
    let payload: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(payload["ok"], true);

    client.shutdown().await.unwrap();
}
