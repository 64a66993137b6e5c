/// Log Explorer tool server
///
/// Thin stdio glue: line-delimited JSON-RPC 2.0 requests on stdin,
/// responses on stdout. All engine behavior lives in the library;
/// diagnostics go to stderr so stdout stays protocol-clean.
use anyhow::Result;
use log_explorer::tools::LogExplorer;
use serde_json::{json, Value};
use tokio::io::{stdin, stdout, AsyncBufReadExt, AsyncWriteExt, BufReader};

const SERVER_NAME: &str = "log-explorer";
const PROTOCOL_VERSION: &str = "2024-11-05";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let mut explorer = LogExplorer::new();
    let mut lines = BufReader::new(stdin()).lines();
    let mut out = stdout();

    tracing::info!("log explorer listening on stdio");
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Value>(&line) {
            Ok(request) => dispatch(&mut explorer, request).await,
            Err(e) => Some(error_response(
                Value::Null,
                -32700,
                &format!("Parse error: {e}"),
            )),
        };
        if let Some(response) = response {
            out.write_all(serde_json::to_string(&response)?.as_bytes())
                .await?;
            out.write_all(b"\n").await?;
            out.flush().await?;
        }
    }
    Ok(())
}

async fn dispatch(explorer: &mut LogExplorer, request: Value) -> Option<Value> {
    let method = request
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    // Requests without an id are notifications and get no response.
    let id = request.get("id").cloned()?;

    let result = match method.as_str() {
        "initialize" => json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
        }),
        "ping" => json!({}),
        "tools/list" => json!({ "tools": tool_catalogue() }),
        "tools/call" => {
            let params = request.get("params").cloned().unwrap_or(Value::Null);
            let name = params
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let arguments = params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));
            tracing::info!(tool = %name, "tool call");
            let value = explorer.handle(&name, arguments).await;
            json!({ "content": [{ "type": "text", "text": value.to_string() }] })
        }
        other => {
            return Some(error_response(
                id,
                -32601,
                &format!("Method not found: {other}"),
            ))
        }
    };
    Some(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

fn tool_catalogue() -> Vec<Value> {
    vec![
        json!({
            "name": "overview",
            "description": "File size, line count, detected timestamp format and time range",
            "inputSchema": {
                "type": "object",
                "properties": { "file": { "type": "string" } },
                "required": ["file"],
            },
        }),
        json!({
            "name": "cluster",
            "description": "Group similar lines into clusters with induced templates",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file": { "type": "string" },
                    "max_clusters": { "type": "integer" },
                    "threshold": { "type": "number" },
                    "filter": { "type": "string" },
                },
                "required": ["file"],
            },
        }),
        json!({
            "name": "cluster_drill",
            "description": "Split one cluster into finer sub-clusters",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file": { "type": "string" },
                    "cluster_id": { "type": "integer" },
                    "max_subclusters": { "type": "integer" },
                },
                "required": ["file", "cluster_id"],
            },
        }),
        json!({
            "name": "timeline",
            "description": "Time-bucketed histogram with anomaly markers, optionally per cluster",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file": { "type": "string" },
                    "cluster_id": { "type": "integer" },
                    "bucket_size": { "enum": ["auto", "minute", "hour", "day"] },
                },
                "required": ["file"],
            },
        }),
        json!({
            "name": "grep",
            "description": "Count matches of a substring or /regex/ with a few examples",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file": { "type": "string" },
                    "pattern": { "type": "string" },
                    "max_examples": { "type": "integer" },
                    "context_lines": { "type": "integer" },
                },
                "required": ["file", "pattern"],
            },
        }),
        json!({
            "name": "fetch",
            "description": "Raw matching lines with line numbers, paged by offset and limit",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file": { "type": "string" },
                    "filter": { "type": "string" },
                    "offset": { "type": "integer" },
                    "limit": { "type": "integer" },
                },
                "required": ["file"],
            },
        }),
    ]
}
