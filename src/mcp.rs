//! MCP (Model Context Protocol) server implementation
//!
//! Implements the protocol directly over stdio using JSON-RPC 2.0 and exposes
//! the read-only index queries as tools. Every tool answers with a JSON
//! string; query failures are reported inside that string, so only protocol
//! errors (unknown method, missing arguments) become JSON-RPC errors.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::query::QueryTools;

/// JSON-RPC 2.0 request
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Handle initialize request
fn handle_initialize(_params: Option<Value>) -> Result<Value> {
    Ok(json!({
        "protocolVersion": "2024-11-05",
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": "project-index",
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

/// Handle tools/list request
fn handle_list_tools(_params: Option<Value>) -> Result<Value> {
    Ok(json!({
        "tools": [
            {
                "name": "load_core_index",
                "description": "Load the Core Index: directory tree, stats, module list with file counts, file→module map and critical documentation.\n\n**Use this first.** Pick modules from the result, then load only those with load_detail.",
                "inputSchema": {
                    "type": "object",
                    "properties": {}
                }
            },
            {
                "name": "load_detail",
                "description": "Load the Detail Shard of one module: per-file functions, classes, imports, local and external call graph, standard/archive documentation.\n\n**Example:** module \"src-components\"",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "module": {
                            "type": "string",
                            "description": "Module id as listed in the Core Index (letters, digits, '_', '-', '.')"
                        }
                    },
                    "required": ["module"]
                }
            },
            {
                "name": "search_files",
                "description": "Search indexed file paths.\n\nPlain patterns match as case-insensitive substrings; patterns containing * or ? match as globs (e.g. \"src/**/*.py\").\n\n**Returns:** {pattern, matches: [{path, module}], total, truncated}",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "pattern": {
                            "type": "string",
                            "description": "Substring or glob pattern"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of matches (default: 50)"
                        }
                    },
                    "required": ["pattern"]
                }
            },
            {
                "name": "get_file_info",
                "description": "Everything the index knows about one file: module, language, functions, classes, imports, documentation summary and last commit.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "File path relative to the project root"
                        }
                    },
                    "required": ["path"]
                }
            }
        ]
    }))
}

/// Handle tools/call request
fn handle_call_tool(tools: &mut QueryTools, params: Option<Value>) -> Result<Value> {
    let params = params.ok_or_else(|| anyhow::anyhow!("Missing params"))?;
    let name = params["name"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("Missing tool name"))?;
    let arguments = &params["arguments"];

    let text = match name {
        "load_core_index" => tools.load_core_index(),
        "load_detail" => {
            let module = arguments["module"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("Missing module"))?;
            tools.load_detail(module)
        }
        "search_files" => {
            let pattern = arguments["pattern"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("Missing pattern"))?;
            let limit = arguments["limit"].as_u64().map(|n| n as usize);
            tools.search_files(pattern, limit)
        }
        "get_file_info" => {
            let path = arguments["path"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("Missing path"))?;
            tools.get_file_info(path)
        }
        _ => return Err(anyhow::anyhow!("Unknown tool: {}", name)),
    };

    Ok(json!({
        "content": [{
            "type": "text",
            "text": text
        }]
    }))
}

/// Process a single JSON-RPC request
fn process_request(tools: &mut QueryTools, request: JsonRpcRequest) -> JsonRpcResponse {
    log::debug!("MCP request: method={}", request.method);

    let result = match request.method.as_str() {
        "initialize" => handle_initialize(request.params),
        "tools/list" => handle_list_tools(request.params),
        "tools/call" => handle_call_tool(tools, request.params),
        _ => Err(anyhow::anyhow!("Unknown method: {}", request.method)),
    };

    match result {
        Ok(value) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: Some(value),
            error: None,
        },
        Err(e) => {
            log::error!("MCP error: {}", e);
            JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: None,
                error: Some(JsonRpcError {
                    code: -32603,
                    message: e.to_string(),
                    data: None,
                }),
            }
        }
    }
}

/// Serve requests read line by line from `input`, one response line each
pub fn serve<R: BufRead, W: Write>(root: &Path, input: R, mut output: W) -> Result<()> {
    let mut tools = QueryTools::new(root);

    for line in input.lines() {
        let line = line?;

        // Skip empty lines
        if line.trim().is_empty() {
            continue;
        }

        log::debug!("MCP input: {}", line);

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                log::error!("Failed to parse JSON-RPC request: {}", e);
                continue;
            }
        };

        // Notifications get no response
        if request.id.is_none() && request.method.starts_with("notifications/") {
            continue;
        }

        let response = process_request(&mut tools, request);
        let response_json = serde_json::to_string(&response)?;
        writeln!(output, "{}", response_json)?;
        output.flush()?;

        log::debug!("MCP output: {}", response_json);
    }

    Ok(())
}

/// Run the MCP server on stdio
pub fn run_server(root: &Path) -> Result<()> {
    log::info!("Starting project index MCP server on stdio ({})", root.display());

    let stdin = io::stdin();
    serve(root, stdin.lock(), io::stdout())?;

    log::info!("Project index MCP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use tempfile::TempDir;

    fn roundtrip(root: &Path, requests: &[Value]) -> Vec<Value> {
        let input: String = requests.iter().map(|r| format!("{}\n", r)).collect();
        let mut out = Vec::new();
        serve(root, input.as_bytes(), &mut out).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_initialize_and_list() {
        let temp = TempDir::new().unwrap();
        let responses = roundtrip(
            temp.path(),
            &[
                json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            ],
        );

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "project-index");
        let names: Vec<&str> = responses[1]["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["load_core_index", "load_detail", "search_files", "get_file_info"]);
    }

    #[test]
    fn test_tool_calls() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("app.py"), "def main():\n    pass\n").unwrap();
        crate::indexer::build(temp.path(), &IndexConfig::default()).unwrap();

        let responses = roundtrip(
            temp.path(),
            &[
                json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
                       "params": {"name": "search_files", "arguments": {"pattern": "app"}}}),
                json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                       "params": {"name": "load_detail", "arguments": {"module": "missing"}}}),
                json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                       "params": {"name": "load_detail", "arguments": {}}}),
                json!({"jsonrpc": "2.0", "id": 4, "method": "bogus"}),
            ],
        );

        let text = responses[0]["result"]["content"][0]["text"].as_str().unwrap();
        let found: Value = serde_json::from_str(text).unwrap();
        assert_eq!(found["matches"][0]["path"], "app.py");

        let text = responses[1]["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("module 'missing' not found"));

        assert_eq!(responses[2]["error"]["message"], "Missing module");
        assert_eq!(responses[3]["error"]["code"], -32603);
    }
}
