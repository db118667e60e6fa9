//! Agent-callable tools over the vault client.
//!
//! Each [`VaultClient`] data operation is exposed as a [`Tool`] with a JSON
//! parameter schema. Tools are collected in a [`ToolRegistry`], which the
//! plugin hands to the host and the HTTP server dispatches into.
//!
//! # Result envelope
//!
//! [`ToolRegistry::invoke`] never returns an error. Every outcome is a
//! [`ToolResult`]:
//!
//! ```json
//! { "content": [{ "type": "text", "text": "{ ... }" }], "isError": false }
//! { "content": [{ "type": "text", "text": "Error: vault request failed: 404 Not Found" }], "isError": true }
//! ```
//!
//! # Built-in tools
//!
//! | Tool | Required | Optional |
//! |------|----------|----------|
//! | `vault_search` | `query` | `limit` (5), `context_length` (200) |
//! | `vault_read` | `path` | |
//! | `vault_write` | `path`, `content` | |
//! | `vault_append` | `path`, `content` | |
//! | `vault_list` | | `folder` (vault root) |

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::client::{VaultClient, DEFAULT_CONTEXT_LENGTH};

/// Default number of hits returned by `vault_search`.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

// ═══════════════════════════════════════════════════════════════════════
// Tool Trait
// ═══════════════════════════════════════════════════════════════════════

/// A named action that agents can discover and call.
///
/// `execute` may fail freely; [`ToolRegistry::invoke`] turns any error into
/// the failure envelope.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores (e.g. `"vault_search"`).
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// JSON Schema with `type: "object"`, `properties` and `required`.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `params` already has schema defaults filled in.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value>;
}

/// Gives tools access to the plugin's single vault client.
#[derive(Clone)]
pub struct ToolContext {
    client: Arc<VaultClient>,
}

impl ToolContext {
    pub fn new(client: Arc<VaultClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &VaultClient {
        &self.client
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Result Envelope
// ═══════════════════════════════════════════════════════════════════════

/// One item of a tool result. Always `type: "text"` here.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// Uniform outcome of a tool call.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolResult {
    /// Success envelope carrying `payload` as pretty-printed JSON text.
    pub fn success(payload: &Value) -> Self {
        let text = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
        Self::text(text, false)
    }

    /// Failure envelope with text `Error: <message>`.
    pub fn failure(message: impl std::fmt::Display) -> Self {
        Self::text(format!("Error: {}", message), true)
    }

    fn text(text: String, is_error: bool) -> Self {
        Self {
            content: vec![ToolContent {
                kind: "text".to_string(),
                text,
            }],
            is_error,
        }
    }

    /// Concatenated text of every content item.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parse the success payload back into JSON.
    pub fn payload(&self) -> Option<Value> {
        if self.is_error {
            return None;
        }
        serde_json::from_str(&self.text_content()).ok()
    }
}

/// Tool descriptor for listings (`GET /tools/list`).
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in Tool Implementations
// ═══════════════════════════════════════════════════════════════════════

/// `vault_search`: full-text search, truncated to `limit` in server order.
pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "vault_search"
    }

    fn description(&self) -> &str {
        "Full-text search across the notes vault"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "limit": { "type": "integer", "description": "Max results", "default": DEFAULT_SEARCH_LIMIT },
                "context_length": { "type": "integer", "description": "Characters of context around each match", "default": DEFAULT_CONTEXT_LENGTH }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = str_param(&params, "query");
        if query.trim().is_empty() {
            bail!("query must not be empty");
        }
        let limit = usize_param(&params, "limit").unwrap_or(DEFAULT_SEARCH_LIMIT);
        let context_length =
            usize_param(&params, "context_length").unwrap_or(DEFAULT_CONTEXT_LENGTH);

        let hits = ctx.client().search(query, context_length).await?;
        let results: Vec<Value> = hits
            .iter()
            .take(limit)
            .map(|hit| {
                json!({
                    "filename": hit.filename,
                    "score": hit.score,
                    "context": hit.first_context(),
                })
            })
            .collect();

        Ok(json!({ "results": results }))
    }
}

/// `vault_read`: a note's content and metadata as JSON.
pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "vault_read"
    }

    fn description(&self) -> &str {
        "Read a note's content and metadata"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Note path relative to the vault root" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let path = non_empty(&params, "path")?;
        let note = ctx.client().read(path).await?;
        Ok(serde_json::to_value(&note)?)
    }
}

/// `vault_write`: create or overwrite a note.
pub struct WriteTool;

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "vault_write"
    }

    fn description(&self) -> &str {
        "Create or overwrite a note"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Note path relative to the vault root" },
                "content": { "type": "string", "description": "Markdown content" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let path = non_empty(&params, "path")?;
        let content = str_param(&params, "content");
        ctx.client().write(path, content).await?;
        Ok(json!({ "ok": true, "path": path }))
    }
}

/// `vault_append`: append to a note.
pub struct AppendTool;

#[async_trait]
impl Tool for AppendTool {
    fn name(&self) -> &str {
        "vault_append"
    }

    fn description(&self) -> &str {
        "Append content to a note"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Note path relative to the vault root" },
                "content": { "type": "string", "description": "Markdown content to append" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let path = non_empty(&params, "path")?;
        let content = str_param(&params, "content");
        ctx.client().append(path, content).await?;
        Ok(json!({ "ok": true, "path": path }))
    }
}

/// `vault_list`: entries of a folder, the vault root by default.
pub struct ListTool;

#[async_trait]
impl Tool for ListTool {
    fn name(&self) -> &str {
        "vault_list"
    }

    fn description(&self) -> &str {
        "List files in a vault folder"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "folder": { "type": "string", "description": "Folder to list; vault root when omitted", "default": "" }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let folder = str_param(&params, "folder");
        let files = ctx.client().list(folder).await?;
        Ok(json!({ "folder": folder, "files": files }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// A set of tools bound to one vault client.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    ctx: ToolContext,
}

impl ToolRegistry {
    /// Empty registry bound to `client`.
    pub fn new(client: Arc<VaultClient>) -> Self {
        Self {
            tools: Vec::new(),
            ctx: ToolContext::new(client),
        }
    }

    /// Registry pre-loaded with the five vault tools.
    pub fn with_builtins(client: Arc<VaultClient>) -> Self {
        let mut registry = Self::new(client);
        registry.register(Box::new(SearchTool));
        registry.register(Box::new(ReadTool));
        registry.register(Box::new(WriteTool));
        registry.register(Box::new(AppendTool));
        registry.register(Box::new(ListTool));
        registry
    }

    /// Add a tool. Names are not checked for duplicates; the first wins on lookup.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    /// Look up a tool by exact name.
    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Descriptors for every tool, in registration order.
    pub fn infos(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Call a tool by name. Every failure (unknown tool, bad parameters,
    /// vault errors) comes back as a failure envelope.
    pub async fn invoke(&self, name: &str, params: Value) -> ToolResult {
        let Some(tool) = self.find(name) else {
            return ToolResult::failure(format!("no tool registered with name: {}", name));
        };

        let params = match prepare_params(&tool.parameters_schema(), &params) {
            Ok(p) => p,
            Err(e) => return ToolResult::failure(format!("{}: {}", name, e)),
        };

        match tool.execute(params, &self.ctx).await {
            Ok(payload) => ToolResult::success(&payload),
            Err(e) => ToolResult::failure(format!("{}: {}", name, e)),
        }
    }
}

/// Check required fields and fill in schema defaults.
///
/// Arguments are loosely typed: values are not type-checked here, each
/// tool reads what it needs leniently. A non-object `params` is treated as
/// an empty object.
fn prepare_params(schema: &Value, params: &Value) -> Result<Value> {
    let mut result = params.as_object().cloned().unwrap_or_default();

    let required = schema
        .get("required")
        .and_then(|r| r.as_array())
        .cloned()
        .unwrap_or_default();
    for field in required.iter().filter_map(|v| v.as_str()) {
        if result.get(field).map_or(true, Value::is_null) {
            bail!("missing required parameter: {}", field);
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (name, prop) in properties {
            if result.get(name).map_or(true, Value::is_null) {
                if let Some(default) = prop.get("default") {
                    result.insert(name.clone(), default.clone());
                }
            }
        }
    }

    Ok(Value::Object(result))
}

fn str_param<'a>(params: &'a Value, key: &str) -> &'a str {
    params[key].as_str().unwrap_or("")
}

fn non_empty<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    let value = str_param(params, key);
    if value.trim().is_empty() {
        bail!("{} must not be empty", key);
    }
    Ok(value)
}

/// Accepts integers and numeric strings.
fn usize_param(params: &Value, key: &str) -> Option<usize> {
    match &params[key] {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
