//! HTTP tool server over a running plugin.

mod common;

use common::{hit, plugin_config, spawn_vault, MockVault};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use vault_bridge::host::LocalHost;
use vault_bridge::plugin::VaultPlugin;
use vault_bridge::server;

struct Running {
    vault: MockVault,
    base: String,
    plugin: VaultPlugin,
    _stop: oneshot::Sender<()>,
}

async fn running(edit: impl FnOnce(&mut vault_bridge::config::PluginConfig)) -> Running {
    let (vault, port) = spawn_vault().await;
    let mut config = plugin_config(port);
    edit(&mut config);

    let host = Arc::new(LocalHost::new(config));
    let mut plugin = VaultPlugin::new(host.clone());
    plugin.start().unwrap();
    plugin.client().unwrap().ping().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(server::serve(listener, host, async move {
        let _ = stopped.await;
    }));

    Running {
        vault,
        base,
        plugin,
        _stop: stop,
    }
}

#[tokio::test]
async fn health_reports_connectivity() {
    let r = running(|_| {}).await;
    let body: Value = reqwest::get(format!("{}/health", r.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["vault_connected"], true);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn tools_list_has_schemas() {
    let r = running(|_| {}).await;
    let body: Value = reqwest::get(format!("{}/tools/list", r.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let tools = body["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 5);
    let search = tools.iter().find(|t| t["name"] == "vault_search").unwrap();
    assert_eq!(search["parameters"]["required"], json!(["query"]));
}

#[tokio::test]
async fn tool_call_returns_envelope() {
    let r = running(|_| {}).await;
    r.vault.set_search_results(vec![hit("a.md", 1.0, Some("alpha"))]);

    let resp = reqwest::Client::new()
        .post(format!("{}/tools/vault_search", r.base))
        .json(&json!({ "query": "alpha" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["isError"], false);
    assert_eq!(body["content"][0]["type"], "text");
    let payload: Value = serde_json::from_str(body["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(payload["results"][0]["filename"], "a.md");
}

#[tokio::test]
async fn tool_failure_is_still_http_ok() {
    let r = running(|_| {}).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/tools/vault_read", r.base))
        .json(&json!({ "path": "missing.md" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["isError"], true);
    assert!(body["content"][0]["text"]
        .as_str()
        .unwrap()
        .starts_with("Error: "));
}

#[tokio::test]
async fn tool_call_without_body_uses_defaults() {
    let r = running(|_| {}).await;
    r.vault.add_note("root.md", "");
    let resp = reqwest::Client::new()
        .post(format!("{}/tools/vault_list", r.base))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["isError"], false);
}

#[tokio::test]
async fn unknown_tool_is_404() {
    let r = running(|_| {}).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/tools/vault_delete", r.base))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn malformed_body_is_400() {
    let r = running(|_| {}).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/tools/vault_read", r.base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn tools_unavailable_after_shutdown() {
    let mut r = running(|_| {}).await;
    r.plugin.shutdown();

    let resp = reqwest::Client::new()
        .post(format!("{}/tools/vault_list", r.base))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);

    let body: Value = reqwest::get(format!("{}/tools/list", r.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["tools"], json!([]));
}

#[tokio::test]
async fn context_endpoint_returns_blocks() {
    let r = running(|_| {}).await;
    r.vault.add_note("plan.md", "Ship Friday.");
    r.vault.set_search_results(vec![hit("plan.md", 1.0, None)]);

    let body: Value = reqwest::Client::new()
        .post(format!("{}/context", r.base))
        .json(&json!({ "content": "what is the plan" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let blocks = body["blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0]["role"], "system");
    assert!(blocks[0]["content"]
        .as_str()
        .unwrap()
        .contains("### plan.md\n\nShip Friday."));
}

#[tokio::test]
async fn semantic_search_endpoint_returns_vault_results() {
    let r = running(|_| {}).await;
    r.vault.set_search_results(vec![hit("a.md", 2.0, Some("alpha"))]);

    let body: Value = reqwest::Client::new()
        .post(format!("{}/events/semantic_search", r.base))
        .json(&json!({ "query": "alpha" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["results"][0]["source"], "vault");
    assert_eq!(body["results"][0]["path"], "a.md");
}

#[tokio::test]
async fn session_end_endpoint_archives() {
    let r = running(|c| c.archive_sessions_on_end = true).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/events/session_end", r.base))
        .json(&json!({
            "session_id": "web-1",
            "ended_at": "2024-03-09T10:00:00Z",
            "messages": [
                { "role": "user", "content": "hi" },
                { "role": "assistant", "content": "hello" }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let note = r.vault.note("Agent/sessions/2024-03-09-web-1.md").unwrap();
    assert!(note.contains("**user**: hi"));
}
