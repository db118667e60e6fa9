//! In-process stand-in for the vault REST server.
//!
//! Serves the same routes as the real server on an ephemeral loopback port,
//! keeps notes in memory, and records every request with its raw URI so
//! tests can check exactly what went over the wire.

#![allow(dead_code)]

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use vault_bridge::config::PluginConfig;

pub const API_KEY: &str = "test-key";

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    /// Path exactly as sent, still percent-encoded.
    pub raw_path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Default)]
struct Inner {
    notes: BTreeMap<String, String>,
    search_results: Vec<Value>,
    requests: Vec<Recorded>,
    unreadable: HashSet<String>,
    fail_search: bool,
    omit_files: bool,
    down: bool,
}

#[derive(Clone, Default)]
pub struct MockVault {
    inner: Arc<Mutex<Inner>>,
}

impl MockVault {
    pub fn add_note(&self, path: &str, content: &str) {
        self.inner
            .lock()
            .unwrap()
            .notes
            .insert(path.to_string(), content.to_string());
    }

    pub fn note(&self, path: &str) -> Option<String> {
        self.inner.lock().unwrap().notes.get(path).cloned()
    }

    pub fn note_paths(&self) -> Vec<String> {
        self.inner.lock().unwrap().notes.keys().cloned().collect()
    }

    /// Results returned by `/search/simple/`, in this order.
    pub fn set_search_results(&self, results: Vec<Value>) {
        self.inner.lock().unwrap().search_results = results;
    }

    pub fn make_unreadable(&self, path: &str) {
        self.inner.lock().unwrap().unreadable.insert(path.to_string());
    }

    pub fn fail_search(&self, fail: bool) {
        self.inner.lock().unwrap().fail_search = fail;
    }

    pub fn omit_files(&self, omit: bool) {
        self.inner.lock().unwrap().omit_files = omit;
    }

    /// Answer every request with 503.
    pub fn set_down(&self, down: bool) {
        self.inner.lock().unwrap().down = down;
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, method: Method, prefix: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.raw_path.starts_with(prefix))
            .collect()
    }

    pub fn clear_requests(&self) {
        self.inner.lock().unwrap().requests.clear();
    }
}

/// Search hit in the server's wire format.
pub fn hit(filename: &str, score: f64, context: Option<&str>) -> Value {
    let matches = match context {
        Some(c) => json!([{ "match": { "start": 0, "end": 4 }, "context": c }]),
        None => json!([]),
    };
    json!({ "filename": filename, "score": score, "matches": matches })
}

/// Start a mock vault and return it with its port.
pub async fn spawn_vault() -> (MockVault, u16) {
    let vault = MockVault::default();
    let app = Router::new()
        .fallback(handle)
        .with_state(vault.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (vault, port)
}

/// A port nothing is listening on.
pub fn dead_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn plugin_config(port: u16) -> PluginConfig {
    PluginConfig {
        api_key: API_KEY.to_string(),
        port,
        ..Default::default()
    }
}

async fn handle(State(vault): State<MockVault>, req: Request) -> Response {
    let method = req.method().clone();
    let raw_path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let authorized = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {}", API_KEY).as_str());
    let content_type = req
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = to_bytes(req.into_body(), usize::MAX).await.unwrap();
    let body = String::from_utf8_lossy(&body).to_string();

    let mut inner = vault.inner.lock().unwrap();
    inner.requests.push(Recorded {
        method: method.clone(),
        raw_path: raw_path.clone(),
        query: query.clone(),
        content_type,
        body: body.clone(),
    });

    if inner.down {
        return error(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable");
    }
    if !authorized {
        return error(StatusCode::UNAUTHORIZED, "Authorization required");
    }

    if raw_path == "/" {
        return Json(json!({ "status": "OK", "authenticated": true })).into_response();
    }

    if raw_path.starts_with("/search/simple") {
        if method != Method::GET {
            return error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        }
        if inner.fail_search {
            return error(StatusCode::INTERNAL_SERVER_ERROR, "search exploded");
        }
        return Json(Value::Array(inner.search_results.clone())).into_response();
    }

    let Some(rest) = raw_path.strip_prefix("/vault/") else {
        return error(StatusCode::NOT_FOUND, "Not Found");
    };

    if rest.is_empty() || rest.ends_with('/') {
        if inner.omit_files {
            return Json(json!({})).into_response();
        }
        let folder = decode(rest.trim_end_matches('/'));
        let prefix = if folder.is_empty() {
            String::new()
        } else {
            format!("{}/", folder)
        };
        let files: Vec<String> = inner
            .notes
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect();
        return Json(json!({ "files": files })).into_response();
    }

    let path = decode(rest);
    match method {
        Method::GET => {
            if inner.unreadable.contains(&path) {
                return error(StatusCode::INTERNAL_SERVER_ERROR, "read exploded");
            }
            match inner.notes.get(&path) {
                Some(content) => Json(json!({
                    "path": path,
                    "content": content,
                    "stat": { "ctime": 1700000000000_i64, "mtime": 1700000500000_i64, "size": content.len() },
                    "tags": [],
                    "frontmatter": {}
                }))
                .into_response(),
                None => error(StatusCode::NOT_FOUND, "File does not exist"),
            }
        }
        Method::PUT => {
            inner.notes.insert(path, body);
            StatusCode::NO_CONTENT.into_response()
        }
        Method::POST => {
            inner.notes.entry(path).or_default().push_str(&body);
            StatusCode::NO_CONTENT.into_response()
        }
        _ => error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
    }
}

fn decode(s: &str) -> String {
    urlencoding::decode(s).unwrap().into_owned()
}

fn error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "errorCode": u32::from(status.as_u16()) * 100, "message": message })),
    )
        .into_response()
}
