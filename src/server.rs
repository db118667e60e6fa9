//! HTTP surface for a plugin running inside a [`LocalHost`].
//!
//! Lets an out-of-process agent runtime call the vault tools and drive the
//! plugin's hooks over JSON.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Version and last known vault connectivity |
//! | `GET`  | `/tools/list` | Registered tools with parameter schemas |
//! | `POST` | `/tools/{name}` | Call a tool; body is the argument object |
//! | `POST` | `/context` | Context blocks for an inbound message |
//! | `POST` | `/events/semantic_search` | Vault results for a semantic search |
//! | `POST` | `/events/session_end` | Notify the plugin that a session ended |
//!
//! # Error Contract
//!
//! Tool failures are not HTTP errors: `POST /tools/{name}` answers `200`
//! with `isError: true` in the envelope. Only routing problems produce an
//! error body:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no tool registered with name: x" } }
//! ```

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::capability::{VaultCapability, CAPABILITY_NAME};
use crate::host::{
    AugmentedResult, ContextBlock, HostEvent, InboundMessage, LocalHost, SemanticSearchEvent,
    SessionEndEvent,
};
use crate::plugin::TOOL_NAMESPACE;
use crate::tools::{ToolInfo, ToolResult};

/// Build the router. Tools are looked up per request, so a plugin that has
/// shut down stops serving them immediately.
pub fn router(host: Arc<LocalHost>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/context", post(handle_context))
        .route("/events/semantic_search", post(handle_semantic_search))
        .route("/events/session_end", post(handle_session_end))
        .layer(cors)
        .with_state(host)
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    host: Arc<LocalHost>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "tool server listening");
    axum::serve(listener, router(host))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Bind `bind` and serve until Ctrl-C.
pub async fn run_server(bind: &str, host: Arc<LocalHost>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    serve(listener, host, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn unavailable() -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "plugin_stopped",
        message: "vault bridge is not running".to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    vault_connected: bool,
}

async fn handle_health(State(host): State<Arc<LocalHost>>) -> Json<HealthResponse> {
    let vault_connected = host
        .capability::<VaultCapability>(CAPABILITY_NAME)
        .is_some_and(|cap| cap.is_connected());
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        vault_connected,
    })
}

// ============ Tools ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(host): State<Arc<LocalHost>>) -> Json<ToolListResponse> {
    let tools = host
        .tools(TOOL_NAMESPACE)
        .map(|registry| registry.infos())
        .unwrap_or_default();
    Json(ToolListResponse { tools })
}

async fn handle_tool_call(
    State(host): State<Arc<LocalHost>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<ToolResult>, AppError> {
    let registry = host.tools(TOOL_NAMESPACE).ok_or_else(unavailable)?;
    if registry.find(&name).is_none() {
        return Err(not_found(format!("no tool registered with name: {}", name)));
    }
    // An empty body means "no arguments".
    let params = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| bad_request(format!("invalid JSON body: {}", e)))?
    };
    Ok(Json(registry.invoke(&name, params).await))
}

// ============ Hooks ============

#[derive(Serialize)]
struct ContextResponse {
    blocks: Vec<ContextBlock>,
}

async fn handle_context(
    State(host): State<Arc<LocalHost>>,
    Json(message): Json<InboundMessage>,
) -> Json<ContextResponse> {
    Json(ContextResponse {
        blocks: host.collect_context(&message).await,
    })
}

#[derive(Deserialize)]
struct SemanticSearchRequest {
    query: String,
}

#[derive(Serialize)]
struct SemanticSearchResponse {
    results: Vec<AugmentedResult>,
}

async fn handle_semantic_search(
    State(host): State<Arc<LocalHost>>,
    Json(req): Json<SemanticSearchRequest>,
) -> Json<SemanticSearchResponse> {
    let event = SemanticSearchEvent::new(req.query);
    let results = Arc::clone(&event.results);
    host.emit(&HostEvent::SemanticSearch(event)).await;
    let results = results.lock().await.clone();
    Json(SemanticSearchResponse { results })
}

async fn handle_session_end(
    State(host): State<Arc<LocalHost>>,
    Json(event): Json<SessionEndEvent>,
) -> StatusCode {
    host.emit(&HostEvent::SessionEnd(event)).await;
    StatusCode::NO_CONTENT
}
