//! HTTP client for the vault's REST server.
//!
//! A thin wrapper over `reqwest`: every call is a single request with no
//! retry, and nothing is cached between calls. The only state it carries is
//! the outcome of the last [`ping`](VaultClient::ping).
//!
//! # Endpoints
//!
//! | Method | Path | Used by |
//! |--------|------|---------|
//! | `GET`  | `/` | [`ping`](VaultClient::ping) |
//! | `GET`  | `/vault/<path>` | [`read`](VaultClient::read) |
//! | `PUT`  | `/vault/<path>` | [`write`](VaultClient::write) |
//! | `POST` | `/vault/<path>` | [`append`](VaultClient::append) |
//! | `GET`  | `/vault/` or `/vault/<folder>/` | [`list`](VaultClient::list) |
//! | `GET`  | `/search/simple/?query=&contextLength=` | [`search`](VaultClient::search) |

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::config::PluginConfig;
use crate::error::{VaultError, VaultResult};
use crate::models::{FileListing, Note, SearchResult};

const NOTE_JSON: &str = "application/vnd.olrapi.note+json";
const MARKDOWN: &str = "text/markdown";

/// Default snippet length for [`VaultClient::search`].
pub const DEFAULT_CONTEXT_LENGTH: usize = 200;

/// One client per plugin instance, shared behind an `Arc`.
pub struct VaultClient {
    http: reqwest::Client,
    base_url: String,
    auth_header: String,
    connected: AtomicBool,
}

impl VaultClient {
    /// Build a client for the server described by `config`.
    pub fn from_config(config: &PluginConfig) -> VaultResult<Self> {
        Self::new(config.base_url(), &config.api_key)
    }

    /// Client for `base_url` authenticating with `api_key` as a bearer token.
    pub fn new(base_url: impl Into<String>, api_key: &str) -> VaultResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(VaultError::Transport)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_header: format!("Bearer {}", api_key),
            connected: AtomicBool::new(false),
        })
    }

    /// Resolved server address, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Outcome of the most recent [`ping`](Self::ping). `false` before the first one.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Request the server root and record the outcome.
    ///
    /// Never fails: any transport error or non-2xx status is reported as
    /// `false`.
    pub async fn ping(&self) -> bool {
        let ok = match self.request(Method::GET, "/").send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %e, "vault ping failed");
                false
            }
        };
        self.connected.store(ok, Ordering::Relaxed);
        ok
    }

    /// Fetch a note with its metadata.
    pub async fn read(&self, path: &str) -> VaultResult<Note> {
        let resp = self
            .request(Method::GET, &note_route(path))
            .header(ACCEPT, NOTE_JSON)
            .send()
            .await
            .map_err(VaultError::Transport)?;
        check(resp)
            .await?
            .json::<Note>()
            .await
            .map_err(VaultError::Decode)
    }

    /// Replace the note at `path`, creating it if needed.
    pub async fn write(&self, path: &str, content: &str) -> VaultResult<()> {
        self.send_markdown(Method::PUT, path, content).await
    }

    /// Append to the note at `path`. The server decides how content is joined.
    pub async fn append(&self, path: &str, content: &str) -> VaultResult<()> {
        self.send_markdown(Method::POST, path, content).await
    }

    /// Full-text search. Results keep the server's order.
    pub async fn search(&self, query: &str, context_length: usize) -> VaultResult<Vec<SearchResult>> {
        let resp = self
            .request(Method::GET, "/search/simple/")
            .query(&[
                ("query", query.to_string()),
                ("contextLength", context_length.to_string()),
            ])
            .send()
            .await
            .map_err(VaultError::Transport)?;
        check(resp)
            .await?
            .json::<Vec<SearchResult>>()
            .await
            .map_err(VaultError::Decode)
    }

    /// List entries in `folder`; an empty folder lists the vault root.
    pub async fn list(&self, folder: &str) -> VaultResult<Vec<String>> {
        let folder = folder.trim_matches('/');
        let route = if folder.is_empty() {
            "/vault/".to_string()
        } else {
            format!("/vault/{}/", encode_component(folder))
        };
        let resp = self
            .request(Method::GET, &route)
            .send()
            .await
            .map_err(VaultError::Transport)?;
        let listing = check(resp)
            .await?
            .json::<FileListing>()
            .await
            .map_err(VaultError::Decode)?;
        Ok(listing.files)
    }

    async fn send_markdown(&self, method: Method, path: &str, content: &str) -> VaultResult<()> {
        let resp = self
            .request(method, &note_route(path))
            .header(CONTENT_TYPE, MARKDOWN)
            .body(content.to_string())
            .send()
            .await
            .map_err(VaultError::Transport)?;
        check(resp).await?;
        Ok(())
    }

    fn request(&self, method: Method, route: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, route);
        debug!(%method, %url, "vault request");
        self.http
            .request(method, url)
            .header(AUTHORIZATION, &self.auth_header)
    }
}

fn note_route(path: &str) -> String {
    format!("/vault/{}", encode_component(path))
}

/// Percent-encode `s` as a single opaque path segment, matching
/// JavaScript's `encodeURIComponent`. Separators inside `s` are escaped
/// rather than treated as sub-paths.
pub fn encode_component(s: &str) -> String {
    // urlencoding leaves only `A-Za-z0-9-_.~` bare; encodeURIComponent
    // also keeps these five.
    urlencoding::encode(s)
        .replace("%21", "!")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%2A", "*")
}

async fn check(resp: Response) -> VaultResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string));
    let reason = match detail {
        Some(message) => message,
        None => status.canonical_reason().unwrap_or("").to_string(),
    };

    Err(VaultError::RequestFailed {
        status: status.as_u16(),
        reason,
    })
}
