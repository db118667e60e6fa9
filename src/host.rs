//! Host runtime interfaces.
//!
//! The plugin never talks to a concrete agent runtime. It sees the host
//! through [`PluginHost`]: a config source, a log sink, a context-provider
//! registry, an event bus, a capability registry and a tool registry.
//!
//! [`LocalHost`] is an in-process implementation of all of these. The
//! `vault-bridge serve` command runs the plugin inside one, and the tests
//! use it to drive events and inspect registrations.
//!
//! # Events
//!
//! | Name | Payload |
//! |------|---------|
//! | [`SEMANTIC_SEARCH`] | [`SemanticSearchEvent`]: handlers push into a shared result list |
//! | [`SESSION_END`] | [`SessionEndEvent`]: full message history of a finished session |

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::config::PluginConfig;
use crate::models::Role;
use crate::tools::ToolRegistry;

pub const SEMANTIC_SEARCH: &str = "semantic_search";
pub const SESSION_END: &str = "session_end";

// ═══════════════════════════════════════════════════════════════════════
// Logging Sink
// ═══════════════════════════════════════════════════════════════════════

/// Log sink supplied by the host.
pub trait HostLogger: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
}

/// Forwards host log lines to `tracing`.
pub struct TracingLogger;

impl HostLogger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!(target: "vault_bridge::host", "{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "vault_bridge::host", "{}", message);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
}

/// Keeps every line in memory, for hosts that surface plugin logs in a UI.
#[derive(Default)]
pub struct MemoryLogger {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        lock(&self.lines).clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.at(LogLevel::Warn)
    }

    pub fn infos(&self) -> Vec<String> {
        self.at(LogLevel::Info)
    }

    fn at(&self, level: LogLevel) -> Vec<String> {
        lock(&self.lines)
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl HostLogger for MemoryLogger {
    fn info(&self, message: &str) {
        tracing::info!(target: "vault_bridge::host", "{}", message);
        lock(&self.lines).push((LogLevel::Info, message.to_string()));
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "vault_bridge::host", "{}", message);
        lock(&self.lines).push((LogLevel::Warn, message.to_string()));
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Context Providers
// ═══════════════════════════════════════════════════════════════════════

/// A message arriving from the user, before the agent processes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub session_id: Option<String>,
    pub content: String,
}

impl InboundMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            session_id: None,
            content: content.into(),
        }
    }
}

/// Supplementary text to prepend to the agent's context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBlock {
    pub role: Role,
    pub content: String,
}

/// Called by the host once per inbound message.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn provide(&self, message: &InboundMessage) -> Option<ContextBlock>;
}

// ═══════════════════════════════════════════════════════════════════════
// Events
// ═══════════════════════════════════════════════════════════════════════

/// A search result contributed by a source other than the host's own index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentedResult {
    /// Provenance label, e.g. `"vault"`.
    pub source: String,
    pub path: String,
    pub snippet: String,
    pub score: f64,
}

/// Fired when the host runs its own semantic search. Subscribers append to
/// `results`; the host merges them after all handlers finish.
#[derive(Debug, Clone)]
pub struct SemanticSearchEvent {
    pub query: String,
    pub results: Arc<tokio::sync::Mutex<Vec<AugmentedResult>>>,
}

impl SemanticSearchEvent {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            results: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEndEvent {
    pub session_id: String,
    #[serde(default = "Utc::now")]
    pub ended_at: DateTime<Utc>,
    pub messages: Vec<SessionMessage>,
}

#[derive(Debug, Clone)]
pub enum HostEvent {
    SemanticSearch(SemanticSearchEvent),
    SessionEnd(SessionEndEvent),
}

impl HostEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HostEvent::SemanticSearch(_) => SEMANTIC_SEARCH,
            HostEvent::SessionEnd(_) => SESSION_END,
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &HostEvent);
}

type CancelFn = Box<dyn FnOnce() -> Result<()> + Send + Sync>;

/// An owned unsubscribe handle. Cancelling consumes it, so it runs at most once.
pub struct Subscription {
    label: String,
    cancel: CancelFn,
}

impl Subscription {
    pub fn new(label: impl Into<String>, cancel: impl FnOnce() -> Result<()> + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            cancel: Box::new(cancel),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn cancel(self) -> Result<()> {
        (self.cancel)()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Host Trait
// ═══════════════════════════════════════════════════════════════════════

/// Everything the plugin needs from its host runtime.
pub trait PluginHost: Send + Sync {
    /// Current settings. Read on every use; never cached by the plugin.
    fn config(&self) -> PluginConfig;

    fn logger(&self) -> &dyn HostLogger;

    fn register_config_schema(&self, plugin_id: &str, schema: Value) -> Result<()>;
    fn unregister_config_schema(&self, plugin_id: &str) -> Result<()>;

    fn register_context_provider(&self, plugin_id: &str, provider: Arc<dyn ContextProvider>) -> Result<()>;
    fn unregister_context_provider(&self, plugin_id: &str) -> Result<()>;

    fn subscribe(&self, event: &str, handler: Arc<dyn EventHandler>) -> Result<Subscription>;

    fn register_capability(&self, name: &str, capability: Arc<dyn Any + Send + Sync>) -> Result<()>;
    fn unregister_capability(&self, name: &str) -> Result<()>;

    fn register_tools(&self, namespace: &str, tools: Arc<ToolRegistry>) -> Result<()>;
    fn unregister_tools(&self, namespace: &str) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════
// LocalHost
// ═══════════════════════════════════════════════════════════════════════

type HandlerMap = HashMap<String, Vec<(u64, Arc<dyn EventHandler>)>>;

/// In-process [`PluginHost`].
pub struct LocalHost {
    config: RwLock<PluginConfig>,
    logger: Arc<dyn HostLogger>,
    schemas: Mutex<HashMap<String, Value>>,
    providers: Mutex<Vec<(String, Arc<dyn ContextProvider>)>>,
    handlers: Arc<Mutex<HandlerMap>>,
    next_handler_id: AtomicU64,
    capabilities: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    tools: Mutex<HashMap<String, Arc<ToolRegistry>>>,
}

impl LocalHost {
    pub fn new(config: PluginConfig) -> Self {
        Self::with_logger(config, Arc::new(TracingLogger))
    }

    pub fn with_logger(config: PluginConfig, logger: Arc<dyn HostLogger>) -> Self {
        Self {
            config: RwLock::new(config),
            logger,
            schemas: Mutex::new(HashMap::new()),
            providers: Mutex::new(Vec::new()),
            handlers: Arc::new(Mutex::new(HashMap::new())),
            next_handler_id: AtomicU64::new(1),
            capabilities: Mutex::new(HashMap::new()),
            tools: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the settings; subscribers see the change on their next read.
    pub fn set_config(&self, config: PluginConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Apply an in-place edit to the settings.
    pub fn update_config(&self, edit: impl FnOnce(&mut PluginConfig)) {
        edit(&mut self.config.write().unwrap_or_else(PoisonError::into_inner));
    }

    /// Ask every registered provider for context, in registration order.
    pub async fn collect_context(&self, message: &InboundMessage) -> Vec<ContextBlock> {
        let providers: Vec<Arc<dyn ContextProvider>> =
            lock(&self.providers).iter().map(|(_, p)| p.clone()).collect();

        let mut blocks = Vec::new();
        for provider in providers {
            if let Some(block) = provider.provide(message).await {
                blocks.push(block);
            }
        }
        blocks
    }

    /// Deliver `event` to its subscribers one after another.
    pub async fn emit(&self, event: &HostEvent) {
        let handlers: Vec<Arc<dyn EventHandler>> = lock(&self.handlers)
            .get(event.name())
            .map(|hs| hs.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        for handler in handlers {
            handler.handle(event).await;
        }
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        lock(&self.handlers).get(event).map_or(0, Vec::len)
    }

    pub fn context_provider_count(&self) -> usize {
        lock(&self.providers).len()
    }

    pub fn config_schema(&self, plugin_id: &str) -> Option<Value> {
        lock(&self.schemas).get(plugin_id).cloned()
    }

    /// Look up a capability and downcast it to its concrete type.
    pub fn capability<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let cap = lock(&self.capabilities).get(name).cloned()?;
        cap.downcast::<T>().ok()
    }

    pub fn tools(&self, namespace: &str) -> Option<Arc<ToolRegistry>> {
        lock(&self.tools).get(namespace).cloned()
    }
}

impl PluginHost for LocalHost {
    fn config(&self) -> PluginConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn logger(&self) -> &dyn HostLogger {
        self.logger.as_ref()
    }

    fn register_config_schema(&self, plugin_id: &str, schema: Value) -> Result<()> {
        lock(&self.schemas).insert(plugin_id.to_string(), schema);
        Ok(())
    }

    fn unregister_config_schema(&self, plugin_id: &str) -> Result<()> {
        lock(&self.schemas).remove(plugin_id);
        Ok(())
    }

    fn register_context_provider(&self, plugin_id: &str, provider: Arc<dyn ContextProvider>) -> Result<()> {
        let mut providers = lock(&self.providers);
        if providers.iter().any(|(id, _)| id == plugin_id) {
            bail!("context provider already registered for {}", plugin_id);
        }
        providers.push((plugin_id.to_string(), provider));
        Ok(())
    }

    fn unregister_context_provider(&self, plugin_id: &str) -> Result<()> {
        lock(&self.providers).retain(|(id, _)| id != plugin_id);
        Ok(())
    }

    fn subscribe(&self, event: &str, handler: Arc<dyn EventHandler>) -> Result<Subscription> {
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.handlers)
            .entry(event.to_string())
            .or_default()
            .push((id, handler));

        let handlers = Arc::clone(&self.handlers);
        let name = event.to_string();
        Ok(Subscription::new(event, move || {
            if let Some(list) = lock(&handlers).get_mut(&name) {
                list.retain(|(h, _)| *h != id);
            }
            Ok(())
        }))
    }

    fn register_capability(&self, name: &str, capability: Arc<dyn Any + Send + Sync>) -> Result<()> {
        lock(&self.capabilities).insert(name.to_string(), capability);
        Ok(())
    }

    fn unregister_capability(&self, name: &str) -> Result<()> {
        lock(&self.capabilities).remove(name);
        Ok(())
    }

    fn register_tools(&self, namespace: &str, tools: Arc<ToolRegistry>) -> Result<()> {
        lock(&self.tools).insert(namespace.to_string(), tools);
        Ok(())
    }

    fn unregister_tools(&self, namespace: &str) -> Result<()> {
        lock(&self.tools).remove(namespace);
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
