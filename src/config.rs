//! Configuration for the vault bridge.
//!
//! Two layers live here:
//!
//! - [`PluginConfig`]: the settings the host runtime owns and hands to the
//!   plugin. The plugin re-reads it through [`PluginHost::config`](crate::host::PluginHost::config)
//!   on every use, so edits take effect without a restart.
//! - [`Config`]: the TOML file read by the `vault-bridge` binary, which
//!   seeds a [`LocalHost`](crate::host::LocalHost) with a `PluginConfig`
//!   and adds the tool server's bind address.
//!
//! Missing values fall back to the documented defaults instead of failing.
//! Host settings fall back one key at a time, so a single malformed value
//! never costs the others.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;
use tracing::warn;

/// Default port of the vault's REST server (plain HTTP listener).
pub const DEFAULT_PORT: u16 = 27123;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub vault: PluginConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// When the context provider is allowed to pull notes into a conversation.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum InjectContextMode {
    /// Search the vault for every inbound message.
    #[default]
    Always,
    /// Only when the agent calls a vault tool itself.
    OnDemand,
    /// Never inject. Unrecognized values land here too.
    #[serde(other)]
    Never,
}

/// Host-owned plugin settings.
///
/// Field names accept both `snake_case` (TOML files) and the `camelCase`
/// spelling used by host runtimes.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PluginConfig {
    #[serde(default, alias = "apiKey")]
    pub api_key: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_vault_folder", alias = "vaultFolder")]
    pub vault_folder: String,
    #[serde(default, alias = "injectContextMode")]
    pub inject_context_mode: InjectContextMode,
    #[serde(default = "default_max_context_notes", alias = "maxContextNotes")]
    pub max_context_notes: usize,
    /// Accepts `true`/`false` as booleans or strings; always stored as a `bool`.
    #[serde(
        default,
        alias = "archiveSessionsOnEnd",
        deserialize_with = "deserialize_flag"
    )]
    pub archive_sessions_on_end: bool,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            port: default_port(),
            vault_folder: default_vault_folder(),
            inject_context_mode: InjectContextMode::default(),
            max_context_notes: default_max_context_notes(),
            archive_sessions_on_end: false,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_vault_folder() -> String {
    "Agent".to_string()
}
fn default_max_context_notes() -> usize {
    3
}

impl PluginConfig {
    /// Parse a host-supplied JSON settings object.
    ///
    /// Each key is read on its own. A missing key takes its default; a
    /// malformed one is logged and takes its default while every valid key
    /// is kept. Numeric keys also accept numeric strings (`"5"`).
    pub fn from_value(value: &Value) -> Self {
        let mut config = Self::default();
        let Some(map) = value.as_object() else {
            if !value.is_null() {
                warn!("plugin settings are not an object; using defaults");
            }
            return config;
        };

        if let Some(key) = setting(map, &["api_key", "apiKey"], |v| v.as_str().map(str::to_string)) {
            config.api_key = key;
        }
        if let Some(port) = setting(map, &["port"], |v| {
            count(v)
                .and_then(|n| u16::try_from(n).ok())
                .filter(|p| *p > 0)
        }) {
            config.port = port;
        }
        if let Some(folder) = setting(map, &["vault_folder", "vaultFolder"], |v| {
            v.as_str().map(str::to_string)
        }) {
            config.vault_folder = folder;
        }
        if let Some(mode) = setting(map, &["inject_context_mode", "injectContextMode"], |v| {
            InjectContextMode::deserialize(v).ok()
        }) {
            config.inject_context_mode = mode;
        }
        if let Some(max) = setting(map, &["max_context_notes", "maxContextNotes"], |v| {
            count(v).and_then(|n| usize::try_from(n).ok())
        }) {
            config.max_context_notes = max;
        }
        if let Some(flag) = setting(map, &["archive_sessions_on_end", "archiveSessionsOnEnd"], |v| {
            Flag::deserialize(v).ok().map(Flag::into_bool)
        }) {
            config.archive_sessions_on_end = flag;
        }

        config
    }

    /// Loopback address of the vault's REST server.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

/// Look up the first present, non-null spelling of a key and parse it.
fn setting<'a, T>(
    map: &'a Map<String, Value>,
    names: &[&str],
    parse: impl FnOnce(&'a Value) -> Option<T>,
) -> Option<T> {
    let (name, raw) = names
        .iter()
        .find_map(|n| map.get_key_value(*n))
        .filter(|(_, v)| !v.is_null())?;
    let parsed = parse(raw);
    if parsed.is_none() {
        warn!(key = %name, value = %raw, "invalid plugin setting; using default");
    }
    parsed
}

fn count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    fn into_bool(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Text(s) => s.trim().eq_ignore_ascii_case("true"),
        }
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Flag::deserialize(deserializer).map(Flag::into_bool)
}

/// JSON schema describing [`PluginConfig`], registered with the host so it
/// can render and validate the settings form.
pub fn plugin_config_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "apiKey": {
                "type": "string",
                "description": "Bearer token for the vault REST API"
            },
            "port": {
                "type": "integer",
                "minimum": 1,
                "maximum": 65535,
                "default": DEFAULT_PORT
            },
            "vaultFolder": {
                "type": "string",
                "description": "Folder inside the vault that owns plugin-written notes",
                "default": "Agent"
            },
            "injectContextMode": {
                "type": "string",
                "enum": ["always", "on-demand", "never"],
                "default": "always"
            },
            "maxContextNotes": {
                "type": "integer",
                "minimum": 1,
                "default": 3
            },
            "archiveSessionsOnEnd": {
                "type": "boolean",
                "default": false
            }
        }
    })
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.vault.api_key.is_empty() {
        if let Ok(key) = std::env::var("VAULT_API_KEY") {
            config.vault.api_key = key;
        }
    }

    if config.vault.port == 0 {
        anyhow::bail!("vault.port must be > 0");
    }

    Ok(config)
}
