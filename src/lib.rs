//! # Vault Bridge
//!
//! Bridges a conversational agent runtime to a local note vault exposed
//! over a REST API.
//!
//! The plugin owns one HTTP client for the vault and hooks it into its host
//! in four ways: per-message context injection, augmentation of the host's
//! semantic search, archival of finished sessions, and a set of tools the
//! agent can call directly.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────┐        ┌──────────────────┐
//! │        Host runtime        │        │   Vault server   │
//! │  config · log · event bus  │        │  (REST, :27123)  │
//! └─────────────┬──────────────┘        └────────▲─────────┘
//!               │ PluginHost                     │ HTTP + bearer
//!               ▼                                │
//!        ┌─────────────┐   Arc<VaultClient>  ┌───┴──────────┐
//!        │ VaultPlugin │────────────────────▶│ VaultClient  │
//!        └──────┬──────┘                     └──────────────┘
//!               │ registers
//!   ┌───────────┼─────────────┬───────────────┬─────────────┐
//!   ▼           ▼             ▼               ▼             ▼
//! context   semantic      session_end     capability      tools
//! provider  search hook   archiver        export          (vault_*)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! vault-bridge ping
//! vault-bridge search "meeting notes" --limit 3
//! vault-bridge read "Projects/plan.md"
//! vault-bridge serve            # run the plugin behind an HTTP tool server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Plugin settings, TOML config file, settings schema |
//! | [`models`] | Notes, search results, message roles |
//! | [`error`] | `VaultError` |
//! | [`client`] | `VaultClient`: HTTP wrapper over the vault REST API |
//! | [`tools`] | `Tool` trait, the five vault tools, `ToolRegistry` |
//! | [`capability`] | `VaultCapability` exported to other plugins |
//! | [`host`] | Host runtime traits and the in-process `LocalHost` |
//! | [`plugin`] | `VaultPlugin` lifecycle and hooks |
//! | [`server`] | HTTP surface for a plugin inside a `LocalHost` |

pub mod capability;
pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod models;
pub mod plugin;
pub mod server;
pub mod tools;
