//! Plugin lifecycle and the hooks it installs into the host.
//!
//! [`VaultPlugin`] owns the single [`VaultClient`] and wires it into the
//! host runtime:
//!
//! ```text
//!                    ┌──────────────────────────┐
//!   config ────────▶ │       VaultPlugin        │
//!                    │  Arc<VaultClient> (one)  │
//!                    └────────────┬─────────────┘
//!        ┌──────────────┬─────────┼───────────┬───────────────┐
//!        ▼              ▼         ▼           ▼               ▼
//!   poller (30s)   context     semantic    session_end    capability +
//!   + startup      provider    _search     archiver       tools
//!     ping                     augmenter
//! ```
//!
//! Lifecycle is `Uninitialized → Running → ShutDown`. `ShutDown` is
//! terminal and [`VaultPlugin::shutdown`] may be called any number of times.
//!
//! Every hook reads the host config fresh and checks the client's
//! connectivity flag before doing any work. Hooks never return errors to
//! the host: each failure site below says what it degrades to.

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::future::join_all;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::capability::{VaultCapability, CAPABILITY_NAME};
use crate::client::{VaultClient, DEFAULT_CONTEXT_LENGTH};
use crate::config::{plugin_config_schema, InjectContextMode};
use crate::host::{
    AugmentedResult, ContextBlock, ContextProvider, EventHandler, HostEvent, InboundMessage,
    PluginHost, SessionEndEvent, Subscription, SEMANTIC_SEARCH, SESSION_END,
};
use crate::models::Role;
use crate::tools::ToolRegistry;

pub const PLUGIN_ID: &str = "vault-bridge";
pub const TOOL_NAMESPACE: &str = "vault";
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Provenance label on results contributed to the host's semantic search.
pub const PROVENANCE: &str = "vault";

const DEFAULT_MAX_CONTEXT_NOTES: usize = 3;
const MAX_NOTE_CHARS: usize = 2000;
const AUGMENT_CONTEXT_LENGTH: usize = 150;
const AUGMENT_LIMIT: usize = 3;

const CONTEXT_HEADER: &str = "Relevant notes from the vault:";
const SECTION_SEPARATOR: &str = "\n\n---\n\n";
const UNREADABLE_NOTE: &str = "_[note could not be read]_";

/// Where a [`VaultPlugin`] is in its one-way lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Running,
    ShutDown,
}

/// The plugin instance. Owns the client, the poller and every host
/// registration; dropping it shuts it down.
pub struct VaultPlugin {
    host: Arc<dyn PluginHost>,
    state: LifecycleState,
    client: Option<Arc<VaultClient>>,
    poller: Option<JoinHandle<()>>,
    cleanups: Vec<Subscription>,
    poll_interval: Duration,
}

impl VaultPlugin {
    /// A plugin bound to `host`. Nothing is registered until [`start`](Self::start).
    pub fn new(host: Arc<dyn PluginHost>) -> Self {
        Self {
            host,
            state: LifecycleState::Uninitialized,
            client: None,
            poller: None,
            cleanups: Vec::new(),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Override the connectivity poll period (30s by default).
    pub fn with_poll_interval(mut self, period: Duration) -> Self {
        self.poll_interval = period;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The plugin's client while running.
    pub fn client(&self) -> Option<Arc<VaultClient>> {
        self.client.clone()
    }

    /// Install every hook. Must be called from within a tokio runtime.
    ///
    /// If any registration fails, whatever was already installed is torn
    /// down again and the plugin ends up shut down.
    pub fn start(&mut self) -> Result<()> {
        if self.state != LifecycleState::Uninitialized {
            bail!("vault bridge cannot start from state {:?}", self.state);
        }
        self.state = LifecycleState::Running;

        if let Err(e) = self.activate() {
            self.host
                .logger()
                .warn(&format!("vault bridge failed to start: {:#}", e));
            self.shutdown();
            return Err(e);
        }
        Ok(())
    }

    fn activate(&mut self) -> Result<()> {
        let host = Arc::clone(&self.host);
        let config = host.config();

        host.register_config_schema(PLUGIN_ID, plugin_config_schema())?;

        let client = Arc::new(VaultClient::from_config(&config)?);
        self.client = Some(Arc::clone(&client));

        self.poller = Some(spawn_poller(
            Arc::clone(&client),
            Arc::clone(&host),
            self.poll_interval,
        ));

        host.register_context_provider(
            PLUGIN_ID,
            Arc::new(VaultContextProvider::new(Arc::clone(&client), Arc::clone(&host))),
        )?;

        self.cleanups.push(host.subscribe(
            SEMANTIC_SEARCH,
            Arc::new(SearchAugmenter {
                client: Arc::clone(&client),
            }),
        )?);
        self.cleanups.push(host.subscribe(
            SESSION_END,
            Arc::new(SessionArchiver {
                client: Arc::clone(&client),
                host: Arc::clone(&host),
            }),
        )?);

        host.register_capability(
            CAPABILITY_NAME,
            Arc::new(VaultCapability::new(Arc::clone(&client))),
        )?;
        host.register_tools(
            TOOL_NAMESPACE,
            Arc::new(ToolRegistry::with_builtins(Arc::clone(&client))),
        )?;

        host.logger().info(&format!(
            "vault bridge started (vault at {})",
            client.base_url()
        ));
        Ok(())
    }

    /// Tear everything down. Only the first call from `Running` has any
    /// effect; later calls return immediately.
    pub fn shutdown(&mut self) {
        match self.state {
            LifecycleState::ShutDown => return,
            LifecycleState::Uninitialized => {
                self.state = LifecycleState::ShutDown;
                return;
            }
            LifecycleState::Running => {}
        }

        if let Some(poller) = self.poller.take() {
            poller.abort();
        }

        let logger = self.host.logger();
        for sub in self.cleanups.drain(..) {
            let label = sub.label().to_string();
            match catch_unwind(AssertUnwindSafe(|| sub.cancel())) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => logger.warn(&format!("failed to unsubscribe {}: {:#}", label, e)),
                Err(_) => logger.warn(&format!("unsubscribe {} panicked", label)),
            }
        }

        let steps: [(&str, Result<()>); 4] = [
            ("config schema", self.host.unregister_config_schema(PLUGIN_ID)),
            ("context provider", self.host.unregister_context_provider(PLUGIN_ID)),
            ("capability", self.host.unregister_capability(CAPABILITY_NAME)),
            ("tools", self.host.unregister_tools(TOOL_NAMESPACE)),
        ];
        for (what, outcome) in steps {
            if let Err(e) = outcome {
                logger.warn(&format!("failed to unregister {}: {:#}", what, e));
            }
        }

        self.client = None;
        self.state = LifecycleState::ShutDown;
        logger.info("vault bridge stopped");
    }
}

impl Drop for VaultPlugin {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Connectivity
// ═══════════════════════════════════════════════════════════════════════

/// Ping once right away so the log says whether the vault is up, then
/// every `period`, logging only when connectivity flips.
fn spawn_poller(
    client: Arc<VaultClient>,
    host: Arc<dyn PluginHost>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut was_connected = client.ping().await;
        if was_connected {
            host.logger()
                .info(&format!("connected to vault at {}", client.base_url()));
        } else {
            host.logger().warn(&format!(
                "vault not reachable at {}; will keep polling",
                client.base_url()
            ));
        }

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let connected = client.ping().await;
            if connected == was_connected {
                continue;
            }
            if connected {
                host.logger()
                    .info(&format!("vault reachable again at {}", client.base_url()));
            } else {
                host.logger()
                    .warn(&format!("lost connection to vault at {}", client.base_url()));
            }
            was_connected = connected;
        }
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Context Injection
// ═══════════════════════════════════════════════════════════════════════

/// Pulls the notes most relevant to an inbound message into a system block.
pub struct VaultContextProvider {
    client: Arc<VaultClient>,
    host: Arc<dyn PluginHost>,
}

impl VaultContextProvider {
    pub fn new(client: Arc<VaultClient>, host: Arc<dyn PluginHost>) -> Self {
        Self { client, host }
    }
}

#[async_trait]
impl ContextProvider for VaultContextProvider {
    async fn provide(&self, message: &InboundMessage) -> Option<ContextBlock> {
        let config = self.host.config();
        if config.inject_context_mode != InjectContextMode::Always {
            return None;
        }
        if !self.client.is_connected() {
            return None;
        }
        let query = message.content.trim();
        if query.is_empty() {
            return None;
        }

        // A failed search means no context for this message, never an error.
        let hits = match self.client.search(query, DEFAULT_CONTEXT_LENGTH).await {
            Ok(hits) => hits,
            Err(e) => {
                self.host
                    .logger()
                    .warn(&format!("vault context search failed: {}", e));
                return None;
            }
        };

        let max_notes = match config.max_context_notes {
            0 => DEFAULT_MAX_CONTEXT_NOTES,
            n => n,
        };
        let top: Vec<_> = hits.into_iter().take(max_notes).collect();
        if top.is_empty() {
            return None;
        }

        let notes = join_all(top.iter().map(|hit| self.client.read(&hit.filename))).await;

        // An unreadable note becomes a placeholder; the rest still go through.
        let sections: Vec<String> = top
            .iter()
            .zip(notes)
            .map(|(hit, note)| match note {
                Ok(note) => note_section(&hit.filename, &note.content),
                Err(e) => {
                    debug!(path = %hit.filename, error = %e, "context note unreadable");
                    note_section(&hit.filename, UNREADABLE_NOTE)
                }
            })
            .collect();

        Some(ContextBlock {
            role: Role::System,
            content: format!("{}\n\n{}", CONTEXT_HEADER, sections.join(SECTION_SEPARATOR)),
        })
    }
}

fn note_section(path: &str, content: &str) -> String {
    format!("### {}\n\n{}", path, truncate_chars(content, MAX_NOTE_CHARS))
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Event Hooks
// ═══════════════════════════════════════════════════════════════════════

/// Adds vault hits to the host's own semantic search.
struct SearchAugmenter {
    client: Arc<VaultClient>,
}

#[async_trait]
impl EventHandler for SearchAugmenter {
    async fn handle(&self, event: &HostEvent) {
        let HostEvent::SemanticSearch(search) = event else {
            return;
        };
        if !self.client.is_connected() || search.query.trim().is_empty() {
            return;
        }

        // Absorbed entirely: the host's primary search must not see vault failures.
        let hits = match self.client.search(&search.query, AUGMENT_CONTEXT_LENGTH).await {
            Ok(hits) => hits,
            Err(e) => {
                debug!(error = %e, "vault search augmentation skipped");
                return;
            }
        };

        let mut results = search.results.lock().await;
        results.extend(hits.into_iter().take(AUGMENT_LIMIT).map(|hit| {
            let snippet = hit.first_context().to_string();
            AugmentedResult {
                source: PROVENANCE.to_string(),
                path: hit.filename,
                snippet,
                score: hit.score,
            }
        }));
    }
}

/// Writes a finished session's transcript into the vault.
struct SessionArchiver {
    client: Arc<VaultClient>,
    host: Arc<dyn PluginHost>,
}

#[async_trait]
impl EventHandler for SessionArchiver {
    async fn handle(&self, event: &HostEvent) {
        let HostEvent::SessionEnd(session) = event else {
            return;
        };
        let config = self.host.config();
        if !config.archive_sessions_on_end || !self.client.is_connected() {
            return;
        }

        let path = archive_path(&config.vault_folder, session);
        // Session teardown goes ahead whether or not the archive lands.
        match self.client.write(&path, &render_session(session)).await {
            Ok(()) => self
                .host
                .logger()
                .info(&format!("archived session {} to {}", session.session_id, path)),
            Err(e) => self.host.logger().warn(&format!(
                "failed to archive session {}: {}",
                session.session_id, e
            )),
        }
    }
}

/// `<vaultFolder>/sessions/<YYYY-MM-DD>-<sessionId>.md`
pub fn archive_path(vault_folder: &str, session: &SessionEndEvent) -> String {
    let file = format!(
        "{}-{}.md",
        session.ended_at.format("%Y-%m-%d"),
        session.session_id
    );
    let folder = vault_folder.trim_matches('/');
    if folder.is_empty() {
        format!("sessions/{}", file)
    } else {
        format!("{}/sessions/{}", folder, file)
    }
}

/// Markdown transcript: a header with id and timestamp, then one
/// role-prefixed paragraph per message.
pub fn render_session(session: &SessionEndEvent) -> String {
    let mut doc = format!(
        "# Session {}\n\n- Session ID: `{}`\n- Ended: {}\n- Messages: {}\n\n---\n",
        session.session_id,
        session.session_id,
        session.ended_at.to_rfc3339(),
        session.messages.len()
    );
    for message in &session.messages {
        doc.push_str(&format!("\n**{}**: {}\n", message.role, message.content));
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SessionMessage;
    use chrono::{TimeZone, Utc};

    fn session() -> SessionEndEvent {
        SessionEndEvent {
            session_id: "abc123".to_string(),
            ended_at: Utc.with_ymd_and_hms(2024, 3, 9, 17, 45, 0).unwrap(),
            messages: vec![
                SessionMessage {
                    role: Role::User,
                    content: "what did we decide?".to_string(),
                },
                SessionMessage {
                    role: Role::Assistant,
                    content: "Ship on Friday.".to_string(),
                },
            ],
        }
    }

    #[test]
    fn archive_path_is_dated_and_scoped() {
        assert_eq!(
            archive_path("Agent", &session()),
            "Agent/sessions/2024-03-09-abc123.md"
        );
        assert_eq!(
            archive_path("Agent/", &session()),
            "Agent/sessions/2024-03-09-abc123.md"
        );
        assert_eq!(archive_path("", &session()), "sessions/2024-03-09-abc123.md");
    }

    #[test]
    fn transcript_has_role_prefixed_lines() {
        let doc = render_session(&session());
        assert!(doc.starts_with("# Session abc123"));
        assert!(doc.contains("2024-03-09T17:45:00+00:00"));
        assert!(doc.contains("**user**: what did we decide?"));
        assert!(doc.contains("**assistant**: Ship on Friday."));
        let user_at = doc.find("**user**").unwrap();
        let assistant_at = doc.find("**assistant**").unwrap();
        assert!(user_at < assistant_at);
    }

    #[test]
    fn truncation_counts_characters() {
        let s = "é".repeat(2500);
        let cut = truncate_chars(&s, MAX_NOTE_CHARS);
        assert_eq!(cut.chars().count(), MAX_NOTE_CHARS);
        assert_eq!(truncate_chars("short", MAX_NOTE_CHARS), "short");
    }

    #[test]
    fn section_is_headed_by_path() {
        let section = note_section("Projects/plan.md", "body");
        assert_eq!(section, "### Projects/plan.md\n\nbody");
    }
}
