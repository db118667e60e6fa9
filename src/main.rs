//! # Vault Bridge CLI (`vault-bridge`)
//!
//! Talks to the vault's REST server directly, or runs the plugin inside an
//! in-process host behind an HTTP tool server.
//!
//! ## Usage
//!
//! ```bash
//! vault-bridge --config ./config/vault-bridge.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vault-bridge ping` | Check that the vault server answers |
//! | `vault-bridge read <path>` | Print a note |
//! | `vault-bridge write <path> [content]` | Overwrite a note (`--stdin` to pipe content) |
//! | `vault-bridge append <path> [content]` | Append to a note |
//! | `vault-bridge search "<query>"` | Full-text search |
//! | `vault-bridge list [folder]` | List a folder (vault root by default) |
//! | `vault-bridge tools` | Show the agent tools and their schemas |
//! | `vault-bridge serve` | Run the plugin and the HTTP tool server |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use vault_bridge::client::{VaultClient, DEFAULT_CONTEXT_LENGTH};
use vault_bridge::config::{self, Config};
use vault_bridge::host::LocalHost;
use vault_bridge::plugin::VaultPlugin;
use vault_bridge::server;
use vault_bridge::tools::{ToolRegistry, DEFAULT_SEARCH_LIMIT};

/// Vault Bridge: connect an agent runtime to a local note vault.
#[derive(Parser)]
#[command(name = "vault-bridge", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "./config/vault-bridge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Vault(VaultCommand),

    /// Run the plugin in an in-process host and serve it over HTTP.
    ///
    /// Binds to `[server].bind`. Ctrl-C stops the server and shuts the
    /// plugin down.
    Serve,
}

/// Commands that talk to the vault server through a single client.
#[derive(Subcommand)]
enum VaultCommand {
    /// Check that the vault server is reachable.
    Ping,

    /// Print a note's metadata and content.
    Read {
        /// Note path relative to the vault root.
        path: String,
    },

    /// Create or overwrite a note.
    Write {
        path: String,
        /// Note content. Omit and pass `--stdin` to read it from standard input.
        content: Option<String>,
        #[arg(long)]
        stdin: bool,
    },

    /// Append to a note.
    Append {
        path: String,
        content: Option<String>,
        #[arg(long)]
        stdin: bool,
    },

    /// Full-text search across the vault.
    Search {
        query: String,

        /// Maximum number of results to print.
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,

        /// Characters of context around each match.
        #[arg(long, default_value_t = DEFAULT_CONTEXT_LENGTH)]
        context_length: usize,
    },

    /// List files in a folder (the vault root when omitted).
    List { folder: Option<String> },

    /// Show the tools the plugin exposes to agents.
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => run_serve(cfg).await?,
        Commands::Vault(command) => {
            let client = Arc::new(VaultClient::from_config(&cfg.vault)?);
            run_command(command, client).await?;
        }
    }

    Ok(())
}

async fn run_command(command: VaultCommand, client: Arc<VaultClient>) -> anyhow::Result<()> {
    match command {
        VaultCommand::Ping => {
            if client.ping().await {
                println!("vault reachable at {}", client.base_url());
            } else {
                anyhow::bail!("vault not reachable at {}", client.base_url());
            }
        }
        VaultCommand::Read { path } => {
            let note = client.read(&path).await?;
            println!("--- {} ---", note.path);
            println!("size:     {} bytes", note.stat.size_bytes);
            println!("created:  {}", format_ts_ms(note.stat.created_at));
            println!("modified: {}", format_ts_ms(note.stat.modified_at));
            if !note.tags.is_empty() {
                println!("tags:     {}", note.tags.join(", "));
            }
            println!();
            println!("{}", note.content);
        }
        VaultCommand::Write {
            path,
            content,
            stdin,
        } => {
            let content = resolve_content(content, stdin)?;
            client.write(&path, &content).await?;
            println!("wrote {}", path);
        }
        VaultCommand::Append {
            path,
            content,
            stdin,
        } => {
            let content = resolve_content(content, stdin)?;
            client.append(&path, &content).await?;
            println!("appended to {}", path);
        }
        VaultCommand::Search {
            query,
            limit,
            context_length,
        } => {
            let hits = client.search(&query, context_length).await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().take(limit).enumerate() {
                println!("{}. [{:.2}] {}", i + 1, hit.score, hit.filename);
                let context = hit.first_context().trim();
                if !context.is_empty() {
                    println!("    {}", context.replace('\n', " "));
                }
            }
        }
        VaultCommand::List { folder } => {
            for file in client.list(folder.as_deref().unwrap_or("")).await? {
                println!("{}", file);
            }
        }
        VaultCommand::Tools => {
            let registry = ToolRegistry::with_builtins(client);
            for info in registry.infos() {
                println!("{}: {}", info.name, info.description);
                println!("{}", serde_json::to_string_pretty(&info.parameters)?);
                println!();
            }
        }
    }
    Ok(())
}

async fn run_serve(cfg: Config) -> anyhow::Result<()> {
    let host = Arc::new(LocalHost::new(cfg.vault.clone()));
    let mut plugin = VaultPlugin::new(host.clone());
    plugin.start()?;

    let served = server::run_server(&cfg.server.bind, host).await;
    plugin.shutdown();
    served
}

fn resolve_content(content: Option<String>, stdin: bool) -> anyhow::Result<String> {
    match (content, stdin) {
        (Some(c), false) => Ok(c),
        (None, true) => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read content from stdin")?;
            Ok(buf)
        }
        (Some(_), true) => anyhow::bail!("pass content as an argument or via --stdin, not both"),
        (None, false) => anyhow::bail!("missing content (pass it as an argument or use --stdin)"),
    }
}

fn format_ts_ms(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ms.to_string())
}
