#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::too_many_lines
)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use parley::chat::{create_chat_service, ChatService, TurnRequest};
use parley::config::{Config, GatewayConfig};
use parley::gateway::{run_gateway, AppState};
use parley::sessions::SweepReport;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// `Parley` - routing and orchestration core for a conversational front-end.
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(version)]
#[command(about = "Route chat turns to classifiers, skills, tools or agents.", long_about = None)]
struct Cli {
    /// Directory holding config.toml (sets CONFIG_DIR)
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway
    #[command(long_about = "\
Start the HTTP gateway.

Serves POST /chat, GET /health and POST /agents/sweep. Bind address \
defaults to the values in your config file (gateway.host / gateway.port). \
In agent mode stale sessions are swept every agent.sweep_interval_secs; \
with DELETE_OLD_AGENTS set, stale and orphaned sessions are also swept \
before the first request is accepted.

Examples:
  parley serve
  parley serve --port 8080
  parley serve --host 0.0.0.0")]
    Serve {
        /// Port to listen on; defaults to config gateway.port
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to; defaults to config gateway.host
        #[arg(long)]
        host: Option<String>,
    },

    /// Run a single turn through the full pipeline and print the payload
    #[command(long_about = "\
Run a single turn through the full pipeline.

Prints the outbound JSON payload ({messages, need_more_info}).

Examples:
  parley chat -m \"What is your return policy?\"
  parley chat -m \"cancel order 12345\" --conversation c-42")]
    Chat {
        /// User message
        #[arg(short, long)]
        message: String,

        /// Conversation id (scopes agent sessions)
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Ask the running gateway to delete its stale agent sessions once
    #[command(long_about = "\
Ask the running gateway to delete its stale agent sessions once.

Agent sessions live inside the gateway process, so this posts to \
/agents/sweep on gateway.host / gateway.port and prints the report.

Examples:
  parley sweep-agents
  parley sweep-agents --port 8080")]
    SweepAgents {
        /// Gateway port; defaults to config gateway.port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration with secrets masked
    Show,
}

async fn sweep_agents(chat: &ChatService) -> Result<SweepReport> {
    let Some(sessions) = chat.router().sessions() else {
        info!("agent execution mode is off, nothing to sweep");
        return Ok(SweepReport::default());
    };
    let orphans = sessions
        .purge_orphans()
        .await
        .context("Failed to list agent sessions")?;
    let stale = sessions.sweep_stale().await;
    let report = SweepReport {
        deleted: orphans.deleted + stale.deleted,
        busy: orphans.busy + stale.busy,
        failed: orphans.failed + stale.failed,
    };
    info!(
        deleted = report.deleted,
        busy = report.busy,
        failed = report.failed,
        "agent sweep finished"
    );
    Ok(report)
}

fn sweep_url(gateway: &GatewayConfig) -> String {
    let host = match gateway.host.as_str() {
        "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
        host => host,
    };
    format!("http://{host}:{}/agents/sweep", gateway.port)
}

async fn request_sweep(gateway: &GatewayConfig) -> Result<SweepReport> {
    let url = sweep_url(gateway);
    let response = reqwest::Client::new()
        .post(&url)
        .timeout(Duration::from_secs(gateway.request_timeout_secs))
        .send()
        .await
        .with_context(|| format!("Failed to reach gateway at {url}"))?
        .error_for_status()
        .context("Gateway rejected the sweep request")?;
    response
        .json::<SweepReport>()
        .await
        .context("Failed to decode sweep report")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
        std::env::set_var("CONFIG_DIR", config_dir);
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let mut config = Config::load().await?;

    match cli.command {
        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(host) = host {
                config.gateway.host = host;
            }
            let chat = create_chat_service(&config)?;
            if config.agent.delete_old_agents {
                sweep_agents(&chat).await?;
            }
            let sweeper = chat.router().sessions().map(|sessions| {
                sessions.spawn_sweeper(Duration::from_secs(config.agent.sweep_interval_secs))
            });
            let state = AppState::new(Arc::new(chat), &config.gateway);
            let served = run_gateway(state, &config.gateway).await;
            if let Some(sweeper) = sweeper {
                sweeper.abort();
            }
            served
        }

        Commands::Chat {
            message,
            conversation,
        } => {
            let chat = create_chat_service(&config)?;
            let mut request = TurnRequest::new(message);
            request.conversation_id = conversation;
            let response = chat.handle(request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }

        Commands::SweepAgents { port } => {
            if let Some(port) = port {
                config.gateway.port = port;
            }
            let report = request_sweep(&config.gateway).await?;
            println!(
                "deleted: {}, busy: {}, failed: {}",
                report.deleted, report.busy, report.failed
            );
            Ok(())
        }

        Commands::Config { config_command } => match config_command {
            ConfigCommands::Show => {
                println!("# {}", config.config_path.display());
                print!("{}", config.to_masked_toml()?);
                Ok(())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_has_no_flag_conflicts() {
        Cli::command().debug_assert();
    }

    #[test]
    fn chat_command_parses_message_and_conversation() {
        let cli = Cli::try_parse_from(["parley", "chat", "-m", "hello", "--conversation", "c-1"])
            .expect("chat invocation should parse");
        match cli.command {
            Commands::Chat {
                message,
                conversation,
            } => {
                assert_eq!(message, "hello");
                assert_eq!(conversation.as_deref(), Some("c-1"));
            }
            other => panic!("expected chat command, got {other:?}"),
        }
    }

    #[test]
    fn serve_accepts_host_and_port_overrides() {
        let cli = Cli::try_parse_from(["parley", "serve", "-p", "8080", "--host", "0.0.0.0"])
            .expect("serve invocation should parse");
        match cli.command {
            Commands::Serve { port, host } => {
                assert_eq!(port, Some(8080));
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
            }
            other => panic!("expected serve command, got {other:?}"),
        }
    }

    #[test]
    fn sweep_url_targets_loopback_for_wildcard_binds() {
        let mut gateway = GatewayConfig {
            port: 8080,
            host: "0.0.0.0".into(),
            ..GatewayConfig::default()
        };
        assert_eq!(sweep_url(&gateway), "http://127.0.0.1:8080/agents/sweep");
        gateway.host = "10.1.2.3".into();
        assert_eq!(sweep_url(&gateway), "http://10.1.2.3:8080/agents/sweep");
    }

    #[tokio::test]
    async fn sweep_without_agent_mode_is_empty() {
        let chat = create_chat_service(&Config::default()).unwrap();
        assert_eq!(sweep_agents(&chat).await.unwrap(), SweepReport::default());
    }
}
