//! Hivemind Server
//!
//! Binary entry point: loads settings, selects the completion provider from
//! the environment and runs the requested front-end (HTTP API or terminal).

mod api;
mod cli;
mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use hivemind_core::memory::ConversationMemory;
use hivemind_core::models::ModelConfig;
use hivemind_core::swarm::{Coordinator, StageRegistry};
use std::io::{self, BufWriter};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use api::{AppState, SharedState};
use config::Settings;

#[derive(Parser, Clone)]
#[command(author, version, about = "Hivemind - multi-stage LLM reasoning swarm")]
struct Args {
    /// Settings file (JSON)
    #[arg(long, default_value = Settings::DEFAULT_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the HTTP API server
    Serve {
        /// Address to bind (overrides settings)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides settings)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Interactive chat in the terminal (default)
    Chat {
        /// Conversation owner
        #[arg(short, long, default_value = "default")]
        user: String,
    },
    /// Answer a single query and exit
    Ask {
        /// The query text
        query: String,
        /// Print every stage's output
        #[arg(long)]
        details: bool,
        /// Print fragments as they arrive
        #[arg(long, conflicts_with = "details")]
        stream: bool,
        /// Conversation owner
        #[arg(short, long, default_value = "default")]
        user: String,
    },
    /// Print the tunable stage parameters
    Parameters,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
}

/// Coordinator over the provider selected from the environment, with memory
/// when enabled
fn build_coordinator(settings: &Settings) -> anyhow::Result<Coordinator> {
    let model = ModelConfig::from_env()?;
    let coordinator = Coordinator::new(settings.swarm.clone(), model.create_provider());
    if !settings.use_memory {
        return Ok(coordinator);
    }

    let memory = Arc::new(ConversationMemory::new(settings.memory.clone()));
    memory.start_background_eviction(settings.memory.cleanup_interval());
    Ok(coordinator.with_memory(memory))
}

async fn run_server(settings: Settings, coordinator: Coordinator) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.api.host, settings.api.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                settings.api.host, settings.api.port
            )
        })?;

    let state: SharedState = Arc::new(AppState {
        coordinator,
        api: settings.api,
    });
    let app = api::router(state);

    tracing::info!(%addr, "Hivemind API listening");
    println!("🚀 Hivemind Server running at http://{}", addr);
    println!("   Query:      POST /query");
    println!("   Parameters: GET  /agent-parameters");
    println!("   Health:     GET  /health");
    println!("   OpenAPI:    GET  /openapi.json");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let mut settings = Settings::load(&args.config).await?;
    let mut stdout = BufWriter::new(io::stdout());
    let command = args.command.unwrap_or(CliCommand::Chat {
        user: "default".to_string(),
    });

    match command {
        CliCommand::Parameters => {
            cli::parameters(&StageRegistry::default().parameter_catalog(), &mut stdout)
        }
        CliCommand::Serve { host, port } => {
            if let Some(host) = host {
                settings.api.host = host;
            }
            if let Some(port) = port {
                settings.api.port = port;
            }
            let coordinator = build_coordinator(&settings)?;
            run_server(settings, coordinator).await
        }
        CliCommand::Ask {
            query,
            details,
            stream,
            user,
        } => {
            let coordinator = build_coordinator(&settings)?;
            if stream {
                cli::ask_streaming(&coordinator, &query, &user, &mut stdout).await
            } else {
                cli::ask(&coordinator, &query, &user, details, &mut stdout).await
            }
        }
        CliCommand::Chat { user } => {
            let coordinator = build_coordinator(&settings)?;
            let stdin = BufReader::new(tokio::io::stdin());
            cli::chat(&coordinator, &user, stdin, &mut stdout).await
        }
    }
}
