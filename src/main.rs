//! CapStack CLI
//!
//! Runs the API server, or a single completion from the terminal.

use anyhow::{Context, Result};
use capstack::server::{self, AppState};
use capstack::{
    CompletionRelay, ItemStore, OpenAiCompatClient, RequestEnvelope, Settings, Telemetry,
};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "capstack")]
#[command(about = "CapStack API - CRUD items and an LLM completion relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Address to bind (overrides HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Port to bind (overrides PORT)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Default LLM model (overrides LLM_MODEL)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// SQLite database URL (overrides DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/WebSocket server (default)
    Serve,

    /// Run a single completion
    Prompt {
        /// The prompt to send
        message: String,

        /// Optional system prompt
        #[arg(short, long)]
        system: Option<String>,

        /// Print fragments as they arrive
        #[arg(long)]
        stream: bool,
    },

    /// Print the resolved settings (secrets redacted)
    Config,
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::from_env()
        .context("Invalid configuration")?
        .with_verbose(cli.verbose)
        .with_bind(cli.host.clone(), cli.port);
    if let Some(model) = &cli.model {
        settings = settings.with_model(model.clone());
    }
    if let Some(url) = &cli.database_url {
        settings = settings.with_database_url(url.clone());
    }
    // re-validate after CLI overrides
    settings.database_location()?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Arc::new(load_settings(&cli)?);

    match cli.command {
        Some(Commands::Config) => {
            println!("{}", serde_json::to_string_pretty(&settings.redacted())?);
            Ok(())
        }
        Some(Commands::Prompt {
            message,
            system,
            stream,
        }) => {
            let _telemetry = Telemetry::minimal(settings.telemetry.verbose);
            run_prompt(settings, message, system, stream).await
        }
        Some(Commands::Serve) | None => {
            let _telemetry = Telemetry::init(&settings.telemetry, &settings.app_name)?;
            run_server(settings).await
        }
    }
}

async fn run_server(settings: Arc<Settings>) -> Result<()> {
    let location = settings.database_location()?;
    let store = tokio::task::spawn_blocking(move || ItemStore::open(&location))
        .await?
        .context("Failed to open item store")?;

    if !settings.llm_configured() {
        tracing::warn!(
            "No hosted LLM provider configured; only ollama/ models will be served"
        );
    }

    let listener = TcpListener::bind((settings.host.as_str(), settings.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", settings.host, settings.port))?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown requested");
                    shutdown.cancel();
                }
                Err(e) => tracing::error!(error = %e, "Unable to listen for Ctrl-C"),
            }
        }
    });

    let adapter = OpenAiCompatClient::from_config(&settings.llm)
        .context("Failed to build provider HTTP client")?;
    let state = AppState::new(settings, Arc::new(adapter), store);
    server::serve(state, listener, shutdown).await?;
    Ok(())
}

async fn run_prompt(
    settings: Arc<Settings>,
    message: String,
    system: Option<String>,
    stream: bool,
) -> Result<()> {
    let adapter = OpenAiCompatClient::from_config(&settings.llm)
        .context("Failed to build provider HTTP client")?;
    let relay = CompletionRelay::new(settings, Arc::new(adapter));
    let request = RequestEnvelope {
        system_prompt: system,
        ..RequestEnvelope::new(message)
    }
    .into_request()?;

    if !stream {
        let completion = relay.complete(&request).await?;
        println!("{}", completion.content);
        return Ok(());
    }

    let mut fragments = relay.stream(&request).await?;
    let mut stdout = std::io::stdout();
    while let Some(fragment) = fragments.next().await {
        write!(stdout, "{}", fragment?)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}
