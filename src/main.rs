//! openai-api-mock CLI - OpenAI API emulator
//!
//! Usage:
//!   openai-api-mock serve [OPTIONS]    Start the HTTP server
//!
//! Examples:
//!   openai-api-mock serve --port 8080
//!   openai-api-mock serve --config mock.yaml
//!   openai-api-mock serve --seed my-suite --fixed-responses
//!   openai-api-mock serve --upstream https://api.openai.com

use clap::{Parser, Subcommand};
use openai_api_mock::config::{Config, ConfigError};
use openai_api_mock::session::{ExecutionMode, MockSession, Seed};
use openai_api_mock::{server, SystemClock};
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "openai_api_mock=info,tower_http=info";

#[derive(Parser)]
#[command(name = "openai-api-mock")]
#[command(author, version, about = "OpenAI API emulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the mock HTTP server
    Serve(ServeArgs),
}

#[derive(clap::Args)]
struct ServeArgs {
    /// Configuration file path (YAML)
    #[arg(short, long, env = "OPENAI_MOCK_CONFIG")]
    config: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "OPENAI_MOCK_PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "OPENAI_MOCK_HOST")]
    host: Option<String>,

    /// Seed for deterministic responses (number or string)
    #[arg(long, env = "OPENAI_MOCK_SEED")]
    seed: Option<String>,

    /// Delay before each built-in response, in milliseconds
    #[arg(long)]
    latency_ms: Option<u64>,

    /// Occasionally answer with simulated provider errors
    #[arg(long)]
    include_errors: bool,

    /// Answer with canned response templates
    #[arg(long)]
    fixed_responses: bool,

    /// Log every intercepted request body
    #[arg(long)]
    log_requests: bool,

    /// Forward requests no mock handles to this origin
    #[arg(long, env = "OPENAI_MOCK_UPSTREAM")]
    upstream: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn parse_seed(raw: &str) -> Seed {
    raw.parse::<u64>()
        .map(Seed::Number)
        .unwrap_or_else(|_| Seed::Text(raw.to_string()))
}

fn build_config(args: &ServeArgs) -> Result<Config, ConfigError> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    // Override with CLI arguments
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(seed) = &args.seed {
        config.mock.seed = Some(parse_seed(seed));
    }
    if let Some(latency_ms) = args.latency_ms {
        config.mock.latency_ms = latency_ms;
    }
    config.mock.include_errors |= args.include_errors;
    config.mock.use_fixed_responses |= args.fixed_responses;
    config.mock.log_requests |= args.log_requests;
    if let Some(upstream) = &args.upstream {
        config.passthrough_upstream = Some(upstream.clone());
    }

    config.validate()?;
    Ok(config)
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            init_tracing(args.json_logs);
            let config = build_config(&args)?;
            let addr = config.socket_addr()?;

            // The server always mocks, regardless of APP_ENV
            let session = MockSession::activate(
                true,
                ExecutionMode::from_env(),
                config.mock_options(),
                Arc::new(SystemClock),
            )?;

            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::info!("Starting openai-api-mock on {}", addr);
            tracing::info!(
                seeded = config.mock.seed.is_some(),
                fixed = config.mock.use_fixed_responses,
                include_errors = config.mock.include_errors,
                latency_ms = config.mock.latency_ms,
                upstream = config.passthrough_upstream.as_deref().unwrap_or("none"),
                "Configuration"
            );
            tracing::info!("OpenAI endpoints: /v1/chat/completions, /v1/images/generations");

            server::serve_with_shutdown(session.clone(), listener, shutdown_signal()).await?;
            session.stop_mocking();
            tracing::info!("Server shutdown complete");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed() {
        assert_eq!(parse_seed("42"), Seed::Number(42));
        assert_eq!(parse_seed("suite-a"), Seed::Text("suite-a".into()));
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "openai-api-mock",
            "serve",
            "--port",
            "9000",
            "--seed",
            "7",
            "--fixed-responses",
            "--upstream",
            "https://api.openai.com",
        ]);
        let Commands::Serve(args) = cli.command;
        let config = build_config(&args).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.mock.seed, Some(Seed::Number(7)));
        assert!(config.mock.use_fixed_responses);
        assert!(!config.mock.include_errors);
        assert_eq!(
            config.passthrough_upstream.as_deref(),
            Some("https://api.openai.com")
        );
    }
}
