// SPDX-License-Identifier: GPL-3.0-or-later
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::serve;
use clap::{Parser, Subcommand};
use prism_api::router;
use prism_application::{AggregateOptions, AppState};
use prism_config::{load as load_config, TelemetryConfig};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "prism", version, about = "ISRC metadata aggregation service")]
struct Cli {
    /// TOML configuration file; `PRISM_*` environment variables override it.
    #[arg(long, short, env = "PRISM_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Aggregate metadata for one or more ISRCs and print it as JSON
    Analyze {
        /// Ignore cached records
        #[arg(long)]
        force: bool,
        /// Only query the primary sources
        #[arg(long)]
        no_secondary: bool,
        #[arg(required = true, value_name = "ISRC")]
        isrcs: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.telemetry);

    let state = AppState::from_config(config.clone()).await?;
    state.on_start();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_server(state, &config.http).await,
        Command::Analyze {
            force,
            no_secondary,
            isrcs,
        } => run_analyze(&state, force, no_secondary, &isrcs).await,
    }
}

async fn run_server(state: AppState, http: &prism_config::HttpConfig) -> Result<()> {
    let listener = TcpListener::bind(bind_addr(http)?).await?;
    let addr = listener.local_addr()?;
    info!(target: "cli", "listening on {}", addr);

    serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn run_analyze(
    state: &AppState,
    force: bool,
    no_secondary: bool,
    isrcs: &[String],
) -> Result<()> {
    let options = AggregateOptions {
        force_refresh: force,
        include_secondary_sources: !no_secondary
            && state.aggregator.default_options().include_secondary_sources,
    };

    let mut failed = 0;
    for raw in isrcs {
        match state.aggregator.aggregate(raw, options).await {
            Ok(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            Err(error) => {
                warn!(target: "cli", isrc = %raw, error = %error, "analysis failed");
                eprintln!("{}: {}", raw, error);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} ISRCs could not be analyzed", failed, isrcs.len());
    }
    Ok(())
}

fn init_tracing(telemetry: &TelemetryConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&telemetry.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if telemetry.json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_names(true).with_level(true))
            .init();
    }
}

fn bind_addr(http: &prism_config::HttpConfig) -> Result<SocketAddr> {
    let addr = format!("{}:{}", http.host, http.port);
    addr.parse()
        .with_context(|| format!("invalid listen address {}", addr))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut interrupt), Ok(mut terminate)) => {
                tokio::select! {
                    _ = interrupt.recv() => {},
                    _ = terminate.recv() => {},
                }
            }
            _ => {
                warn!(target: "cli", "failed to install signal handlers, falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!(target: "cli", "shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_addr_parsing() {
        let http = prism_config::HttpConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
        };
        let addr = bind_addr(&http).unwrap();
        assert_eq!(addr.port(), 5000);
        assert!(addr.is_ipv4());
    }

    #[test]
    fn test_bind_addr_ipv6() {
        let http = prism_config::HttpConfig {
            host: "[::1]".to_string(),
            port: 8080,
        };
        let addr = bind_addr(&http).unwrap();
        assert_eq!(addr.port(), 8080);
        assert!(addr.is_ipv6());
    }

    #[test]
    fn test_bind_addr_rejects_hostnames() {
        let http = prism_config::HttpConfig {
            host: "not a host".to_string(),
            port: 80,
        };
        assert!(bind_addr(&http).is_err());
    }

    #[test]
    fn test_serve_is_default_command() {
        let cli = Cli::try_parse_from(["prism"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_analyze_arguments() {
        let cli = Cli::try_parse_from([
            "prism",
            "--config",
            "prism.toml",
            "analyze",
            "--force",
            "--no-secondary",
            "USRC17607839",
            "GBUM71029604",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("prism.toml")));
        assert_eq!(
            cli.command,
            Some(Command::Analyze {
                force: true,
                no_secondary: true,
                isrcs: vec!["USRC17607839".to_string(), "GBUM71029604".to_string()],
            })
        );
    }

    #[test]
    fn test_analyze_requires_an_isrc() {
        assert!(Cli::try_parse_from(["prism", "analyze"]).is_err());
    }
}
