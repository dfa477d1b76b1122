// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use brutalist_cli::CliInvoker;
use brutalist_config::Config;
use brutalist_mcp::ToolHandler;
use brutalist_orchestrator::Orchestrator;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(cmd) = &cli.command {
        match cmd {
            Commands::Completions { shell } => {
                cli::print_completions(*shell);
                return Ok(());
            }
            Commands::ShowConfig => {
                let config = Config::load()?;
                println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
                return Ok(());
            }
        }
    }

    // Stdio mode reserves stdout exclusively for MCP framing; all logging
    // goes to stderr regardless of transport (spec §5 "logging").
    init_logging(cli.verbose);

    // The recursion guard (spec §4.10 step 1) must be checked before any
    // other startup work: a process re-invoked as one of its own CLI
    // critics should refuse to serve rather than fork-bomb.
    if Config::is_subprocess() {
        anyhow::bail!(
            "refusing to start: {} is set — this process was spawned as a CLI critic subprocess",
            brutalist_config::SUBPROCESS_MARKER_VAR
        );
    }

    let mut config = Config::load().context("loading configuration")?;
    if cli.http {
        config.http_transport = true;
    }
    if cli.port != 8080 {
        config.http_port = cli.port;
    }
    let config = Arc::new(config);

    let invoker = CliInvoker::new(config.max_cpu_time()).context("initializing CLI invoker")?;
    let orchestrator = Orchestrator::new(invoker);
    let handler = Arc::new(ToolHandler::new(orchestrator));

    if config.http_transport {
        serve_http(handler, config).await
    } else {
        brutalist_mcp::serve_stdio(handler).await
    }
}

async fn serve_http(handler: Arc<ToolHandler>, config: Arc<Config>) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let router = brutalist_mcp::http::build_router(handler.clone(), config.clone());

    tracing::info!(%addr, "listening (http-streaming transport)");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(handler))
        .await
        .context("HTTP server error")?;
    Ok(())
}

/// Waits for SIGINT/SIGTERM (Ctrl-C on non-Unix), then tears down in-memory
/// state before `axum::serve` stops accepting connections: in-flight CLI
/// critic subprocesses are SIGTERMed, open SSE streams are closed with a
/// `server_shutdown` reason, and the response cache is dropped (spec §5
/// "graceful shutdown").
async fn shutdown_signal(handler: Arc<ToolHandler>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return,
        };
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("shutdown signal received, draining connections");
    handler.shutdown().await;
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
