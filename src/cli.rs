// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

#[derive(Parser, Debug)]
#[command(
    name = "brutalist-mcp-server",
    about = "MCP server orchestrating external CLI critics as adversarial reviewers",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Serve over HTTP (Streamable HTTP + SSE) instead of stdio.
    #[arg(long, env = "HTTP_TRANSPORT")]
    pub http: bool,

    /// Port to bind when --http is set.
    #[arg(long, env = "HTTP_PORT", default_value = "8080")]
    pub port: u16,

    /// Increase log verbosity (-v debug, -vv trace). Stdio mode always logs
    /// to stderr since MCP framing uses stdout exclusively.
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Print the effective configuration and exit.
    ShowConfig,
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "brutalist-mcp-server", &mut std::io::stdout());
}
