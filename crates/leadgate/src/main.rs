// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Leadgate - WhatsApp sales-funnel messaging gateway.
//!
//! This is the binary entry point for the Leadgate daemon.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use leadgate_config::LeadgateConfig;

mod serve;

/// Leadgate - WhatsApp sales-funnel messaging gateway.
#[derive(Parser, Debug)]
#[command(name = "leadgate", version, about, long_about = None)]
struct Cli {
    /// Path to a config file. Defaults to the XDG hierarchy.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway daemon.
    Serve,
    /// Print the effective configuration.
    Config,
}

fn load_config(path: Option<&PathBuf>) -> LeadgateConfig {
    let result = match path {
        Some(path) => leadgate_config::load_and_validate_path(path),
        None => leadgate_config::load_and_validate(),
    };
    match result {
        Ok(config) => config,
        Err(errors) => {
            leadgate_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("leadgate serve failed: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config) => match toml::to_string_pretty(&config) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                eprintln!("failed to render config: {e}");
                std::process::exit(1);
            }
        },
        None => {
            println!("leadgate: use --help for available commands");
        }
    }
}
