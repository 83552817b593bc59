// SPDX-FileCopyrightText: 2026 Caramelo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caramelo - a WhatsApp sales agent memory core for pet shops.
//!
//! This is the binary entry point for the Caramelo service.

use clap::{Parser, Subcommand};

mod followup;
mod gateway;
mod memory;
mod opportunities;
mod payments;
mod serve;
mod shutdown;
mod webhook;

/// Caramelo - a WhatsApp sales agent memory core for pet shops.
#[derive(Parser, Debug)]
#[command(name = "caramelo", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook server and dispatch loops.
    Serve,
    /// Print the resolved configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup
    let config = match caramelo_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            caramelo_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("caramelo serve failed: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config) => match toml::to_string_pretty(&config) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                eprintln!("caramelo config: failed to render: {e}");
                std::process::exit(1);
            }
        },
        None => {
            println!("caramelo: use --help for available commands");
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn binary_loads_config_defaults() {
        // Verify config loads with defaults (no config file needed)
        let config = caramelo_config::load_and_validate().expect("default config should be valid");
        assert_eq!(config.agent.name, "caramelo");
    }
}
