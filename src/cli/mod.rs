//! CLI module for the semantic cache gateway
//!
//! - `serve`: run the caching proxy
//! - `check-config`: load and validate configuration, then exit

pub mod check;
pub mod serve;

use clap::{Parser, Subcommand};

/// Semantic response cache in front of an LLM backend
#[derive(Parser)]
#[command(name = "semantic-cache-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the caching proxy
    Serve,

    /// Validate configuration without starting the server
    CheckConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["semantic-cache-gateway", "serve"]).unwrap();
        assert!(matches!(cli.command, Command::Serve));

        let cli = Cli::try_parse_from(["semantic-cache-gateway", "check-config"]).unwrap();
        assert!(matches!(cli.command, Command::CheckConfig));

        assert!(Cli::try_parse_from(["semantic-cache-gateway", "ui"]).is_err());
    }
}
