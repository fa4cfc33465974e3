//! Hedron CLI
//!
//! Command-line interface for the Hedron controller.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "hedron")]
#[command(about = "Hedron build controller CLI", long_about = None)]
struct Cli {
    /// Controller URL
    #[arg(
        long,
        env = "HEDRON_CONTROLLER_URL",
        default_value = "http://localhost:8080"
    )]
    controller_url: String,

    /// Namespace to operate in
    #[arg(short, long, env = "HEDRON_NAMESPACE", default_value = "default", global = true)]
    namespace: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        controller_url: cli.controller_url,
        namespace: cli.namespace,
    };

    handle_command(cli.command, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_namespace_defaults() {
        let cli = Cli::try_parse_from(["hedron", "project", "list"]).unwrap();
        assert_eq!(cli.namespace, "default");

        let cli = Cli::try_parse_from(["hedron", "project", "get", "demo", "-n", "ci"]).unwrap();
        assert_eq!(cli.namespace, "ci");
    }
}
