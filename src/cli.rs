//! CLI argument parsing for the upkeep-worker binary.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "upkeep-worker", about = "Upkeep ingestion worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the worker (default if no subcommand given)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Run one scheduler tick against the database and exit
    Tick,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_migrate_command_parses() {
        let cli = Cli::parse_from(["upkeep-worker", "migrate"]);
        assert!(matches!(cli.command, Some(Command::Migrate)));
    }

    #[test]
    fn test_cli_no_command_defaults_to_none() {
        let cli = Cli::parse_from(["upkeep-worker"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_tick_command_parses() {
        let cli = Cli::parse_from(["upkeep-worker", "tick"]);
        assert!(matches!(cli.command, Some(Command::Tick)));
    }
}
