//! Command line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "fairedge", about = "Fair value taker pipeline for prediction markets")]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "fairedge.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the pipeline with the configured feed.
    Run,
    /// Replay a recorded tick file through the pipeline.
    Replay {
        /// Recording to play back.
        recording: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run() {
        let cli = Cli::parse_from(["fairedge", "run"]);
        assert!(matches!(cli.command, Command::Run));
        assert_eq!(cli.config, PathBuf::from("fairedge.toml"));
    }

    #[test]
    fn parses_replay_with_config_override() {
        let cli = Cli::parse_from(["fairedge", "-c", "custom.toml", "replay", "ticks.csv"]);
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert!(matches!(
            cli.command,
            Command::Replay { recording } if recording == PathBuf::from("ticks.csv")
        ));
    }
}
