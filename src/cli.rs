use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "funnel-analyzer", version, about = "AI-backed funnel coherence analysis service")]
pub struct Cli {
    /// Configuration file path (optional; every setting has a default)
    #[arg(
        short,
        long,
        default_value = "config.toml",
        env = "FUNNEL_ANALYZER_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the HTTP server (default)
    Start,

    /// Test configuration file validity
    Test,

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display effective configuration
    Show,

    /// Validate configuration file
    Validate,
}

impl Cli {
    /// Get the command to execute, defaulting to Start if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_start() {
        let cli = Cli::try_parse_from(["funnel-analyzer"]).unwrap();
        assert!(matches!(cli.get_command(), Commands::Start));
        assert_eq!(cli.config, PathBuf::from("config.toml"));
    }

    #[test]
    fn test_cli_parsing_global_config_flag() {
        let cli = Cli::try_parse_from(["funnel-analyzer", "test", "--config", "/etc/funnel.toml"])
            .unwrap();
        assert!(matches!(cli.get_command(), Commands::Test));
        assert_eq!(cli.config, PathBuf::from("/etc/funnel.toml"));
    }

    #[test]
    fn test_cli_parsing_config_show() {
        let cli = Cli::try_parse_from(["funnel-analyzer", "config", "show"]).unwrap();
        assert!(matches!(
            cli.get_command(),
            Commands::Config {
                action: ConfigCommands::Show
            }
        ));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["funnel-analyzer", "stop"]).is_err());
    }
}
