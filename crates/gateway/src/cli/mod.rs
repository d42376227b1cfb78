pub mod agents;
pub mod config;
pub mod tools;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// toolport: tool-provider connection manager for agent runtimes.
#[derive(Debug, Parser)]
#[command(name = "toolport", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect the primary providers and supervise them until interrupted
    /// (default when no subcommand is given).
    Serve,
    /// List the primary agent's tools, grouped by provider.
    Tools {
        /// Print the toolsets as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Invoke one tool through the primary providers and print its result.
    Call {
        /// Tool name, as listed by `toolport tools`.
        tool: String,
        /// Arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// List delegate agents and the tools each can see.
    Agents,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `TP_CONFIG` (or
/// `config.toml` by default). Returns the parsed [`Config`] and the
/// path that was used. A missing file yields defaults.
///
/// [`Config`]: tp_domain::config::Config
pub fn load_config() -> anyhow::Result<(tp_domain::config::Config, PathBuf)> {
    let config_path =
        PathBuf::from(std::env::var("TP_CONFIG").unwrap_or_else(|_| "config.toml".into()));

    let config = if config_path.exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", config_path.display()))?;
        toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing {}: {e}", config_path.display()))?
    } else {
        tp_domain::config::Config::default()
    };

    Ok((config, config_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["toolport"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn call_defaults_to_empty_args() {
        let cli = Cli::try_parse_from(["toolport", "call", "web_search"]).unwrap();
        match cli.command {
            Some(Command::Call { tool, args }) => {
                assert_eq!(tool, "web_search");
                assert_eq!(args, "{}");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_subcommands_parse() {
        let cli = Cli::try_parse_from(["toolport", "config", "validate"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Config(ConfigCommand::Validate))));
    }
}
