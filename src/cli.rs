//! Command-line argument parsing for MedShop.

use crate::config::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Ask questions about a medical inventory database in plain English.
#[derive(Parser, Debug)]
#[command(name = "medshop")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Data source URI (overrides DATABASE_URL)
    #[arg(long, value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// LLM provider to use: openai or mock (overrides config)
    #[arg(long, value_name = "PROVIDER", global = true)]
    pub llm: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP API
    Serve {
        /// Address to bind
        #[arg(long, value_name = "HOST")]
        host: Option<String>,

        /// Port to bind
        #[arg(short = 'p', long, value_name = "PORT")]
        port: Option<u16>,
    },

    /// Answer a single question and exit
    Ask {
        /// The question, in plain English
        #[arg(value_name = "QUESTION", required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// Start an interactive chat against a running server
    Chat {
        /// Base URL of the MedShop API
        #[arg(
            long,
            value_name = "URL",
            env = "MEDSHOP_API_URL",
            default_value = "http://localhost:8000"
        )]
        endpoint: String,
    },
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Layers command-line overrides on top of a loaded configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(url) = &self.database_url {
            config.database_url = Some(url.clone());
        }
        if let Some(provider) = &self.llm {
            config.llm.provider = provider.clone();
        }
        if let Command::Serve { host, port } = &self.command {
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
        }
    }

    /// Default log filter for the chosen command.
    ///
    /// The chat session keeps quiet so log lines do not interleave with answers.
    pub fn default_log_level(&self) -> &'static str {
        match self.command {
            Command::Chat { .. } => "warn",
            _ => "info",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(args: &[&str]) -> Cli {
        Cli::parse_from(args)
    }

    #[test]
    fn test_parse_serve() {
        let cli = parse_args(&["medshop", "serve", "--host", "127.0.0.1", "-p", "9000"]);
        assert_eq!(
            cli.command,
            Command::Serve {
                host: Some("127.0.0.1".to_string()),
                port: Some(9000)
            }
        );
    }

    #[test]
    fn test_parse_ask_joins_words() {
        let cli = parse_args(&["medshop", "ask", "how", "many", "medicines?"]);
        let Command::Ask { question } = cli.command else {
            panic!("expected ask");
        };
        assert_eq!(question.join(" "), "how many medicines?");
    }

    #[test]
    fn test_ask_requires_question() {
        assert!(Cli::try_parse_from(["medshop", "ask"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse_args(&["medshop", "ask", "hi", "--llm", "mock"]);
        assert_eq!(cli.llm, Some("mock".to_string()));
    }

    #[test]
    fn test_parse_config_path() {
        let cli = parse_args(&["medshop", "--config", "/path/to/config.toml", "serve"]);
        assert_eq!(cli.config_path(), PathBuf::from("/path/to/config.toml"));
    }

    #[test]
    fn test_apply_overrides() {
        let cli = parse_args(&[
            "medshop",
            "--database-url",
            "sqlite::memory:",
            "--llm",
            "mock",
            "serve",
            "--port",
            "8080",
        ]);
        let mut config = Config::default();

        cli.apply_to(&mut config);

        assert_eq!(config.database_url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(config.llm.provider, "mock");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, Config::default().server.host);
    }

    #[test]
    fn test_chat_log_level_is_quiet() {
        let cli = parse_args(&["medshop", "chat", "--endpoint", "http://api:8000"]);
        assert_eq!(cli.default_log_level(), "warn");
        assert_eq!(parse_args(&["medshop", "serve"]).default_log_level(), "info");
    }
}
