use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Poddy: on-demand development workspaces on Kubernetes
#[derive(Parser)]
#[command(name = "poddy", version, about)]
pub struct Cli {
    /// Config file; when omitted `poddy.yml` is searched in ./config, ./data and /etc/poddy
    #[arg(long, global = true, env = "PODDY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve {
        /// Listen address, overrides `server.listenAddress`
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Print the resolved provider table and exit
    Providers,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_no_subcommand() {
        let cli = Cli::try_parse_from(["poddy"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.log_json);
    }

    #[test]
    fn test_serve_with_listen_and_global_flags() {
        let cli = Cli::try_parse_from([
            "poddy",
            "serve",
            "--listen",
            "127.0.0.1:9000",
            "--config",
            "/tmp/poddy.yml",
            "--log-json",
        ])
        .unwrap();
        assert!(cli.log_json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/poddy.yml")));
        match cli.command {
            Some(Commands::Serve { listen }) => assert_eq!(listen.as_deref(), Some("127.0.0.1:9000")),
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_providers_subcommand() {
        let cli = Cli::try_parse_from(["poddy", "providers"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Providers)));
    }
}
