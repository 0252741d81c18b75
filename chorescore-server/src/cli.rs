use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_EPILOG: &str = r#"Every option can also be provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/app.db)
  PORT        (default: 5151 or config.listen_port)

A minimal config.yaml:
  jwt_secret: change-me
"#;

#[derive(Debug, Parser)]
#[command(
    name = "chorescore-server",
    version,
    about = "ChoreScore server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Path to the YAML config
    #[arg(long, env = "CONFIG_PATH", default_value = "config.yaml")]
    pub config: PathBuf,
    /// SQLite database file; created and migrated on first start
    #[arg(long, env = "DB_PATH", default_value = "data/app.db")]
    pub db: PathBuf,
    /// Listen port; overrides config.listen_port
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,
    /// Optional subcommand. Without one, runs the server.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Confirm an account created while require_email_confirmation is on
    ConfirmUser {
        /// Email the account signed up with
        email: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "chorescore-server",
            "--db",
            "/tmp/x.db",
            "--port",
            "9000",
            "confirm-user",
            "mom@example.com",
        ])
        .unwrap();
        assert_eq!(cli.db, PathBuf::from("/tmp/x.db"));
        assert_eq!(cli.port, Some(9000));
        assert!(matches!(
            cli.command,
            Some(Command::ConfirmUser { ref email }) if email == "mom@example.com"
        ));
    }
}
