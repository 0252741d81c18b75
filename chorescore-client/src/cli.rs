use std::path::PathBuf;

use chorescore_shared::auth::Role;
use chorescore_shared::domain::Recurrence;
use clap::{Parser, Subcommand};

const HELP_EPILOG: &str = r#"Config resolution order:
  1) --config/-c PATH
  2) $CHORESCORE_CONFIG
  3) platform default, e.g. ~/.config/chorescore/client.yaml

The bearer token is kept in the OS keyring, keyed by server URL.
"#;

#[derive(Debug, Parser)]
#[command(
    name = "chorescore",
    version,
    about = "Terminal client for ChoreScore",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an account
    Signup {
        /// Server URL (e.g., http://127.0.0.1:5151). Falls back to config or prompt.
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_parser = parse_role, default_value = "parent")]
        role: Role,
    },
    /// Log in and save the token in the keyring
    Login {
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// End the session and forget the token
    Logout,
    /// Show the signed-in profile and family
    Me,
    /// Start a family (parents only)
    CreateFamily { name: String },
    /// Join a family with its invite code
    JoinFamily { code: String },
    /// List family members
    Members,
    /// Show the chore board
    Chores,
    /// Add a chore (parents only)
    Add {
        title: String,
        /// Whole number of points
        #[arg(short, long)]
        points: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Profile id of the child. Defaults to the first child.
        #[arg(long)]
        assign: Option<String>,
        #[arg(long, value_parser = parse_recurrence, default_value = "none")]
        recurrence: Recurrence,
        /// Day of week for weekly chores, 0 = Sunday
        #[arg(long)]
        day: Option<u8>,
    },
    /// Mark a chore done
    Complete { id: String },
    /// Approve a completed chore (parents only)
    Approve { id: String },
    /// Send a completed chore back (parents only)
    Reject { id: String },
    /// Delete a chore (parents only)
    Delete { id: String },
    /// Show the family leaderboard
    Leaderboard,
    /// Show a points ledger. Defaults to your own.
    Points {
        #[arg(long)]
        user: Option<String>,
    },
    /// Keep the board on screen and refresh it as the family makes changes
    Watch,
}

fn parse_role(s: &str) -> Result<Role, String> {
    s.parse::<Role>().map_err(|e| e.to_string())
}

fn parse_recurrence(s: &str) -> Result<Recurrence, String> {
    s.parse::<Recurrence>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_parses_points_as_text() {
        let cli = Cli::parse_from([
            "chorescore",
            "add",
            "Dishes",
            "--points",
            "ten",
            "--recurrence",
            "weekly",
            "--day",
            "3",
        ]);
        match cli.command {
            Command::Add {
                title,
                points,
                recurrence,
                day,
                ..
            } => {
                assert_eq!(title, "Dishes");
                assert_eq!(points, "ten");
                assert_eq!(recurrence, Recurrence::Weekly);
                assert_eq!(day, Some(3));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn global_config_flag() {
        let cli = Cli::parse_from(["chorescore", "me", "--config", "/tmp/c.yaml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.yaml")));
        assert!(matches!(cli.command, Command::Me));
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(Cli::try_parse_from(["chorescore", "signup", "--role", "admin"]).is_err());
        assert!(Cli::try_parse_from(["chorescore", "signup", "--role", "child"]).is_ok());
    }
}
