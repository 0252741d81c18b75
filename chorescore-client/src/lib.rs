use chorescore_shared::api::rest::RestError;
use chorescore_shared::domain::ChoreId;
use chorescore_shared::lifecycle::TransitionError;
use chorescore_shared::validation::ValidationError;
use tracing::info;

pub mod app;
pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod events;
pub mod login;
pub mod render;
pub mod session;
pub mod view;

pub use cli::{Cli, Command};
pub use config::{ClientConfig, load_config, resolve_config_path};

use commands::ChoreCommand;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("{}", .0.message())]
    Rest(#[from] RestError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("not found: {0}")]
    NotFound(String),
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

pub async fn run(cli: Cli) -> Result<(), AppError> {
    init_tracing();
    let cfg_path = resolve_config_path(cli.config)?;

    let (ctx, command) = match cli.command {
        Command::Signup {
            server,
            email,
            name,
            role,
        } => return login::signup(cfg_path, server, email, name, role).await,
        Command::Login { server, email } => return login::login(cfg_path, server, email).await,
        command => (app::Context::open(cfg_path)?, command),
    };

    match command {
        Command::Signup { .. } | Command::Login { .. } => Ok(()),
        Command::Logout => login::logout(&ctx.session, &ctx.store).await,
        Command::Me => app::me(&ctx).await,
        Command::CreateFamily { name } => app::create_family(&ctx, &name).await,
        Command::JoinFamily { code } => app::join_family(&ctx, &code).await,
        Command::Members => app::members(&ctx).await,
        Command::Chores => app::chores(&ctx).await,
        Command::Add {
            title,
            points,
            description,
            assign,
            recurrence,
            day,
        } => {
            app::add(
                &ctx,
                app::AddArgs {
                    title,
                    points,
                    description,
                    assign,
                    recurrence,
                    day,
                },
            )
            .await
        }
        Command::Complete { id: c } => {
            app::run_command(&ctx, ChoreCommand::Complete(ChoreId(c))).await
        }
        Command::Approve { id: c } => {
            app::run_command(&ctx, ChoreCommand::Approve(ChoreId(c))).await
        }
        Command::Reject { id: c } => app::run_command(&ctx, ChoreCommand::Reject(ChoreId(c))).await,
        Command::Delete { id: c } => app::run_command(&ctx, ChoreCommand::Delete(ChoreId(c))).await,
        Command::Leaderboard => app::leaderboard(&ctx).await,
        Command::Points { user } => app::points(&ctx, user).await,
        Command::Watch => app::watch(&ctx).await,
    }
}

/// Resolves on SIGINT/SIGTERM (Ctrl+C elsewhere).
pub(crate) async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => info!("shutdown: received SIGINT"),
                    _ = sigterm.recv() => info!("shutdown: received SIGTERM"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "shutdown: signal handlers unavailable; using Ctrl+C");
            }
        }
    }
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown: received Ctrl+C");
}
