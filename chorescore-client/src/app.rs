use std::path::PathBuf;
use std::time::Duration;

use chorescore_shared::api::{self, Table};
use chorescore_shared::domain::{ProfileId, now_utc};
use chorescore_shared::validation;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::backend::{ChoreBackend, RestBackend};
use crate::commands::{self, ChoreCommand};
use crate::config::{self, ClientConfig};
use crate::events::{ClientEvent, EventHub};
use crate::session::{KeyringStore, Session};
use crate::view::ChoreBoardView;
use crate::{AppError, login, render};

/// Tokens last 30 days server-side; renewing well inside that keeps a
/// long-running watch alive.
const RENEW_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Everything a signed-in command needs.
pub struct Context {
    pub cfg_path: PathBuf,
    pub cfg: ClientConfig,
    pub session: Session,
    pub store: KeyringStore,
}

impl Context {
    pub fn open(cfg_path: PathBuf) -> Result<Self, AppError> {
        let cfg = config::load_config(&cfg_path)
            .map_err(|e| AppError::Config(format!("{e}; run `chorescore login` first")))?;
        info!(path = ?cfg_path, "loaded config");
        let store = KeyringStore::new(&cfg.server_url)?;
        let session = Session::restore(&cfg.server_url, &store)?;
        Ok(Self {
            cfg_path,
            cfg,
            session,
            store,
        })
    }

    fn server(&self) -> &str {
        self.session.server_url()
    }

    /// Backend and a freshly loaded view for the signed-in family.
    async fn family_view(&self) -> Result<(RestBackend, ChoreBoardView), AppError> {
        let (signed_in, family) = self.session.require_family()?;
        let backend = RestBackend::new(self.session.clone(), family.clone());
        let mut view = ChoreBoardView::new(family, signed_in.profile_id(), signed_in.role());
        view.refresh(&backend).await?;
        Ok((backend, view))
    }
}

pub async fn me(ctx: &Context) -> Result<(), AppError> {
    let s = ctx.session.require()?;
    let me = api::rest::me(ctx.server(), &s.token).await?;
    let p = &me.profile;
    println!("{} {} <{}> [{}]", p.avatar, p.name, p.email, p.role);
    match &me.family {
        Some(f) => println!("Family: {} (invite code {})", f.name, f.invite_code),
        None => println!("Family: none yet"),
    }
    if p.family_id != s.family_id() {
        // Joined or created elsewhere; pick up a token that carries it.
        login::renew(&ctx.session, &ctx.store).await?;
        sync_config(ctx)?;
    }
    Ok(())
}

fn sync_config(ctx: &Context) -> Result<(), AppError> {
    let s = ctx.session.require()?;
    let cfg = ClientConfig {
        profile_id: Some(s.profile_id().0),
        family_id: s.family_id().map(|f| f.0),
        ..ctx.cfg.clone()
    };
    config::save_config(&ctx.cfg_path, &cfg)
}

pub async fn create_family(ctx: &Context, name: &str) -> Result<(), AppError> {
    let s = ctx.session.require()?;
    let name = validation::family_name(name)?;
    let req = api::CreateFamilyReq { name };
    let resp = api::rest::create_family(ctx.server(), &s.token, &req).await?;
    login::remember(&ctx.cfg_path, ctx.server(), &ctx.session, &resp.token)?;
    println!(
        "Created family {}. Share invite code {} with your family.",
        resp.family.name, resp.family.invite_code
    );
    Ok(())
}

pub async fn join_family(ctx: &Context, code: &str) -> Result<(), AppError> {
    let s = ctx.session.require()?;
    let invite_code = validation::invite_code(code)?;
    let req = api::JoinFamilyReq { invite_code };
    let resp = match api::rest::join_family(ctx.server(), &s.token, &req).await {
        Ok(r) => r,
        Err(e) if e.body().is_some_and(|b| b.kind == "invalid_invite_code") => {
            return Err(AppError::NotFound("invalid invite code".into()));
        }
        Err(e) => return Err(e.into()),
    };
    login::remember(&ctx.cfg_path, ctx.server(), &ctx.session, &resp.token)?;
    println!("Joined family {}", resp.family.name);
    Ok(())
}

pub async fn members(ctx: &Context) -> Result<(), AppError> {
    let (s, _) = ctx.session.require_family()?;
    let me = api::rest::me(ctx.server(), &s.token).await?;
    let (_, view) = ctx.family_view().await?;
    print!("{}", render::members(me.family.as_ref(), view.members()));
    Ok(())
}

pub async fn chores(ctx: &Context) -> Result<(), AppError> {
    let (_, view) = ctx.family_view().await?;
    print!("{}", render::board(&view.board(now_utc()), view.role()));
    Ok(())
}

pub struct AddArgs {
    pub title: String,
    pub points: String,
    pub description: Option<String>,
    pub assign: Option<String>,
    pub recurrence: chorescore_shared::domain::Recurrence,
    pub day: Option<u8>,
}

pub async fn add(ctx: &Context, args: AddArgs) -> Result<(), AppError> {
    let points = validation::parse_points(&args.points)?;
    let req = api::CreateChoreReq {
        title: args.title,
        description: args.description,
        points,
        assigned_to: args.assign.map(ProfileId),
        recurrence: args.recurrence,
        recurrence_day: args.day,
    };
    run_command(ctx, ChoreCommand::Create(req)).await
}

/// Send one chore command and show the board it leaves behind.
pub async fn run_command(ctx: &Context, cmd: ChoreCommand) -> Result<(), AppError> {
    let (backend, mut view) = ctx.family_view().await?;
    commands::execute(&cmd, &mut view, &backend, now_utc()).await?;
    println!("ok: {}", cmd.describe());
    print!("{}", render::board(&view.board(now_utc()), view.role()));
    Ok(())
}

pub async fn leaderboard(ctx: &Context) -> Result<(), AppError> {
    let (_, family) = ctx.session.require_family()?;
    let backend = RestBackend::new(ctx.session.clone(), family);
    print!("{}", render::leaderboard(&backend.leaderboard().await?));
    Ok(())
}

pub async fn points(ctx: &Context, user: Option<String>) -> Result<(), AppError> {
    let (s, family) = ctx.session.require_family()?;
    let user = user.map(ProfileId).unwrap_or_else(|| s.profile_id());
    let backend = RestBackend::new(ctx.session.clone(), family);
    print!("{}", render::points(&backend.points(&user).await?));
    Ok(())
}

async fn redraw(view: &mut ChoreBoardView, backend: &RestBackend) {
    if let Err(e) = view.refresh(backend).await {
        warn!(error = %e, "watch: refresh failed");
        eprintln!("notice: {e}");
        return;
    }
    let standings = match backend.leaderboard().await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "watch: leaderboard failed");
            Vec::new()
        }
    };
    // Clear the screen and home the cursor.
    print!("\x1b[2J\x1b[H");
    print!("{}", render::board(&view.board(now_utc()), view.role()));
    println!();
    print!("{}", render::leaderboard(&standings));
}

/// Live board: re-queries on every change event until interrupted or the
/// session ends.
pub async fn watch(ctx: &Context) -> Result<(), AppError> {
    login::renew(&ctx.session, &ctx.store).await?;
    let (signed_in, family) = ctx.session.require_family()?;
    let backend = RestBackend::new(ctx.session.clone(), family.clone());
    let mut view = ChoreBoardView::new(family.clone(), signed_in.profile_id(), signed_in.role());

    let mut hub = EventHub::connect(ctx.server(), family.as_str(), &signed_in.token, None)?;
    let mut events = hub.subscribe();
    let mut session_rx = ctx.session.subscribe();
    session_rx.mark_unchanged();

    let cancel = tokio_util::sync::CancellationToken::new();
    let renewer = {
        let session = ctx.session.clone();
        let store = KeyringStore::new(ctx.server())?;
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(RENEW_INTERVAL);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        if let Err(e) = login::renew(&session, &store).await {
                            warn!(error = %e, "watch: session expired");
                            session.sign_out();
                            break;
                        }
                    }
                }
            }
        })
    };

    redraw(&mut view, &backend).await;
    let shutdown = crate::shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = session_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = session_rx.borrow_and_update().clone();
                match current {
                    Some(s) if s.family_id().as_ref() == Some(&family) => {
                        // The feed URL carries the token, so reconnect with the new one.
                        debug!("watch: token rotated; reconnecting feed");
                        hub.shutdown();
                        hub = EventHub::connect(ctx.server(), family.as_str(), &s.token, None)?;
                        events = hub.subscribe();
                    }
                    _ => {
                        eprintln!("Session ended; run `chorescore login` to continue.");
                        break;
                    }
                }
            }
            ev = events.recv() => match ev {
                Ok(ClientEvent::Change(change)) => {
                    debug!(table = ?change.table, kind = ?change.kind, "watch: change");
                    if change.table != Table::Families {
                        redraw(&mut view, &backend).await;
                    }
                }
                Ok(ClientEvent::Resync) | Err(RecvError::Lagged(_)) => {
                    redraw(&mut view, &backend).await;
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    cancel.cancel();
    hub.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(3), renewer).await;
    Ok(())
}
