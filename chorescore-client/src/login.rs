use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chorescore_shared::api::{self, rest::RestError};
use chorescore_shared::auth::Role;
use chorescore_shared::validation;

use crate::AppError;
use crate::config::{self, ClientConfig};
use crate::session::{KeyringStore, Session, SignedIn, TokenStore};

/// Resolve the server URL: CLI arg > config if present > prompt.
fn resolve_server(
    server_arg: Option<String>,
    cfg: Option<&ClientConfig>,
) -> Result<String, AppError> {
    if let Some(s) = server_arg {
        return Ok(config::normalize_server_url(&s));
    }
    if let Some(cfg) = cfg {
        return Ok(config::normalize_server_url(&cfg.server_url));
    }
    Ok(config::normalize_server_url(&prompt("Server URL (e.g., 127.0.0.1:5151): ")?))
}

fn existing_config(cfg_path: &Path) -> Option<ClientConfig> {
    config::load_config(cfg_path).ok()
}

/// Persist `token` to the keyring and remember who it belongs to.
pub(crate) fn remember(
    cfg_path: &Path,
    server_url: &str,
    session: &Session,
    token: &str,
) -> Result<SignedIn, AppError> {
    let signed_in = session.sign_in(token)?;
    KeyringStore::new(server_url)?.save(token)?;
    let cfg = ClientConfig {
        server_url: server_url.to_string(),
        profile_id: Some(signed_in.profile_id().0),
        family_id: signed_in.family_id().map(|f| f.0),
    };
    config::save_config(cfg_path, &cfg)?;
    Ok(signed_in)
}

pub async fn signup(
    cfg_path: PathBuf,
    server_arg: Option<String>,
    email_arg: Option<String>,
    name_arg: Option<String>,
    role: Role,
) -> Result<(), AppError> {
    let server_url = resolve_server(server_arg, existing_config(&cfg_path).as_ref())?;
    let email = validation::email(&match email_arg {
        Some(e) => e,
        None => prompt("Email: ")?,
    })?;
    let name = validation::profile_name(&match name_arg {
        Some(n) => n,
        None => prompt("Name: ")?,
    })?;
    let password = rpassword::prompt_password("Password: ")?;
    validation::password(&password)?;
    let confirm = rpassword::prompt_password("Repeat password: ")?;
    if confirm != password {
        return Err(AppError::Config("passwords do not match".into()));
    }

    let resp = api::rest::signup(
        &server_url,
        &api::SignUpReq {
            email: email.clone(),
            password,
            name,
            role,
        },
    )
    .await
    .map_err(|e| AppError::Http(format!("signup failed: {}", e.message())))?;

    match resp.token {
        Some(token) => {
            let session = Session::new(&server_url);
            remember(&cfg_path, &server_url, &session, &token)?;
            println!(
                "Welcome, {}! Signed in; config written to {}",
                resp.profile.name,
                cfg_path.display()
            );
        }
        None => {
            // Keep the server so `login` does not ask again.
            config::save_config(
                &cfg_path,
                &ClientConfig {
                    server_url: server_url.clone(),
                    ..Default::default()
                },
            )?;
            println!("Account created for {email}. It must be confirmed before you can log in.");
        }
    }
    Ok(())
}

pub async fn login(
    cfg_path: PathBuf,
    server_arg: Option<String>,
    email_arg: Option<String>,
) -> Result<(), AppError> {
    let server_url = resolve_server(server_arg, existing_config(&cfg_path).as_ref())?;
    let email = match email_arg {
        Some(e) => e,
        None => prompt("Email: ")?,
    };
    let password = rpassword::prompt_password("Password: ")?;

    let body = match api::rest::login(&server_url, &api::LoginReq { email, password }).await {
        Ok(v) => v,
        Err(e) if e.body().is_some_and(|b| b.kind == "email_not_confirmed") => {
            return Err(AppError::Http(
                "login failed: this account has not been confirmed yet".into(),
            ));
        }
        Err(e) => return Err(AppError::Http(format!("login failed: {}", e.message()))),
    };

    let session = Session::new(&server_url);
    let signed_in = remember(&cfg_path, &server_url, &session, &body.token)?;
    println!(
        "Saved token in keyring for {} and wrote config to {}",
        server_url,
        cfg_path.display()
    );
    if signed_in.family_id().is_none() {
        println!("Next: `chorescore create-family <name>` or `chorescore join-family <code>`");
    }
    Ok(())
}

pub async fn logout(session: &Session, store: &dyn TokenStore) -> Result<(), AppError> {
    if let Some(s) = session.current() {
        match api::rest::logout(session.server_url(), &s.token).await {
            Ok(()) => {}
            // Already gone server-side; forgetting it locally is all that is left.
            Err(RestError::Status { status: 401, .. }) => {}
            Err(e) => {
                tracing::warn!(error = %e, "logout request failed; clearing local token anyway")
            }
        }
    }
    store.clear()?;
    session.sign_out();
    println!("Signed out");
    Ok(())
}

/// Swap the stored token for a fresh one. An expired session is reported as
/// such; other failures keep the current token.
pub async fn renew(session: &Session, store: &dyn TokenStore) -> Result<(), AppError> {
    let current = session.require()?;
    match api::rest::renew_token(session.server_url(), &current.token).await {
        Ok(resp) => {
            session.sign_in(&resp.token)?;
            store.save(&resp.token)?;
            tracing::info!("renewed auth token from server");
            Ok(())
        }
        Err(RestError::Status { status: 401, .. }) => Err(AppError::Http(
            "token renewal failed with unauthorized; please log in again".into(),
        )),
        Err(e) => {
            tracing::warn!(error = %e, "token renewal failed; continuing with existing token");
            Ok(())
        }
    }
}

fn prompt(msg: &str) -> Result<String, AppError> {
    print!("{}", msg);
    io::stdout().flush().ok();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf)?;
    Ok(buf.trim().to_string())
}
