use axum::extract::State;
use axum::http::{Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use axum::{Extension, Json};
use chorescore_shared::api;
use chorescore_shared::auth::Role;
use chorescore_shared::domain::{FamilyId, Profile, ProfileId};
use chorescore_shared::jwt::{self, JwtClaims};
use chorescore_shared::validation;
use chrono::{Duration, Utc};
use tracing::{error, info, warn};

use super::{AppError, AppState};
use crate::storage::NewAccount;

/// How many days of inactivity before a session is considered expired.
const SESSION_IDLE_DAYS: i64 = 14;
/// How many days before mandatory re-login.
const TOKEN_TTL_DAYS: i64 = 30;

#[derive(Clone, Debug)]
pub struct AuthCtx {
    pub claims: JwtClaims,
}

impl AuthCtx {
    pub fn profile_id(&self) -> ProfileId {
        self.claims.profile_id()
    }

    pub fn role(&self) -> Role {
        self.claims.role
    }

    pub fn family_id(&self) -> Option<FamilyId> {
        self.claims.family_id()
    }
}

pub async fn require_bearer(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let header_str = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(AppError::unauthorized)?
        .to_str()
        .map_err(|_| AppError::unauthorized())?;
    let Some(token) = header_str.strip_prefix("Bearer ") else {
        return Err(AppError::unauthorized());
    };
    let claims = verify_token(&state, token).await?;
    req.extensions_mut().insert(AuthCtx { claims });
    Ok(next.run(req).await)
}

/// Checks signature and expiry, then that the session behind the token is
/// still live. Touching the session extends its idle window.
pub async fn verify_token(state: &AppState, token: &str) -> Result<JwtClaims, AppError> {
    let claims = match jwt::decode_and_verify(token, state.config.jwt_secret.as_bytes()) {
        Ok(c) => c,
        Err(e) => {
            warn!(error=%e, "auth: jwt decode failed");
            return Err(AppError::unauthorized());
        }
    };
    let cutoff = Utc::now() - Duration::days(SESSION_IDLE_DAYS);
    match state
        .store
        .touch_session_with_cutoff(&claims.jti, cutoff.naive_utc())
        .await
    {
        Ok(true) => Ok(claims),
        Ok(false) => {
            warn!(
                jti = %claims.jti,
                profile_id = %claims.sub,
                cutoff = %cutoff,
                "auth: session missing or expired (last_used_at < cutoff)"
            );
            Err(AppError::unauthorized())
        }
        Err(e) => {
            error!(jti = %claims.jti, error=%e, "auth: touch_session_with_cutoff failed");
            Err(AppError::internal(e))
        }
    }
}

/// Opens a session for `profile` and signs a token carrying its current
/// role and family.
pub async fn issue_jwt_for_profile(
    state: &AppState,
    profile: &Profile,
) -> Result<String, AppError> {
    let jti = uuid::Uuid::new_v4().to_string();
    let exp = (Utc::now() + Duration::days(TOKEN_TTL_DAYS)).timestamp();
    let claims = JwtClaims {
        sub: profile.id.0.clone(),
        jti: jti.clone(),
        exp,
        role: profile.role,
        family_id: profile.family_id.as_ref().map(|f| f.0.clone()),
    };

    state
        .store
        .create_session(&jti, &profile.id)
        .await
        .map_err(|e| {
            error!(profile_id = %profile.id, error=%e, "issue_jwt: create_session failed");
            AppError::internal(e)
        })?;
    jwt::encode(&claims, state.config.jwt_secret.as_bytes()).map_err(|e| {
        error!(profile_id = %profile.id, error=%e, "issue_jwt: jwt encode failed");
        AppError::internal(e)
    })
}

pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<api::SignUpReq>,
) -> Result<(StatusCode, Json<api::SignUpResp>), AppError> {
    let email = validation::email(&body.email)?;
    validation::password(&body.password)?;
    let name = validation::profile_name(&body.name)?;
    let password_hash = bcrypt::hash(&body.password, state.config.bcrypt_cost).map_err(|e| {
        error!(error=%e, "signup: bcrypt hash failed");
        AppError::internal(e)
    })?;
    let confirmed = !state.config.require_email_confirmation;
    let profile = state
        .store
        .create_profile(
            NewAccount {
                email,
                password_hash,
                name,
                role: body.role,
                confirmed,
            },
            Utc::now(),
        )
        .await?;
    info!(profile_id = %profile.id, role = %profile.role, confirmed, "signup: profile created");
    let token = if confirmed {
        Some(issue_jwt_for_profile(&state, &profile).await?)
    } else {
        None
    };
    Ok((StatusCode::CREATED, Json(api::SignUpResp { profile, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<api::LoginReq>,
) -> Result<Json<api::AuthResp>, AppError> {
    let email = body.email.trim().to_lowercase();
    let creds = state.store.find_credentials(&email).await?.ok_or_else(|| {
        warn!(email = %email, "login: unknown email");
        AppError::unauthorized()
    })?;
    if !bcrypt::verify(&body.password, &creds.password_hash).map_err(|e| {
        error!(email = %email, error=%e, "login: bcrypt verify failed");
        AppError::internal(e)
    })? {
        warn!(email = %email, "login: invalid password");
        return Err(AppError::unauthorized());
    }
    if !creds.confirmed {
        warn!(email = %email, "login: email not confirmed");
        return Err(AppError::Unconfirmed);
    }
    let token = issue_jwt_for_profile(&state, &creds.profile).await?;
    Ok(Json(api::AuthResp { token }))
}

/// Replaces the caller's session with a fresh one. The new token reflects
/// the profile as stored now, so a family joined since login shows up.
pub async fn renew(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::AuthResp>, AppError> {
    let profile = state
        .store
        .get_profile(&auth.profile_id())
        .await?
        .ok_or_else(|| {
            warn!(profile_id = %auth.claims.sub, "renew: profile no longer exists");
            AppError::unauthorized()
        })?;
    let token = issue_jwt_for_profile(&state, &profile).await?;
    state.store.delete_session(&auth.claims.jti).await?;
    Ok(Json(api::AuthResp { token }))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<StatusCode, AppError> {
    state.store.delete_session(&auth.claims.jti).await?;
    info!(profile_id = %auth.claims.sub, "logout: session ended");
    Ok(StatusCode::NO_CONTENT)
}
