use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chorescore_shared::api::{self, ChangeEvent, ChangeKind, Table};
use chorescore_shared::auth::Role;
use chorescore_shared::domain::{Profile, now_utc};
use chorescore_shared::validation;
use tracing::{info, warn};

use super::auth::{self, AuthCtx};
use super::{AppError, AppState};
use crate::storage::StorageError;

async fn current_profile(state: &AppState, auth: &AuthCtx) -> Result<Profile, AppError> {
    state
        .store
        .get_profile(&auth.profile_id())
        .await?
        .ok_or_else(|| {
            warn!(profile_id = %auth.claims.sub, "profile no longer exists");
            AppError::unauthorized()
        })
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::MeResp>, AppError> {
    let profile = current_profile(&state, &auth).await?;
    let family = match &profile.family_id {
        Some(fid) => state.store.get_family(fid).await?,
        None => None,
    };
    Ok(Json(api::MeResp { profile, family }))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::UpdateProfileReq>,
) -> Result<Json<Profile>, AppError> {
    let name = body.name.as_deref().map(validation::profile_name).transpose()?;
    let avatar = match body.avatar.as_deref().map(str::trim) {
        Some("") => return Err(AppError::bad_request("avatar must not be empty")),
        other => other.map(str::to_string),
    };
    let profile = state
        .store
        .update_profile(&auth.profile_id(), name, avatar)
        .await?;
    if let Some(fid) = &profile.family_id {
        state
            .events
            .publish(ChangeEvent::new(Table::Profiles, fid, ChangeKind::Update));
    }
    Ok(Json(profile))
}

pub async fn create_family(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::CreateFamilyReq>,
) -> Result<(StatusCode, Json<api::FamilyResp>), AppError> {
    let mut profile = current_profile(&state, &auth).await?;
    if profile.role != Role::Parent {
        warn!(profile_id = %profile.id, "create_family: only parents may create a family");
        return Err(AppError::forbidden());
    }
    let name = validation::family_name(&body.name)?;
    let family = state.store.create_family(&profile.id, &name, now_utc()).await?;
    info!(family_id = %family.id, profile_id = %profile.id, "family created");
    profile.family_id = Some(family.id.clone());
    let token = auth::issue_jwt_for_profile(&state, &profile).await?;
    state
        .events
        .publish(ChangeEvent::new(Table::Families, &family.id, ChangeKind::Insert));
    Ok((StatusCode::CREATED, Json(api::FamilyResp { family, token })))
}

pub async fn join_family(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::JoinFamilyReq>,
) -> Result<Json<api::FamilyResp>, AppError> {
    let mut profile = current_profile(&state, &auth).await?;
    let code = validation::invite_code(&body.invite_code)?;
    let family = match state.store.join_family(&profile.id, &code).await {
        Ok(f) => f,
        Err(StorageError::InvalidInviteCode) => {
            warn!(profile_id = %profile.id, code = %code, "join_family: invalid invite code");
            return Err(AppError::InvalidInviteCode);
        }
        Err(e) => return Err(e.into()),
    };
    info!(family_id = %family.id, profile_id = %profile.id, "joined family");
    profile.family_id = Some(family.id.clone());
    let token = auth::issue_jwt_for_profile(&state, &profile).await?;
    state
        .events
        .publish(ChangeEvent::new(Table::Profiles, &family.id, ChangeKind::Update));
    Ok(Json(api::FamilyResp { family, token }))
}
