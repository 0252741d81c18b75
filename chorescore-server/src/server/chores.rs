use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chorescore_shared::api::{
    self, AssigneeRef, ChangeEvent, ChangeKind, ChoreDetailDto, CreatorRef, Table,
};
use chorescore_shared::auth::Role;
use chorescore_shared::domain::{
    Chore, ChoreId, FamilyId, Profile, ProfileId, now_utc, total_points,
};
use chorescore_shared::leaderboard;
use chorescore_shared::lifecycle::ChoreBoard;
use chorescore_shared::validation;
use tracing::{info, warn};

use super::auth::AuthCtx;
use super::{AppError, AppState};
use crate::storage::StorageError;

fn detail(chore: Chore, members: &HashMap<&ProfileId, &Profile>) -> ChoreDetailDto {
    let assigned = members.get(&chore.assigned_to).map(|p| AssigneeRef {
        name: p.name.clone(),
        avatar: p.avatar.clone(),
    });
    let creator = members.get(&chore.created_by).map(|p| CreatorRef {
        name: p.name.clone(),
    });
    ChoreDetailDto {
        chore,
        assigned,
        creator,
    }
}

/// Family chores the caller may see, newest first, with names resolved.
async fn visible_details(
    state: &AppState,
    family: &FamilyId,
    auth: &AuthCtx,
) -> Result<Vec<ChoreDetailDto>, AppError> {
    let members = state.store.list_members(family).await?;
    let by_id: HashMap<&ProfileId, &Profile> = members.iter().map(|p| (&p.id, p)).collect();
    let viewer = auth.profile_id();
    Ok(state
        .store
        .list_chores(family)
        .await?
        .into_iter()
        .filter(|c| c.is_visible_to(auth.role(), &viewer))
        .map(|c| detail(c, &by_id))
        .collect())
}

fn publish(state: &AppState, family: &FamilyId, table: Table, kind: ChangeKind) {
    state.events.publish(ChangeEvent::new(table, family, kind));
}

pub async fn list_members(
    State(state): State<AppState>,
    Path(family_id): Path<String>,
) -> Result<Json<Vec<api::MemberDto>>, AppError> {
    let family = FamilyId(family_id);
    let members = state.store.list_members(&family).await?;
    let ledger = state.store.list_family_points(&family).await?;
    let items = members
        .into_iter()
        .map(|profile| {
            let total = (profile.role == Role::Child).then(|| total_points(&ledger, &profile.id));
            api::MemberDto {
                profile,
                total_points: total,
            }
        })
        .collect();
    Ok(Json(items))
}

pub async fn list_chores(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(family_id): Path<String>,
) -> Result<Json<Vec<ChoreDetailDto>>, AppError> {
    let family = FamilyId(family_id);
    Ok(Json(visible_details(&state, &family, &auth).await?))
}

pub async fn chore_board(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(family_id): Path<String>,
) -> Result<Json<api::ChoreBoardDto>, AppError> {
    let family = FamilyId(family_id);
    let details = visible_details(&state, &family, &auth).await?;
    let board = ChoreBoard::build(
        details,
        auth.role(),
        &auth.profile_id(),
        now_utc(),
        |d: &ChoreDetailDto| &d.chore,
    );
    Ok(Json(board))
}

pub async fn create_chore(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(family_id): Path<String>,
    Json(body): Json<api::CreateChoreReq>,
) -> Result<(StatusCode, Json<Chore>), AppError> {
    let family = FamilyId(family_id);
    let now = now_utc();
    let members = state.store.list_members(&family).await?;
    let new = validation::new_chore(&body, &auth.profile_id(), &family, &members, now)?;
    let chore = state.store.insert_chore(new, now).await?;
    info!(
        chore_id = %chore.id,
        assigned_to = %chore.assigned_to,
        points = chore.points,
        recurrence = %chore.recurrence,
        "chore created"
    );
    publish(&state, &family, Table::Chores, ChangeKind::Insert);
    Ok((StatusCode::CREATED, Json(chore)))
}

pub async fn delete_chore(
    State(state): State<AppState>,
    Path((family_id, chore_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let family = FamilyId(family_id);
    let id = ChoreId(chore_id);
    if !state.store.delete_chore(&family, &id).await? {
        return Err(AppError::not_found(format!("chore not found: {id}")));
    }
    info!(chore_id = %id, "chore deleted");
    publish(&state, &family, Table::Chores, ChangeKind::Delete);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn complete_chore(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((family_id, chore_id)): Path<(String, String)>,
) -> Result<Json<Chore>, AppError> {
    let family = FamilyId(family_id);
    let id = ChoreId(chore_id);
    let caller = auth.profile_id();
    let chore = match state
        .store
        .complete_chore(&family, &id, &caller, now_utc())
        .await
    {
        Ok(chore) => chore,
        Err(StorageError::NotAssignee) => {
            warn!(chore_id = %id, profile_id = %caller, "complete: caller is not the assignee");
            return Err(AppError::forbidden());
        }
        Err(e) => return Err(e.into()),
    };
    info!(chore_id = %id, "chore marked complete");
    publish(&state, &family, Table::Chores, ChangeKind::Update);
    Ok(Json(chore))
}

pub async fn approve_chore(
    State(state): State<AppState>,
    Path((family_id, chore_id)): Path<(String, String)>,
) -> Result<Json<api::ApproveResp>, AppError> {
    let family = FamilyId(family_id);
    let id = ChoreId(chore_id);
    let approved = state.store.approve_chore(&family, &id, now_utc()).await?;
    info!(
        chore_id = %id,
        user_id = %approved.entry.user_id,
        points = approved.entry.points_earned,
        regenerated = ?approved.regenerated.as_ref().map(|c| &c.id),
        "chore approved"
    );
    publish(&state, &family, Table::Chores, ChangeKind::Update);
    publish(&state, &family, Table::PointsHistory, ChangeKind::Insert);
    if approved.regenerated.is_some() {
        publish(&state, &family, Table::Chores, ChangeKind::Insert);
    }
    Ok(Json(api::ApproveResp {
        chore: approved.chore,
        entry: approved.entry,
        regenerated: approved.regenerated,
    }))
}

pub async fn reject_chore(
    State(state): State<AppState>,
    Path((family_id, chore_id)): Path<(String, String)>,
) -> Result<Json<Chore>, AppError> {
    let family = FamilyId(family_id);
    let id = ChoreId(chore_id);
    let chore = state.store.reject_chore(&family, &id).await?;
    info!(chore_id = %id, "chore rejected");
    publish(&state, &family, Table::Chores, ChangeKind::Update);
    Ok(Json(chore))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Path(family_id): Path<String>,
) -> Result<Json<api::LeaderboardDto>, AppError> {
    let family = FamilyId(family_id);
    let members = state.store.list_members(&family).await?;
    let ledger = state.store.list_family_points(&family).await?;
    let chores = state.store.list_chores(&family).await?;
    Ok(Json(leaderboard::rank(&members, &ledger, &chores)))
}

pub async fn user_points(
    State(state): State<AppState>,
    Path((family_id, user_id)): Path<(String, String)>,
) -> Result<Json<api::PointsSummaryDto>, AppError> {
    let family = FamilyId(family_id);
    let user = ProfileId(user_id);
    let members = state.store.list_members(&family).await?;
    if !members.iter().any(|m| m.id == user) {
        return Err(AppError::not_found(format!("member not found: {user}")));
    }
    let entries = state.store.list_user_points(&user).await?;
    Ok(Json(api::PointsSummaryDto {
        total_points: total_points(&entries, &user),
        user_id: user,
        entries,
    }))
}
