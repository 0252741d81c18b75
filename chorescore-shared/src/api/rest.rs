//! Minimal REST client helpers for consumers (clients).

use super::endpoints as ep;
use super::*;
use crate::domain::{Chore, Profile};
use once_cell::sync::Lazy;
use std::time::Duration;

pub use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("http: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("serde: {0}")]
    Serde(String),
}

impl RestError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server error body, when the response carried one.
    pub fn body(&self) -> Option<ErrorBody> {
        match self {
            RestError::Status { body, .. } => serde_json::from_str(body).ok(),
            _ => None,
        }
    }

    /// Human readable message, preferring the server's `error` field.
    pub fn message(&self) -> String {
        self.body().map(|b| b.error).unwrap_or_else(|| self.to_string())
    }
}

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .tcp_keepalive(Some(Duration::from_secs(180)))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(180))
        .timeout(Duration::from_secs(60))
        .build()
        .unwrap_or_default()
});

fn mk_client() -> reqwest::Client {
    HTTP_CLIENT.clone()
}

async fn check(res: reqwest::Response) -> Result<reqwest::Response, RestError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(RestError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(res)
}

async fn handle_json<T: for<'de> serde::Deserialize<'de>>(
    res: reqwest::Response,
) -> Result<T, RestError> {
    check(res)
        .await?
        .json::<T>()
        .await
        .map_err(|e| RestError::Serde(e.to_string()))
}

async fn send(req: reqwest::RequestBuilder) -> Result<reqwest::Response, RestError> {
    req.send().await.map_err(|e| RestError::Http(e.to_string()))
}

async fn get<T: for<'de> serde::Deserialize<'de>>(
    url: String,
    bearer: &str,
) -> Result<T, RestError> {
    let res = send(mk_client().get(url).bearer_auth(bearer)).await?;
    handle_json(res).await
}

async fn post<B: Serialize + ?Sized, T: for<'de> serde::Deserialize<'de>>(
    url: String,
    bearer: Option<&str>,
    body: &B,
) -> Result<T, RestError> {
    let mut req = mk_client().post(url).json(body);
    if let Some(b) = bearer {
        req = req.bearer_auth(b);
    }
    handle_json(send(req).await?).await
}

pub async fn server_version(base: &str) -> Result<VersionInfoDto, RestError> {
    let res = send(mk_client().get(ep::version(base))).await?;
    handle_json(res).await
}

pub async fn signup(base: &str, req: &SignUpReq) -> Result<SignUpResp, RestError> {
    post(ep::auth_signup(base), None, req).await
}

pub async fn login(base: &str, req: &LoginReq) -> Result<AuthResp, RestError> {
    post(ep::auth_login(base), None, req).await
}

pub async fn renew_token(base: &str, bearer: &str) -> Result<AuthResp, RestError> {
    let res = send(mk_client().post(ep::auth_renew(base)).bearer_auth(bearer)).await?;
    handle_json(res).await
}

pub async fn logout(base: &str, bearer: &str) -> Result<(), RestError> {
    let res = send(mk_client().post(ep::auth_logout(base)).bearer_auth(bearer)).await?;
    check(res).await.map(|_| ())
}

pub async fn me(base: &str, bearer: &str) -> Result<MeResp, RestError> {
    get(ep::me(base), bearer).await
}

pub async fn update_me(
    base: &str,
    bearer: &str,
    req: &UpdateProfileReq,
) -> Result<Profile, RestError> {
    let res = send(mk_client().patch(ep::me(base)).bearer_auth(bearer).json(req)).await?;
    handle_json(res).await
}

pub async fn create_family(
    base: &str,
    bearer: &str,
    req: &CreateFamilyReq,
) -> Result<FamilyResp, RestError> {
    post(ep::families(base), Some(bearer), req).await
}

pub async fn join_family(
    base: &str,
    bearer: &str,
    req: &JoinFamilyReq,
) -> Result<FamilyResp, RestError> {
    post(ep::families_join(base), Some(bearer), req).await
}

pub async fn list_members(
    base: &str,
    family_id: &str,
    bearer: &str,
) -> Result<Vec<MemberDto>, RestError> {
    get(ep::members(base, family_id), bearer).await
}

pub async fn list_chores(
    base: &str,
    family_id: &str,
    bearer: &str,
) -> Result<Vec<ChoreDetailDto>, RestError> {
    get(ep::chores(base, family_id), bearer).await
}

pub async fn chore_board(
    base: &str,
    family_id: &str,
    bearer: &str,
) -> Result<ChoreBoardDto, RestError> {
    get(ep::chore_board(base, family_id), bearer).await
}

pub async fn create_chore(
    base: &str,
    family_id: &str,
    bearer: &str,
    req: &CreateChoreReq,
) -> Result<Chore, RestError> {
    post(ep::chores(base, family_id), Some(bearer), req).await
}

pub async fn delete_chore(
    base: &str,
    family_id: &str,
    chore_id: &str,
    bearer: &str,
) -> Result<(), RestError> {
    let url = ep::chore(base, family_id, chore_id);
    let res = send(mk_client().delete(url).bearer_auth(bearer)).await?;
    check(res).await.map(|_| ())
}

pub async fn complete_chore(
    base: &str,
    family_id: &str,
    chore_id: &str,
    bearer: &str,
) -> Result<Chore, RestError> {
    let url = ep::chore_complete(base, family_id, chore_id);
    let res = send(mk_client().post(url).bearer_auth(bearer)).await?;
    handle_json(res).await
}

pub async fn approve_chore(
    base: &str,
    family_id: &str,
    chore_id: &str,
    bearer: &str,
) -> Result<ApproveResp, RestError> {
    let url = ep::chore_approve(base, family_id, chore_id);
    let res = send(mk_client().post(url).bearer_auth(bearer)).await?;
    handle_json(res).await
}

pub async fn reject_chore(
    base: &str,
    family_id: &str,
    chore_id: &str,
    bearer: &str,
) -> Result<Chore, RestError> {
    let url = ep::chore_reject(base, family_id, chore_id);
    let res = send(mk_client().post(url).bearer_auth(bearer)).await?;
    handle_json(res).await
}

pub async fn leaderboard(
    base: &str,
    family_id: &str,
    bearer: &str,
) -> Result<LeaderboardDto, RestError> {
    get(ep::leaderboard(base, family_id), bearer).await
}

pub async fn points(
    base: &str,
    family_id: &str,
    user_id: &str,
    bearer: &str,
) -> Result<PointsSummaryDto, RestError> {
    get(ep::points(base, family_id, user_id), bearer).await
}
