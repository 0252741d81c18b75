use async_trait::async_trait;
use chorescore_shared::api::{
    self, ApproveResp, ChoreDetailDto, CreateChoreReq, LeaderboardDto, MemberDto,
    PointsSummaryDto, rest::RestError,
};
use chorescore_shared::domain::{Chore, ChoreId, FamilyId, ProfileId};

use crate::session::Session;

/// Family-scoped calls the view and commands depend on.
#[async_trait]
pub trait ChoreBackend: Send + Sync {
    async fn members(&self) -> Result<Vec<MemberDto>, RestError>;
    async fn chores(&self) -> Result<Vec<ChoreDetailDto>, RestError>;
    async fn create_chore(&self, req: &CreateChoreReq) -> Result<Chore, RestError>;
    async fn delete_chore(&self, id: &ChoreId) -> Result<(), RestError>;
    async fn complete_chore(&self, id: &ChoreId) -> Result<Chore, RestError>;
    async fn approve_chore(&self, id: &ChoreId) -> Result<ApproveResp, RestError>;
    async fn reject_chore(&self, id: &ChoreId) -> Result<Chore, RestError>;
    async fn leaderboard(&self) -> Result<LeaderboardDto, RestError>;
    async fn points(&self, user: &ProfileId) -> Result<PointsSummaryDto, RestError>;
}

/// [`ChoreBackend`] over HTTP. Reads the token from the session on every
/// call so a renewed token is picked up without rebuilding.
pub struct RestBackend {
    session: Session,
    family: FamilyId,
}

impl RestBackend {
    pub fn new(session: Session, family: FamilyId) -> Self {
        Self { session, family }
    }

    fn token(&self) -> Result<String, RestError> {
        self.session
            .current()
            .map(|s| s.token)
            .ok_or(RestError::Status {
                status: 401,
                body: "signed out".into(),
            })
    }

    fn base(&self) -> &str {
        self.session.server_url()
    }

    fn fid(&self) -> &str {
        self.family.as_str()
    }
}

#[async_trait]
impl ChoreBackend for RestBackend {
    async fn members(&self) -> Result<Vec<MemberDto>, RestError> {
        api::rest::list_members(self.base(), self.fid(), &self.token()?).await
    }

    async fn chores(&self) -> Result<Vec<ChoreDetailDto>, RestError> {
        api::rest::list_chores(self.base(), self.fid(), &self.token()?).await
    }

    async fn create_chore(&self, req: &CreateChoreReq) -> Result<Chore, RestError> {
        api::rest::create_chore(self.base(), self.fid(), &self.token()?, req).await
    }

    async fn delete_chore(&self, id: &ChoreId) -> Result<(), RestError> {
        api::rest::delete_chore(self.base(), self.fid(), id.as_str(), &self.token()?).await
    }

    async fn complete_chore(&self, id: &ChoreId) -> Result<Chore, RestError> {
        api::rest::complete_chore(self.base(), self.fid(), id.as_str(), &self.token()?).await
    }

    async fn approve_chore(&self, id: &ChoreId) -> Result<ApproveResp, RestError> {
        api::rest::approve_chore(self.base(), self.fid(), id.as_str(), &self.token()?).await
    }

    async fn reject_chore(&self, id: &ChoreId) -> Result<Chore, RestError> {
        api::rest::reject_chore(self.base(), self.fid(), id.as_str(), &self.token()?).await
    }

    async fn leaderboard(&self) -> Result<LeaderboardDto, RestError> {
        api::rest::leaderboard(self.base(), self.fid(), &self.token()?).await
    }

    async fn points(&self, user: &ProfileId) -> Result<PointsSummaryDto, RestError> {
        api::rest::points(self.base(), self.fid(), user.as_str(), &self.token()?).await
    }
}
