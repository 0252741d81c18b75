//! Chore mutations issued from the client.
//!
//! Each command is applied to the local view first. `apply` hands back the
//! [`Inverse`] that undoes exactly what it changed, captured before the
//! request leaves. A failed request rolls the view back with it; a
//! successful one is followed by a full refresh.

use chorescore_shared::api::CreateChoreReq;
use chorescore_shared::domain::{ChoreId, ProfileId};
use chorescore_shared::lifecycle;
use chorescore_shared::validation;
use chrono::{DateTime, Utc};

use crate::AppError;
use crate::backend::ChoreBackend;
use crate::view::ChoreBoardView;

/// Prefix for ids of chores that exist only locally until the server
/// answers.
pub const LOCAL_ID_PREFIX: &str = "local-";

#[derive(Debug, Clone)]
pub enum ChoreCommand {
    Create(CreateChoreReq),
    Complete(ChoreId),
    Approve(ChoreId),
    Reject(ChoreId),
    Delete(ChoreId),
}

/// Undo record for one applied command.
#[derive(Debug, Default)]
#[must_use = "dropping an Inverse loses the ability to roll back"]
pub struct Inverse {
    /// Rows as they were before the command touched them.
    restore: Vec<chorescore_shared::api::ChoreDetailDto>,
    /// Rows the command added.
    remove: Vec<ChoreId>,
    /// Points credited optimistically.
    points: Option<(ProfileId, i64)>,
}

impl Inverse {
    pub fn rollback(self, view: &mut ChoreBoardView) {
        for id in &self.remove {
            view.remove(id);
        }
        for detail in self.restore {
            view.upsert(detail);
        }
        if let Some((user, delta)) = self.points {
            view.adjust_points(&user, -delta);
        }
    }
}

fn local_id() -> ChoreId {
    ChoreId(format!("{LOCAL_ID_PREFIX}{}", uuid::Uuid::new_v4()))
}

impl ChoreCommand {
    pub fn describe(&self) -> String {
        match self {
            ChoreCommand::Create(req) => format!("create \"{}\"", req.title.trim()),
            ChoreCommand::Complete(id) => format!("complete {id}"),
            ChoreCommand::Approve(id) => format!("approve {id}"),
            ChoreCommand::Reject(id) => format!("reject {id}"),
            ChoreCommand::Delete(id) => format!("delete {id}"),
        }
    }

    /// Change `view` the way the server is expected to. Nothing is touched
    /// when the command is invalid locally.
    pub fn apply(
        &self,
        view: &mut ChoreBoardView,
        now: DateTime<Utc>,
    ) -> Result<Inverse, AppError> {
        let mut inverse = Inverse::default();
        match self {
            ChoreCommand::Create(req) => {
                let new = validation::new_chore(
                    req,
                    view.viewer(),
                    view.family(),
                    &view.profiles(),
                    now,
                )?;
                let id = local_id();
                let detail = view.detail(new.into_chore(id.clone(), now));
                view.upsert(detail);
                inverse.remove.push(id);
            }
            ChoreCommand::Complete(id) => {
                let before = existing(view, id)?;
                let next = view.detail(lifecycle::mark_complete(&before.chore, now)?);
                view.upsert(next);
                inverse.restore.push(before);
            }
            ChoreCommand::Approve(id) => {
                let before = existing(view, id)?;
                let approval = lifecycle::approve(&before.chore, now)?;
                let approved = view.detail(approval.chore);
                view.upsert(approved);
                if let Some(next) = approval.regenerated {
                    let next_id = local_id();
                    let provisional = view.detail(next.into_chore(next_id.clone(), now));
                    view.upsert(provisional);
                    inverse.remove.push(next_id);
                }
                let delta = i64::from(approval.entry.points_earned);
                view.adjust_points(&approval.entry.user_id, delta);
                inverse.points = Some((approval.entry.user_id, delta));
                inverse.restore.push(before);
            }
            ChoreCommand::Reject(id) => {
                let before = existing(view, id)?;
                let next = view.detail(lifecycle::reject(&before.chore)?);
                view.upsert(next);
                inverse.restore.push(before);
            }
            ChoreCommand::Delete(id) => {
                let before = view
                    .remove(id)
                    .ok_or_else(|| AppError::NotFound(format!("chore {id}")))?;
                inverse.restore.push(before);
            }
        }
        Ok(inverse)
    }

    async fn send(&self, backend: &dyn ChoreBackend) -> Result<(), AppError> {
        match self {
            ChoreCommand::Create(req) => backend.create_chore(req).await.map(drop)?,
            ChoreCommand::Complete(id) => backend.complete_chore(id).await.map(drop)?,
            ChoreCommand::Approve(id) => backend.approve_chore(id).await.map(drop)?,
            ChoreCommand::Reject(id) => backend.reject_chore(id).await.map(drop)?,
            ChoreCommand::Delete(id) => backend.delete_chore(id).await?,
        }
        Ok(())
    }
}

fn existing(
    view: &ChoreBoardView,
    id: &ChoreId,
) -> Result<chorescore_shared::api::ChoreDetailDto, AppError> {
    view.find(id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("chore {id}")))
}

/// Apply `cmd` locally, send it, and settle the view: rolled back on
/// failure, replaced by a fresh snapshot on success.
pub async fn execute(
    cmd: &ChoreCommand,
    view: &mut ChoreBoardView,
    backend: &dyn ChoreBackend,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let inverse = cmd.apply(view, now)?;
    if let Err(e) = cmd.send(backend).await {
        tracing::warn!(command = %cmd.describe(), error = %e, "command failed; rolling back");
        inverse.rollback(view);
        return Err(e);
    }
    tracing::info!(command = %cmd.describe(), "command accepted");
    view.refresh(backend).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::tests::{chore, family_view, t0};
    use async_trait::async_trait;
    use chorescore_shared::api::{
        ApproveResp, ChoreDetailDto, LeaderboardDto, MemberDto, PointsSummaryDto, rest::RestError,
    };
    use chorescore_shared::auth::Role;
    use chorescore_shared::domain::{Chore, ChoreStatus, PointsEntry, Recurrence};
    use chorescore_shared::validation::ValidationError;
    use std::sync::Mutex;

    /// Records calls; fails them all when `fail` is set. Refreshes return
    /// `snapshot`.
    struct FakeBackend {
        fail: bool,
        calls: Mutex<Vec<String>>,
        snapshot: (Vec<MemberDto>, Vec<ChoreDetailDto>),
    }

    impl FakeBackend {
        fn new(fail: bool, view: &ChoreBoardView) -> Self {
            Self {
                fail,
                calls: Mutex::new(Vec::new()),
                snapshot: (view.members().to_vec(), view.chores().to_vec()),
            }
        }

        fn record(&self, call: String) -> Result<(), RestError> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                Err(RestError::Status {
                    status: 409,
                    body: r#"{"error":"conflict","kind":"conflict"}"#.into(),
                })
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn stub_chore(id: &ChoreId) -> Chore {
        chore(id.as_str(), "ann", ChoreStatus::Pending, 0)
    }

    #[async_trait]
    impl ChoreBackend for FakeBackend {
        async fn members(&self) -> Result<Vec<MemberDto>, RestError> {
            Ok(self.snapshot.0.clone())
        }
        async fn chores(&self) -> Result<Vec<ChoreDetailDto>, RestError> {
            Ok(self.snapshot.1.clone())
        }
        async fn create_chore(&self, req: &CreateChoreReq) -> Result<Chore, RestError> {
            self.record(format!("create {}", req.title))?;
            Ok(stub_chore(&"new".into()))
        }
        async fn delete_chore(&self, id: &ChoreId) -> Result<(), RestError> {
            self.record(format!("delete {id}"))
        }
        async fn complete_chore(&self, id: &ChoreId) -> Result<Chore, RestError> {
            self.record(format!("complete {id}"))?;
            Ok(stub_chore(id))
        }
        async fn approve_chore(&self, id: &ChoreId) -> Result<ApproveResp, RestError> {
            self.record(format!("approve {id}"))?;
            Ok(ApproveResp {
                chore: stub_chore(id),
                entry: PointsEntry {
                    id: 1,
                    user_id: "ann".into(),
                    chore_id: id.clone(),
                    points_earned: 10,
                    created_at: t0(),
                },
                regenerated: None,
            })
        }
        async fn reject_chore(&self, id: &ChoreId) -> Result<Chore, RestError> {
            self.record(format!("reject {id}"))?;
            Ok(stub_chore(id))
        }
        async fn leaderboard(&self) -> Result<LeaderboardDto, RestError> {
            Ok(Vec::new())
        }
        async fn points(&self, user: &ProfileId) -> Result<PointsSummaryDto, RestError> {
            Ok(PointsSummaryDto {
                user_id: user.clone(),
                total_points: 0,
                entries: Vec::new(),
            })
        }
    }

    fn status_of(view: &ChoreBoardView, id: &str) -> ChoreStatus {
        view.find(&id.into()).unwrap().chore.status
    }

    fn create_req(title: &str, points: i32) -> CreateChoreReq {
        CreateChoreReq {
            title: title.into(),
            description: None,
            points,
            assigned_to: None,
            recurrence: Recurrence::None,
            recurrence_day: None,
        }
    }

    #[test]
    fn approve_applies_optimistically_and_rolls_back_exactly() {
        let mut view = family_view(Role::Parent, "mom");
        let before = view.chores().to_vec();

        let inverse = ChoreCommand::Approve("c3".into())
            .apply(&mut view, t0())
            .unwrap();
        assert_eq!(status_of(&view, "c3"), ChoreStatus::Completed);
        assert_eq!(view.total_points(&"ann".into()), Some(15));

        inverse.rollback(&mut view);
        assert_eq!(view.chores(), before.as_slice());
        assert_eq!(view.total_points(&"ann".into()), Some(5));
    }

    #[test]
    fn daily_approval_adds_a_provisional_row() {
        let mut view = family_view(Role::Parent, "mom");
        let mut daily = view.find(&"c2".into()).unwrap().clone();
        daily.chore.recurrence = Recurrence::Daily;
        view.upsert(daily);
        let before = view.chores().to_vec();

        let inverse = ChoreCommand::Approve("c2".into())
            .apply(&mut view, t0())
            .unwrap();
        assert_eq!(view.chores().len(), before.len() + 1);
        let provisional = &view.chores()[0];
        assert!(provisional.chore.id.as_str().starts_with(LOCAL_ID_PREFIX));
        assert_eq!(provisional.chore.status, ChoreStatus::Pending);
        assert_eq!(provisional.chore.available_at, Some(t0()));
        assert_eq!(provisional.assigned.as_ref().unwrap().name, "Ben");

        inverse.rollback(&mut view);
        assert_eq!(view.chores(), before.as_slice());
    }

    #[test]
    fn invalid_commands_leave_the_view_alone() {
        let mut view = family_view(Role::Parent, "mom");
        let before = view.chores().to_vec();

        let err = ChoreCommand::Approve("c1".into())
            .apply(&mut view, t0())
            .unwrap_err();
        assert!(matches!(err, AppError::Transition(_)));
        let err = ChoreCommand::Reject("missing".into())
            .apply(&mut view, t0())
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = ChoreCommand::Create(create_req("  ", 5))
            .apply(&mut view, t0())
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::Required("title"))
        ));
        assert_eq!(view.chores(), before.as_slice());
    }

    #[tokio::test]
    async fn failed_requests_roll_back_and_surface_the_error() {
        let mut view = family_view(Role::Parent, "mom");
        let before = view.chores().to_vec();
        let backend = FakeBackend::new(true, &view);

        for cmd in [
            ChoreCommand::Approve("c3".into()),
            ChoreCommand::Reject("c2".into()),
            ChoreCommand::Delete("c1".into()),
            ChoreCommand::Create(create_req("Dishes", 5)),
        ] {
            let err = execute(&cmd, &mut view, &backend, t0()).await.unwrap_err();
            assert!(matches!(err, AppError::Rest(ref e) if e.status() == Some(409)));
            assert_eq!(view.chores(), before.as_slice(), "{}", cmd.describe());
        }
        assert_eq!(view.total_points(&"ann".into()), Some(5));
        assert_eq!(
            backend.calls(),
            vec!["approve c3", "reject c2", "delete c1", "create Dishes"]
        );
    }

    #[tokio::test]
    async fn local_failures_never_reach_the_server() {
        let mut view = family_view(Role::Parent, "mom");
        let backend = FakeBackend::new(false, &view);
        let res = execute(
            &ChoreCommand::Complete("c3".into()),
            &mut view,
            &backend,
            t0(),
        )
        .await;
        assert!(matches!(res, Err(AppError::Transition(_))));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn success_replaces_the_view_with_the_server_snapshot() {
        let mut view = family_view(Role::Child, "ann");
        let server_view = view.clone();
        let backend = FakeBackend::new(false, &server_view);

        execute(
            &ChoreCommand::Complete("c1".into()),
            &mut view,
            &backend,
            t0(),
        )
        .await
        .unwrap();
        assert_eq!(backend.calls(), vec!["complete c1"]);
        // The fake server never changed, so the optimistic update is gone.
        assert_eq!(status_of(&view, "c1"), ChoreStatus::Pending);
        assert_eq!(view.chores(), server_view.chores());
    }
}
