use std::cmp::Ordering;

use chorescore_shared::api::{AssigneeRef, ChoreBoardDto, ChoreDetailDto, CreatorRef, MemberDto};
use chorescore_shared::auth::Role;
use chorescore_shared::domain::{Chore, ChoreId, FamilyId, Profile, ProfileId};
use chorescore_shared::lifecycle::ChoreBoard;
use chrono::{DateTime, Utc};

use crate::AppError;
use crate::backend::ChoreBackend;

/// Local snapshot of one family's chores and members, as seen by one viewer.
///
/// Commands mutate it optimistically; [`ChoreBoardView::refresh`] replaces it
/// wholesale with what the server says.
#[derive(Debug, Clone)]
pub struct ChoreBoardView {
    family: FamilyId,
    viewer: ProfileId,
    role: Role,
    members: Vec<MemberDto>,
    /// Newest first.
    chores: Vec<ChoreDetailDto>,
}

fn newest_first(a: &ChoreDetailDto, b: &ChoreDetailDto) -> Ordering {
    b.chore
        .created_at
        .cmp(&a.chore.created_at)
        .then_with(|| a.chore.id.cmp(&b.chore.id))
}

impl ChoreBoardView {
    pub fn new(family: FamilyId, viewer: ProfileId, role: Role) -> Self {
        Self {
            family,
            viewer,
            role,
            members: Vec::new(),
            chores: Vec::new(),
        }
    }

    pub fn family(&self) -> &FamilyId {
        &self.family
    }

    pub fn viewer(&self) -> &ProfileId {
        &self.viewer
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn members(&self) -> &[MemberDto] {
        &self.members
    }

    pub fn chores(&self) -> &[ChoreDetailDto] {
        &self.chores
    }

    pub fn profiles(&self) -> Vec<Profile> {
        self.members.iter().map(|m| m.profile.clone()).collect()
    }

    pub fn total_points(&self, user: &ProfileId) -> Option<i64> {
        self.members
            .iter()
            .find(|m| &m.profile.id == user)
            .and_then(|m| m.total_points)
    }

    pub fn replace(&mut self, members: Vec<MemberDto>, mut chores: Vec<ChoreDetailDto>) {
        chores.sort_by(newest_first);
        self.members = members;
        self.chores = chores;
    }

    /// Re-query members and chores and replace the snapshot.
    pub async fn refresh(&mut self, backend: &dyn ChoreBackend) -> Result<(), AppError> {
        let members = backend.members().await?;
        let chores = backend.chores().await?;
        tracing::debug!(members = members.len(), chores = chores.len(), "view refreshed");
        self.replace(members, chores);
        Ok(())
    }

    pub fn board(&self, now: DateTime<Utc>) -> ChoreBoardDto {
        ChoreBoard::build(
            self.chores.iter().cloned(),
            self.role,
            &self.viewer,
            now,
            |d: &ChoreDetailDto| &d.chore,
        )
    }

    pub fn find(&self, id: &ChoreId) -> Option<&ChoreDetailDto> {
        self.chores.iter().find(|d| &d.chore.id == id)
    }

    /// Wrap a bare chore with the names the list shows.
    pub fn detail(&self, chore: Chore) -> ChoreDetailDto {
        let member = |id: &ProfileId| self.members.iter().find(|m| &m.profile.id == id);
        let assigned = member(&chore.assigned_to).map(|m| AssigneeRef {
            name: m.profile.name.clone(),
            avatar: m.profile.avatar.clone(),
        });
        let creator = member(&chore.created_by).map(|m| CreatorRef {
            name: m.profile.name.clone(),
        });
        ChoreDetailDto {
            chore,
            assigned,
            creator,
        }
    }

    /// Insert or replace by id.
    pub fn upsert(&mut self, detail: ChoreDetailDto) {
        match self
            .chores
            .iter_mut()
            .find(|d| d.chore.id == detail.chore.id)
        {
            Some(slot) => *slot = detail,
            None => self.chores.push(detail),
        }
        self.chores.sort_by(newest_first);
    }

    pub fn remove(&mut self, id: &ChoreId) -> Option<ChoreDetailDto> {
        let idx = self.chores.iter().position(|d| &d.chore.id == id)?;
        Some(self.chores.remove(idx))
    }

    /// Shift a child's displayed total. Parents carry no total and are left
    /// alone.
    pub fn adjust_points(&mut self, user: &ProfileId, delta: i64) {
        if let Some(total) = self
            .members
            .iter_mut()
            .find(|m| &m.profile.id == user)
            .and_then(|m| m.total_points.as_mut())
        {
            *total += delta;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chorescore_shared::domain::{ChoreStatus, Recurrence};
    use chrono::{Duration, TimeZone};

    pub(crate) fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    pub(crate) fn member(id: &str, name: &str, role: Role, total: Option<i64>) -> MemberDto {
        MemberDto {
            profile: Profile {
                id: id.into(),
                name: name.into(),
                avatar: role.default_avatar().into(),
                role,
                family_id: Some("fam".into()),
                email: format!("{id}@example.com"),
            },
            total_points: total,
        }
    }

    pub(crate) fn chore(id: &str, assignee: &str, status: ChoreStatus, age_mins: i64) -> Chore {
        Chore {
            id: id.into(),
            title: format!("chore {id}"),
            description: None,
            points: 10,
            assigned_to: assignee.into(),
            created_by: "mom".into(),
            family_id: "fam".into(),
            status,
            recurrence: Recurrence::None,
            recurrence_day: None,
            completed_at: None,
            approved_at: None,
            available_at: None,
            created_at: t0() - Duration::minutes(age_mins),
        }
    }

    pub(crate) fn family_view(role: Role, viewer: &str) -> ChoreBoardView {
        let mut view = ChoreBoardView::new("fam".into(), viewer.into(), role);
        view.members = vec![
            member("ann", "Ann", Role::Child, Some(5)),
            member("ben", "Ben", Role::Child, Some(0)),
            member("mom", "Mom", Role::Parent, None),
        ];
        let chores = vec![
            chore("c1", "ann", ChoreStatus::Pending, 30),
            chore("c2", "ben", ChoreStatus::PendingApproval, 20),
            chore("c3", "ann", ChoreStatus::PendingApproval, 10),
        ];
        let details: Vec<_> = chores.into_iter().map(|c| view.detail(c)).collect();
        let members = view.members.clone();
        view.replace(members, details);
        view
    }

    #[test]
    fn snapshot_is_kept_newest_first() {
        let view = family_view(Role::Parent, "mom");
        let ids: Vec<_> = view.chores().iter().map(|d| d.chore.id.as_str()).collect();
        assert_eq!(ids, vec!["c3", "c2", "c1"]);
    }

    #[test]
    fn details_resolve_names() {
        let view = family_view(Role::Parent, "mom");
        let d = view.find(&"c1".into()).unwrap();
        assert_eq!(d.assigned.as_ref().unwrap().name, "Ann");
        assert_eq!(d.creator.as_ref().unwrap().name, "Mom");
    }

    #[test]
    fn board_respects_viewer() {
        let parent = family_view(Role::Parent, "mom").board(t0());
        assert_eq!(parent.needs_approval.len(), 2);
        assert_eq!(parent.to_do.len(), 1);

        let ann = family_view(Role::Child, "ann").board(t0());
        assert_eq!(ann.needs_approval.len(), 1);
        assert_eq!(ann.needs_approval[0].chore.id.as_str(), "c3");
        assert_eq!(ann.to_do.len(), 1);
    }

    #[test]
    fn upsert_and_remove() {
        let mut view = family_view(Role::Parent, "mom");
        let fresh = view.detail(chore("c4", "ben", ChoreStatus::Pending, 0));
        view.upsert(fresh);
        assert_eq!(view.chores()[0].chore.id.as_str(), "c4");

        let mut changed = view.find(&"c1".into()).unwrap().clone();
        changed.chore.title = "renamed".into();
        view.upsert(changed);
        assert_eq!(view.chores().len(), 4);
        assert_eq!(view.find(&"c1".into()).unwrap().chore.title, "renamed");

        assert!(view.remove(&"c4".into()).is_some());
        assert!(view.remove(&"c4".into()).is_none());
    }

    #[test]
    fn points_only_move_for_children() {
        let mut view = family_view(Role::Parent, "mom");
        view.adjust_points(&"ann".into(), 10);
        view.adjust_points(&"mom".into(), 10);
        assert_eq!(view.total_points(&"ann".into()), Some(15));
        assert_eq!(view.total_points(&"mom".into()), None);
    }
}
