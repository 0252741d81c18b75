//! Chore status state machine and visibility rules.
//!
//! Everything here is pure: callers pass the current time in and persist the
//! returned rows themselves. Storage runs each transition inside a single
//! transaction so a status change and its ledger entry land together.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::domain::{Chore, ChoreStatus, NewChore, NewPointsEntry, ProfileId, Recurrence};

/// Days until an approved weekly chore comes back.
pub const WEEKLY_COOLDOWN_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Complete,
    Approve,
    Reject,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Complete => "complete",
            Action::Approve => "approve",
            Action::Reject => "reject",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {action} a chore that is {status}")]
    InvalidTransition { status: ChoreStatus, action: Action },
    #[error("chore is not available until {0}")]
    NotAvailable(DateTime<Utc>),
}

/// Result of approving a chore: the updated row, the ledger entry to append,
/// and for daily chores the next instance to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approval {
    pub chore: Chore,
    pub entry: NewPointsEntry,
    pub regenerated: Option<NewChore>,
}

impl Chore {
    /// `available_at` unset or already reached.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        match self.available_at {
            None => true,
            Some(at) => at <= now,
        }
    }

    pub fn is_visible_to(&self, role: Role, viewer: &ProfileId) -> bool {
        match role {
            Role::Parent => true,
            Role::Child => &self.assigned_to == viewer,
        }
    }

    pub fn partition(&self, now: DateTime<Utc>) -> Option<Partition> {
        let available = self.is_available(now);
        match (self.status, self.recurrence) {
            (ChoreStatus::PendingApproval, _) => Some(Partition::NeedsApproval),
            (ChoreStatus::Pending, Recurrence::Weekly) => {
                available.then_some(Partition::WeeklyAvailable)
            }
            (ChoreStatus::Pending, _) => available.then_some(Partition::ToDo),
            // A weekly chore keeps `completed` across cycles; once its date
            // passes it is actionable again.
            (ChoreStatus::Completed, Recurrence::Weekly) if available => {
                Some(Partition::WeeklyAvailable)
            }
            (ChoreStatus::Completed, Recurrence::Weekly) => Some(Partition::WeeklyDone),
            (ChoreStatus::Completed, _) => Some(Partition::Archived),
        }
    }
}

/// Assignee marks the chore done.
pub fn mark_complete(chore: &Chore, now: DateTime<Utc>) -> Result<Chore, TransitionError> {
    let rolled_over =
        chore.status == ChoreStatus::Completed && chore.recurrence == Recurrence::Weekly;
    if chore.status != ChoreStatus::Pending && !rolled_over {
        return Err(TransitionError::InvalidTransition {
            status: chore.status,
            action: Action::Complete,
        });
    }
    if let Some(at) = chore.available_at
        && at > now
    {
        return Err(TransitionError::NotAvailable(at));
    }
    let mut next = chore.clone();
    next.status = ChoreStatus::PendingApproval;
    next.completed_at = Some(now);
    Ok(next)
}

/// Parent approves a completion.
pub fn approve(chore: &Chore, now: DateTime<Utc>) -> Result<Approval, TransitionError> {
    if chore.status != ChoreStatus::PendingApproval {
        return Err(TransitionError::InvalidTransition {
            status: chore.status,
            action: Action::Approve,
        });
    }
    let mut next = chore.clone();
    next.status = ChoreStatus::Completed;
    next.approved_at = Some(now);

    let regenerated = match chore.recurrence {
        Recurrence::Weekly => {
            next.available_at = Some(now + Duration::days(WEEKLY_COOLDOWN_DAYS));
            None
        }
        Recurrence::Daily => Some(NewChore {
            title: chore.title.clone(),
            description: chore.description.clone(),
            points: chore.points,
            assigned_to: chore.assigned_to.clone(),
            created_by: chore.created_by.clone(),
            family_id: chore.family_id.clone(),
            recurrence: chore.recurrence,
            recurrence_day: chore.recurrence_day,
            available_at: Some(now),
        }),
        Recurrence::None => None,
    };

    Ok(Approval {
        entry: NewPointsEntry {
            user_id: chore.assigned_to.clone(),
            chore_id: chore.id.clone(),
            points_earned: chore.points,
        },
        chore: next,
        regenerated,
    })
}

/// Parent sends a completion back.
pub fn reject(chore: &Chore) -> Result<Chore, TransitionError> {
    if chore.status != ChoreStatus::PendingApproval {
        return Err(TransitionError::InvalidTransition {
            status: chore.status,
            action: Action::Reject,
        });
    }
    let mut next = chore.clone();
    next.status = ChoreStatus::Pending;
    next.completed_at = None;
    Ok(next)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    NeedsApproval,
    ToDo,
    WeeklyAvailable,
    WeeklyDone,
    Archived,
}

impl Partition {
    pub fn is_actionable(&self) -> bool {
        matches!(self, Partition::ToDo | Partition::WeeklyAvailable)
    }
}

/// Chores split into the lists a family member sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoreBoard<T = Chore> {
    pub needs_approval: Vec<T>,
    pub to_do: Vec<T>,
    pub weekly_available: Vec<T>,
    pub weekly_done: Vec<T>,
    pub archived: Vec<T>,
}

impl<T> Default for ChoreBoard<T> {
    fn default() -> Self {
        Self {
            needs_approval: Vec::new(),
            to_do: Vec::new(),
            weekly_available: Vec::new(),
            weekly_done: Vec::new(),
            archived: Vec::new(),
        }
    }
}

impl<T> ChoreBoard<T> {
    /// Partition `items` for `viewer`, newest first within each list.
    /// `chore_of` projects the chore out of richer row types.
    pub fn build<I, F>(
        items: I,
        role: Role,
        viewer: &ProfileId,
        now: DateTime<Utc>,
        chore_of: F,
    ) -> Self
    where
        I: IntoIterator<Item = T>,
        F: Fn(&T) -> &Chore,
    {
        let mut board = Self::default();
        for item in items {
            let chore = chore_of(&item);
            if !chore.is_visible_to(role, viewer) {
                continue;
            }
            let Some(part) = chore.partition(now) else {
                continue;
            };
            board.list_mut(part).push(item);
        }
        for list in board.lists_mut() {
            list.sort_by(|a, b| {
                let (a, b) = (chore_of(a), chore_of(b));
                b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
            });
        }
        board
    }

    pub fn list(&self, part: Partition) -> &[T] {
        match part {
            Partition::NeedsApproval => &self.needs_approval,
            Partition::ToDo => &self.to_do,
            Partition::WeeklyAvailable => &self.weekly_available,
            Partition::WeeklyDone => &self.weekly_done,
            Partition::Archived => &self.archived,
        }
    }

    fn list_mut(&mut self, part: Partition) -> &mut Vec<T> {
        match part {
            Partition::NeedsApproval => &mut self.needs_approval,
            Partition::ToDo => &mut self.to_do,
            Partition::WeeklyAvailable => &mut self.weekly_available,
            Partition::WeeklyDone => &mut self.weekly_done,
            Partition::Archived => &mut self.archived,
        }
    }

    fn lists_mut(&mut self) -> [&mut Vec<T>; 5] {
        [
            &mut self.needs_approval,
            &mut self.to_do,
            &mut self.weekly_available,
            &mut self.weekly_done,
            &mut self.archived,
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.needs_approval.is_empty()
            && self.to_do.is_empty()
            && self.weekly_available.is_empty()
            && self.weekly_done.is_empty()
            && self.archived.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    fn chore(id: &str, status: ChoreStatus, recurrence: Recurrence) -> Chore {
        Chore {
            id: id.into(),
            title: format!("chore {id}"),
            description: None,
            points: 10,
            assigned_to: "kid".into(),
            created_by: "mom".into(),
            family_id: "fam".into(),
            status,
            recurrence,
            recurrence_day: (recurrence == Recurrence::Weekly).then_some(1),
            completed_at: None,
            approved_at: None,
            available_at: None,
            created_at: t0() - Duration::days(1),
        }
    }

    #[test]
    fn mark_complete_moves_pending_to_pending_approval() {
        let c = chore("a", ChoreStatus::Pending, Recurrence::None);
        let done = mark_complete(&c, t0()).unwrap();
        assert_eq!(done.status, ChoreStatus::PendingApproval);
        assert_eq!(done.completed_at, Some(t0()));
    }

    #[test]
    fn mark_complete_rejects_non_pending() {
        let c = chore("a", ChoreStatus::PendingApproval, Recurrence::None);
        assert_eq!(
            mark_complete(&c, t0()),
            Err(TransitionError::InvalidTransition {
                status: ChoreStatus::PendingApproval,
                action: Action::Complete,
            })
        );
        let archived = chore("b", ChoreStatus::Completed, Recurrence::Daily);
        assert!(mark_complete(&archived, t0()).is_err());
    }

    #[test]
    fn mark_complete_waits_for_availability() {
        let mut c = chore("a", ChoreStatus::Completed, Recurrence::Weekly);
        c.available_at = Some(t0() + Duration::hours(1));
        assert_eq!(
            mark_complete(&c, t0()),
            Err(TransitionError::NotAvailable(t0() + Duration::hours(1)))
        );
        let later = t0() + Duration::hours(1);
        let done = mark_complete(&c, later).unwrap();
        assert_eq!(done.status, ChoreStatus::PendingApproval);
    }

    #[test]
    fn approving_daily_chore_regenerates_a_sibling() {
        let mut c = chore("a", ChoreStatus::PendingApproval, Recurrence::Daily);
        c.description = Some("dishes".into());
        let out = approve(&c, t0()).unwrap();

        assert_eq!(out.chore.status, ChoreStatus::Completed);
        assert_eq!(out.chore.approved_at, Some(t0()));
        assert_eq!(out.chore.available_at, None);

        let next = out.regenerated.expect("daily chore regenerates");
        assert_eq!(next.available_at, Some(t0()));
        assert_eq!(next.title, c.title);
        assert_eq!(next.description, c.description);
        assert_eq!(next.points, c.points);
        assert_eq!(next.assigned_to, c.assigned_to);
        assert_eq!(next.created_by, c.created_by);
        assert_eq!(next.family_id, c.family_id);
        assert_eq!(next.recurrence, Recurrence::Daily);

        let inserted = next.into_chore("a2".into(), t0());
        assert_eq!(inserted.status, ChoreStatus::Pending);
        assert_eq!(inserted.partition(t0()), Some(Partition::ToDo));
    }

    #[test]
    fn approving_weekly_chore_pushes_availability_a_week_out() {
        let c = chore("a", ChoreStatus::PendingApproval, Recurrence::Weekly);
        let out = approve(&c, t0()).unwrap();
        assert!(out.regenerated.is_none());
        assert_eq!(out.chore.status, ChoreStatus::Completed);
        assert_eq!(out.chore.available_at, Some(t0() + Duration::days(7)));
        assert_eq!(out.chore.partition(t0()), Some(Partition::WeeklyDone));
        assert_eq!(
            out.chore.partition(t0() + Duration::days(7)),
            Some(Partition::WeeklyAvailable)
        );
        // Status is left alone on rollover.
        assert_eq!(out.chore.status, ChoreStatus::Completed);
    }

    #[test]
    fn approval_awards_the_chore_points_to_the_assignee() {
        let mut c = chore("a", ChoreStatus::PendingApproval, Recurrence::None);
        c.points = 25;
        let out = approve(&c, t0()).unwrap();
        assert_eq!(
            out.entry,
            NewPointsEntry {
                user_id: "kid".into(),
                chore_id: "a".into(),
                points_earned: 25,
            }
        );
        assert!(out.regenerated.is_none());
        assert_eq!(out.chore.partition(t0()), Some(Partition::Archived));
    }

    #[test]
    fn approve_requires_pending_approval() {
        for status in [ChoreStatus::Pending, ChoreStatus::Completed] {
            let c = chore("a", status, Recurrence::None);
            assert!(matches!(
                approve(&c, t0()),
                Err(TransitionError::InvalidTransition {
                    action: Action::Approve,
                    ..
                })
            ));
        }
    }

    #[test]
    fn reject_returns_to_pending_and_clears_completion() {
        let mut c = chore("a", ChoreStatus::PendingApproval, Recurrence::None);
        c.completed_at = Some(t0());
        let back = reject(&c).unwrap();
        assert_eq!(back.status, ChoreStatus::Pending);
        assert_eq!(back.completed_at, None);
        assert!(reject(&back).is_err());
    }

    #[test]
    fn future_chores_are_never_actionable() {
        let later = Some(t0() + Duration::minutes(5));
        for (status, recurrence) in [
            (ChoreStatus::Pending, Recurrence::None),
            (ChoreStatus::Pending, Recurrence::Daily),
            (ChoreStatus::Pending, Recurrence::Weekly),
            (ChoreStatus::Completed, Recurrence::Weekly),
        ] {
            let mut c = chore("x", status, recurrence);
            c.available_at = later;
            assert!(
                !c.partition(t0()).is_some_and(|p| p.is_actionable()),
                "{status} {recurrence} should not be actionable yet"
            );
            let soon = t0() + Duration::minutes(5);
            assert!(c.partition(soon).is_some_and(|p| p.is_actionable()));
        }
    }

    #[test]
    fn board_partitions_and_orders_newest_first() {
        let now = t0();
        let mut older = chore("older", ChoreStatus::Pending, Recurrence::None);
        older.created_at = now - Duration::days(3);
        let mut newer = chore("newer", ChoreStatus::Pending, Recurrence::Daily);
        newer.created_at = now - Duration::days(1);
        let approval = chore("wait", ChoreStatus::PendingApproval, Recurrence::None);
        let weekly_new = chore("wk1", ChoreStatus::Pending, Recurrence::Weekly);
        let mut weekly_done = chore("wk2", ChoreStatus::Completed, Recurrence::Weekly);
        weekly_done.available_at = Some(now + Duration::days(2));
        let archived = chore("old", ChoreStatus::Completed, Recurrence::Daily);
        let mut other_kid = chore("sib", ChoreStatus::Pending, Recurrence::None);
        other_kid.assigned_to = "sibling".into();

        let all = vec![
            older.clone(),
            newer.clone(),
            approval.clone(),
            weekly_new.clone(),
            weekly_done.clone(),
            archived.clone(),
            other_kid.clone(),
        ];

        let parent = ChoreBoard::build(all.clone(), Role::Parent, &"mom".into(), now, |c| c);
        assert_eq!(parent.needs_approval, vec![approval.clone()]);
        let to_do: Vec<_> = parent.to_do.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(to_do, vec!["newer", "sib", "older"]);
        assert_eq!(parent.weekly_available, vec![weekly_new.clone()]);
        assert_eq!(parent.weekly_done, vec![weekly_done.clone()]);
        assert_eq!(parent.archived, vec![archived.clone()]);

        let kid = ChoreBoard::build(all, Role::Child, &"kid".into(), now, |c| c);
        assert!(kid.to_do.iter().all(|c| c.assigned_to.as_str() == "kid"));
        assert_eq!(kid.to_do.len(), 2);
    }
}
