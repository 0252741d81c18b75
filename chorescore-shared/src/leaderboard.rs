use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::domain::{Chore, ChoreStatus, PointsEntry, Profile, ProfileId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Medal {
    Gold,
    Silver,
    Bronze,
}

impl Medal {
    /// Medal for a zero-based position. Only the top three places win one,
    /// and a child who has not scored yet never does.
    pub fn for_position(index: usize, total_points: i64) -> Option<Medal> {
        if total_points <= 0 {
            return None;
        }
        match index {
            0 => Some(Medal::Gold),
            1 => Some(Medal::Silver),
            2 => Some(Medal::Bronze),
            _ => None,
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            Medal::Gold => "🥇",
            Medal::Silver => "🥈",
            Medal::Bronze => "🥉",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    /// One-based rank.
    pub rank: usize,
    pub profile_id: ProfileId,
    pub name: String,
    pub avatar: String,
    pub total_points: i64,
    pub completed_chores: i64,
    pub medal: Option<Medal>,
}

/// Rank the children among `members`.
///
/// Totals are summed from `ledger` on every call and completed counts come
/// from `chores`, so re-running after a duplicate change event is harmless.
/// Equal totals fall back to name, then id.
pub fn rank(members: &[Profile], ledger: &[PointsEntry], chores: &[Chore]) -> Vec<Standing> {
    let mut totals: HashMap<&ProfileId, i64> = HashMap::new();
    for e in ledger {
        *totals.entry(&e.user_id).or_default() += i64::from(e.points_earned);
    }
    let mut completed: HashMap<&ProfileId, i64> = HashMap::new();
    for c in chores.iter().filter(|c| c.status == ChoreStatus::Completed) {
        *completed.entry(&c.assigned_to).or_default() += 1;
    }

    let mut kids: Vec<&Profile> = members.iter().filter(|p| p.role == Role::Child).collect();
    kids.sort_by(|a, b| {
        let ta = totals.get(&a.id).copied().unwrap_or(0);
        let tb = totals.get(&b.id).copied().unwrap_or(0);
        tb.cmp(&ta)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });

    kids.into_iter()
        .enumerate()
        .map(|(idx, p)| {
            let total_points = totals.get(&p.id).copied().unwrap_or(0);
            Standing {
                rank: idx + 1,
                profile_id: p.id.clone(),
                name: p.name.clone(),
                avatar: p.avatar.clone(),
                total_points,
                completed_chores: completed.get(&p.id).copied().unwrap_or(0),
                medal: Medal::for_position(idx, total_points),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChoreId, Recurrence, now_utc};

    fn kid(id: &str, name: &str) -> Profile {
        Profile {
            id: id.into(),
            name: name.into(),
            avatar: "👧".into(),
            role: Role::Child,
            family_id: Some("fam".into()),
            email: format!("{id}@example.com"),
        }
    }

    fn entry(n: i32, user: &str, pts: i32) -> PointsEntry {
        PointsEntry {
            id: n,
            user_id: user.into(),
            chore_id: ChoreId::from(format!("c{n}")),
            points_earned: pts,
            created_at: now_utc(),
        }
    }

    fn completed_chore(id: &str, who: &str) -> Chore {
        Chore {
            id: id.into(),
            title: id.into(),
            description: None,
            points: 1,
            assigned_to: who.into(),
            created_by: "mom".into(),
            family_id: "fam".into(),
            status: ChoreStatus::Completed,
            recurrence: Recurrence::None,
            recurrence_day: None,
            completed_at: None,
            approved_at: None,
            available_at: None,
            created_at: now_utc(),
        }
    }

    #[test]
    fn ranks_by_total_and_awards_medals() {
        let mut mom = kid("mom", "Mom");
        mom.role = Role::Parent;
        let members = vec![kid("a", "Ann"), kid("b", "Ben"), kid("c", "Cat"), mom];
        let ledger = vec![
            entry(1, "a", 10),
            entry(2, "a", 20),
            entry(3, "a", 5),
            entry(4, "b", 40),
        ];
        let chores = vec![
            completed_chore("x", "a"),
            completed_chore("y", "a"),
            completed_chore("z", "b"),
        ];

        let board = rank(&members, &ledger, &chores);
        assert_eq!(board.len(), 3, "parents are not ranked");

        assert_eq!(board[0].profile_id.as_str(), "b");
        assert_eq!(board[0].total_points, 40);
        assert_eq!(board[0].medal.map(|m| m.glyph()), Some("🥇"));
        assert_eq!(board[0].completed_chores, 1);

        assert_eq!(board[1].profile_id.as_str(), "a");
        assert_eq!(board[1].total_points, 35);
        assert_eq!(board[1].medal.map(|m| m.glyph()), Some("🥈"));
        assert_eq!(board[1].completed_chores, 2);

        assert_eq!(board[2].profile_id.as_str(), "c");
        assert_eq!(board[2].total_points, 0);
        assert_eq!(board[2].rank, 3);
        assert_eq!(board[2].medal, None);
    }

    #[test]
    fn fourth_place_gets_no_medal_and_ties_sort_by_name() {
        let members = vec![
            kid("d", "Dan"),
            kid("c", "Cat"),
            kid("b", "Ben"),
            kid("a", "Ann"),
        ];
        let ledger: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .enumerate()
            .map(|(i, who)| entry(i as i32, who, 5))
            .collect();
        let board = rank(&members, &ledger, &[]);
        let names: Vec<_> = board.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Ann", "Ben", "Cat", "Dan"]);
        assert_eq!(board[2].medal, Some(Medal::Bronze));
        assert_eq!(board[3].medal, None);
    }

    #[test]
    fn nobody_medals_before_scoring() {
        let board = rank(&[kid("a", "Ann"), kid("b", "Ben")], &[], &[]);
        assert!(board.iter().all(|s| s.medal.is_none()));
    }
}
