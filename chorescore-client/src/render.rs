//! Plain-text rendering for the terminal.

use std::fmt::Write;

use chorescore_shared::api::{ChoreBoardDto, ChoreDetailDto, MemberDto, PointsSummaryDto};
use chorescore_shared::auth::Role;
use chorescore_shared::domain::Family;
use chorescore_shared::leaderboard::Standing;
use chorescore_shared::lifecycle::Partition;

const EMPTY: &str = "  (nothing here)";

fn section_title(part: Partition, role: Role) -> &'static str {
    match (part, role) {
        (Partition::NeedsApproval, Role::Parent) => "Needs approval",
        (Partition::NeedsApproval, Role::Child) => "Waiting for approval",
        (Partition::ToDo, _) => "To do",
        (Partition::WeeklyAvailable, _) => "Weekly",
        (Partition::WeeklyDone, _) => "Done this week",
        (Partition::Archived, _) => "Done",
    }
}

fn chore_line(d: &ChoreDetailDto, show_assignee: bool) -> String {
    let mut line = format!("  {}  {} (+{})", d.chore.id, d.chore.title, d.chore.points);
    if show_assignee && let Some(a) = &d.assigned {
        let _ = write!(line, "  {} {}", a.avatar, a.name);
    }
    if let Some(desc) = d.chore.description.as_deref() {
        let _ = write!(line, "\n      {desc}");
    }
    line
}

pub fn board(board: &ChoreBoardDto, role: Role) -> String {
    let parts = [
        Partition::NeedsApproval,
        Partition::ToDo,
        Partition::WeeklyAvailable,
        Partition::WeeklyDone,
        Partition::Archived,
    ];
    let mut out = String::new();
    for part in parts {
        let items = board.list(part);
        // Keep the archive out of the way unless it has something.
        if part == Partition::Archived && items.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{}:", section_title(part, role));
        if items.is_empty() {
            let _ = writeln!(out, "{EMPTY}");
        }
        for d in items {
            let _ = writeln!(out, "{}", chore_line(d, role == Role::Parent));
        }
    }
    out
}

pub fn leaderboard(rows: &[Standing]) -> String {
    if rows.is_empty() {
        return format!("Leaderboard:\n{EMPTY}\n");
    }
    let mut out = String::from("Leaderboard:\n");
    for row in rows {
        let medal = row.medal.map(|m| m.glyph()).unwrap_or("  ");
        let _ = writeln!(
            out,
            "{medal} {}. {} {}  {} pts  {} chores",
            row.rank, row.avatar, row.name, row.total_points, row.completed_chores
        );
    }
    out
}

pub fn members(family: Option<&Family>, members: &[MemberDto]) -> String {
    let mut out = String::new();
    if let Some(f) = family {
        let _ = writeln!(out, "{} (invite code {})", f.name, f.invite_code);
    }
    for m in members {
        let p = &m.profile;
        match m.total_points {
            Some(total) => {
                let _ = writeln!(out, "  {} {} [{}] {} pts", p.avatar, p.name, p.role, total);
            }
            None => {
                let _ = writeln!(out, "  {} {} [{}]", p.avatar, p.name, p.role);
            }
        }
    }
    out
}

pub fn points(summary: &PointsSummaryDto) -> String {
    let mut out = format!("Total: {} pts\n", summary.total_points);
    for e in &summary.entries {
        let _ = writeln!(
            out,
            "  {}  +{}  ({})",
            e.created_at.format("%Y-%m-%d %H:%M"),
            e.points_earned,
            e.chore_id
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::tests::{family_view, t0};
    use chorescore_shared::leaderboard::Medal;

    fn standing(rank: usize, name: &str, total: i64, medal: Option<Medal>) -> Standing {
        Standing {
            rank,
            profile_id: name.to_lowercase().into(),
            name: name.into(),
            avatar: "👧".into(),
            total_points: total,
            completed_chores: 1,
            medal,
        }
    }

    #[test]
    fn leaderboard_shows_medals_only_where_earned() {
        let text = leaderboard(&[
            standing(1, "Ben", 40, Some(Medal::Gold)),
            standing(2, "Ann", 35, Some(Medal::Silver)),
            standing(3, "Cat", 0, None),
        ]);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Leaderboard:");
        assert!(lines[1].starts_with("🥇 1."));
        assert!(lines[1].contains("Ben") && lines[1].contains("40 pts"));
        assert!(lines[2].starts_with("🥈 2."));
        assert!(lines[3].starts_with("   3."));
        assert!(!text.contains('🥉'));
    }

    #[test]
    fn parents_see_assignees_and_children_do_not() {
        let parent = board(&family_view(Role::Parent, "mom").board(t0()), Role::Parent);
        assert!(parent.starts_with("Needs approval:\n"));
        assert!(parent.contains("chore c2 (+10)  👧 Ben"));
        assert!(!parent.contains("Done:"));

        let child = board(&family_view(Role::Child, "ann").board(t0()), Role::Child);
        assert!(child.starts_with("Waiting for approval:\n"));
        assert!(child.contains("chore c3 (+10)\n"));
        assert!(!child.contains("Ben"));
        assert!(child.contains("Weekly:\n  (nothing here)\n"));
    }

    #[test]
    fn member_totals_only_for_children() {
        let view = family_view(Role::Parent, "mom");
        let text = members(None, view.members());
        assert!(text.contains("Ann [child] 5 pts"));
        assert!(text.contains("Mom [parent]\n"));
    }
}
