use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::{API_V1_PREFIX, Table, family_scope};

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

fn family_path(base: &str, family_id: &str, rest: &str) -> String {
    base_join(base, &format!("{}/{}", family_scope(&enc(family_id)), rest))
}

pub fn version(base: &str) -> String {
    base_join(base, &format!("{}/version", API_V1_PREFIX))
}

pub fn auth_signup(base: &str) -> String {
    base_join(base, &format!("{}/auth/signup", API_V1_PREFIX))
}
pub fn auth_login(base: &str) -> String {
    base_join(base, &format!("{}/auth/login", API_V1_PREFIX))
}
pub fn auth_renew(base: &str) -> String {
    base_join(base, &format!("{}/auth/renew", API_V1_PREFIX))
}
pub fn auth_logout(base: &str) -> String {
    base_join(base, &format!("{}/auth/logout", API_V1_PREFIX))
}

pub fn me(base: &str) -> String {
    base_join(base, &format!("{}/me", API_V1_PREFIX))
}

pub fn families(base: &str) -> String {
    base_join(base, &format!("{}/families", API_V1_PREFIX))
}
pub fn families_join(base: &str) -> String {
    base_join(base, &format!("{}/families/join", API_V1_PREFIX))
}

pub fn members(base: &str, family_id: &str) -> String {
    family_path(base, family_id, "members")
}
pub fn chores(base: &str, family_id: &str) -> String {
    family_path(base, family_id, "chores")
}
pub fn chore_board(base: &str, family_id: &str) -> String {
    family_path(base, family_id, "chores/board")
}
pub fn chore(base: &str, family_id: &str, chore_id: &str) -> String {
    family_path(base, family_id, &format!("chores/{}", enc(chore_id)))
}
pub fn chore_complete(base: &str, family_id: &str, chore_id: &str) -> String {
    let action = format!("chores/{}/complete", enc(chore_id));
    family_path(base, family_id, &action)
}
pub fn chore_approve(base: &str, family_id: &str, chore_id: &str) -> String {
    let action = format!("chores/{}/approve", enc(chore_id));
    family_path(base, family_id, &action)
}
pub fn chore_reject(base: &str, family_id: &str, chore_id: &str) -> String {
    family_path(base, family_id, &format!("chores/{}/reject", enc(chore_id)))
}
pub fn leaderboard(base: &str, family_id: &str) -> String {
    family_path(base, family_id, "leaderboard")
}
pub fn points(base: &str, family_id: &str, user_id: &str) -> String {
    family_path(base, family_id, &format!("points/{}", enc(user_id)))
}

/// SSE change stream. Browsers' `EventSource` cannot set headers, so the
/// token travels in the query string.
pub fn events(base: &str, family_id: &str, token: &str, table: Option<Table>) -> String {
    let query = format!("events?token={}", enc(token));
    let mut url = family_path(base, family_id, &query);
    if let Some(t) = table {
        url.push_str("&table=");
        url.push_str(table_param(t));
    }
    url
}

pub fn table_param(table: Table) -> &'static str {
    match table {
        Table::Families => "families",
        Table::Profiles => "profiles",
        Table::Chores => "chores",
        Table::PointsHistory => "points_history",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_without_double_slashes() {
        assert_eq!(
            chores("http://localhost:5151/", "fam"),
            "http://localhost:5151/api/v1/family/fam/chores"
        );
        assert_eq!(me("http://h"), "http://h/api/v1/me");
    }

    #[test]
    fn encodes_path_segments() {
        assert_eq!(
            chore_complete("http://h", "f 1", "c/2"),
            "http://h/api/v1/family/f%201/chores/c%2F2/complete"
        );
        assert_eq!(
            events("http://h", "fam", "a.b", Some(Table::PointsHistory)),
            "http://h/api/v1/family/fam/events?token=a%2Eb&table=points_history"
        );
    }
}
