use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::domain::{Chore, Family, FamilyId, PointsEntry, Profile, ProfileId, Recurrence};

pub mod endpoints;
#[cfg(feature = "rest-client")]
pub mod rest;

pub const API_V1_PREFIX: &str = "/api/v1";

/// Prefix for routes that act on one family's rows.
pub fn family_scope(family_id: &str) -> String {
    format!("{}/family/{}", API_V1_PREFIX, family_id)
}

// Auth
#[derive(Debug, Serialize, Deserialize)]
pub struct SignUpReq {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignUpResp {
    pub profile: Profile,
    /// Absent when the account still needs confirming.
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginReq {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResp {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResp {
    pub profile: Profile,
    pub family: Option<Family>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateProfileReq {
    pub name: Option<String>,
    pub avatar: Option<String>,
}

// Family
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateFamilyReq {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinFamilyReq {
    pub invite_code: String,
}

/// Returned by create/join together with a token that carries the family.
#[derive(Debug, Serialize, Deserialize)]
pub struct FamilyResp {
    pub family: Family,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberDto {
    #[serde(flatten)]
    pub profile: Profile,
    /// Set for children only.
    pub total_points: Option<i64>,
}

// Chores
/// A chore with the assignee and creator resolved to display fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoreDetailDto {
    #[serde(flatten)]
    pub chore: Chore,
    pub assigned: Option<AssigneeRef>,
    pub creator: Option<CreatorRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssigneeRef {
    pub name: String,
    pub avatar: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChoreReq {
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    /// Defaults to the family's first child.
    pub assigned_to: Option<ProfileId>,
    #[serde(default)]
    pub recurrence: Recurrence,
    pub recurrence_day: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveResp {
    pub chore: Chore,
    pub entry: PointsEntry,
    pub regenerated: Option<Chore>,
}

pub type ChoreBoardDto = crate::lifecycle::ChoreBoard<ChoreDetailDto>;

pub type LeaderboardDto = Vec<crate::leaderboard::Standing>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsSummaryDto {
    pub user_id: ProfileId,
    pub total_points: i64,
    pub entries: Vec<PointsEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VersionInfoDto {
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

// Change feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Families,
    Profiles,
    Chores,
    PointsHistory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// "Something in this table changed for this family." Subscribers re-query;
/// the event carries no row data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub family_id: FamilyId,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(table: Table, family_id: &FamilyId, kind: ChangeKind) -> Self {
        Self {
            table,
            family_id: family_id.clone(),
            kind,
        }
    }

    pub fn matches(&self, family_id: &FamilyId, table: Option<Table>) -> bool {
        &self.family_id == family_id && table.is_none_or(|t| t == self.table)
    }
}

/// SSE event names on the change stream.
pub const SSE_EVENT_CHANGE: &str = "change";
/// Sent when the server dropped events for a slow subscriber.
pub const SSE_EVENT_RESYNC: &str = "resync";
