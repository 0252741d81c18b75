use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Role;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new_random() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name(value)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok($name(s.to_string()))
            }
        }
    };
}

string_id!(ProfileId);
string_id!(FamilyId);
string_id!(ChoreId);

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChoreStatus {
    Pending,
    PendingApproval,
    Completed,
}

impl ChoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChoreStatus::Pending => "pending",
            ChoreStatus::PendingApproval => "pending-approval",
            ChoreStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ChoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChoreStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChoreStatus::Pending),
            "pending-approval" => Ok(ChoreStatus::PendingApproval),
            "completed" => Ok(ChoreStatus::Completed),
            other => Err(UnknownVariant {
                kind: "chore status",
                value: other.to_string(),
            }),
        }
    }
}

/// What happens to a chore after it has been approved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    /// Archived once approved.
    #[default]
    None,
    /// A fresh sibling chore is created on approval.
    Daily,
    /// The same row becomes available again seven days after approval.
    Weekly,
}

impl Recurrence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::None => "none",
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recurrence {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(Recurrence::None),
            "daily" => Ok(Recurrence::Daily),
            "weekly" => Ok(Recurrence::Weekly),
            other => Err(UnknownVariant {
                kind: "recurrence",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chore {
    pub id: ChoreId,
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub assigned_to: ProfileId,
    pub created_by: ProfileId,
    pub family_id: FamilyId,
    pub status: ChoreStatus,
    #[serde(default)]
    pub recurrence: Recurrence,
    /// Day of week, 0 = Sunday. Only set for weekly chores.
    pub recurrence_day: Option<u8>,
    pub completed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    /// `None` means the chore is always available.
    pub available_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to insert a chore. New chores always start `pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChore {
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub assigned_to: ProfileId,
    pub created_by: ProfileId,
    pub family_id: FamilyId,
    pub recurrence: Recurrence,
    pub recurrence_day: Option<u8>,
    pub available_at: Option<DateTime<Utc>>,
}

impl NewChore {
    pub fn into_chore(self, id: ChoreId, created_at: DateTime<Utc>) -> Chore {
        Chore {
            id,
            title: self.title,
            description: self.description,
            points: self.points,
            assigned_to: self.assigned_to,
            created_by: self.created_by,
            family_id: self.family_id,
            status: ChoreStatus::Pending,
            recurrence: self.recurrence,
            recurrence_day: self.recurrence_day,
            completed_at: None,
            approved_at: None,
            available_at: self.available_at,
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    pub avatar: String,
    pub role: Role,
    pub family_id: Option<FamilyId>,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Family {
    pub id: FamilyId,
    pub name: String,
    pub invite_code: String,
    pub created_at: DateTime<Utc>,
}

/// One row of the points ledger. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsEntry {
    pub id: i32,
    pub user_id: ProfileId,
    pub chore_id: ChoreId,
    pub points_earned: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPointsEntry {
    pub user_id: ProfileId,
    pub chore_id: ChoreId,
    pub points_earned: i32,
}

/// Sum of a user's ledger entries. Totals are always derived this way.
pub fn total_points<'a, I>(entries: I, user: &ProfileId) -> i64
where
    I: IntoIterator<Item = &'a PointsEntry>,
{
    entries
        .into_iter()
        .filter(|e| &e.user_id == user)
        .map(|e| i64::from(e.points_earned))
        .sum()
}

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
