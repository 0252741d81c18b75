use chorescore_shared::domain::{
    Chore, ChoreId, Family, FamilyId, PointsEntry, Profile, ProfileId,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;

use super::StorageError;
use crate::storage::schema::{chores, families, points_history, profiles, sessions};

fn utc(dt: NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Insertable)]
#[diesel(table_name = families)]
pub struct FamilyRow {
    pub id: String,
    pub name: String,
    pub invite_code: String,
    pub created_at: NaiveDateTime,
}

impl From<FamilyRow> for Family {
    fn from(row: FamilyRow) -> Self {
        Family {
            id: FamilyId(row.id),
            name: row.name,
            invite_code: row.invite_code,
            created_at: utc(row.created_at),
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = profiles)]
pub struct ProfileRow {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub avatar: String,
    pub role: String,
    pub family_id: Option<String>,
    pub confirmed: bool,
    pub created_at: NaiveDateTime,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = StorageError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse()
            .map_err(|e| StorageError::InvalidInput(format!("profile {}: {e}", row.id)))?;
        Ok(Profile {
            id: ProfileId(row.id),
            name: row.name,
            avatar: row.avatar,
            role,
            family_id: row.family_id.map(FamilyId),
            email: row.email,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = profiles)]
pub struct NewProfileRow<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub name: &'a str,
    pub avatar: &'a str,
    pub role: &'a str,
    pub confirmed: bool,
    pub created_at: NaiveDateTime,
}

/// Only the `Some` fields are written.
#[derive(AsChangeset)]
#[diesel(table_name = profiles)]
pub struct ProfileChanges<'a> {
    pub name: Option<&'a str>,
    pub avatar: Option<&'a str>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = chores)]
#[diesel(treat_none_as_null = true)]
pub struct ChoreRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub assigned_to: String,
    pub created_by: String,
    pub family_id: String,
    pub status: String,
    pub recurrence: String,
    pub recurrence_day: Option<i32>,
    pub completed_at: Option<NaiveDateTime>,
    pub approved_at: Option<NaiveDateTime>,
    pub available_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl TryFrom<ChoreRow> for Chore {
    type Error = StorageError;

    fn try_from(row: ChoreRow) -> Result<Self, Self::Error> {
        let bad = |e: &dyn std::fmt::Display| {
            StorageError::InvalidInput(format!("chore {}: {e}", row.id))
        };
        let status = row.status.parse().map_err(|e| bad(&e))?;
        let recurrence = row.recurrence.parse().map_err(|e| bad(&e))?;
        let recurrence_day = row
            .recurrence_day
            .map(u8::try_from)
            .transpose()
            .map_err(|e| bad(&e))?;
        Ok(Chore {
            id: ChoreId(row.id),
            title: row.title,
            description: row.description,
            points: row.points,
            assigned_to: ProfileId(row.assigned_to),
            created_by: ProfileId(row.created_by),
            family_id: FamilyId(row.family_id),
            status,
            recurrence,
            recurrence_day,
            completed_at: row.completed_at.map(utc),
            approved_at: row.approved_at.map(utc),
            available_at: row.available_at.map(utc),
            created_at: utc(row.created_at),
        })
    }
}

impl From<&Chore> for ChoreRow {
    fn from(c: &Chore) -> Self {
        ChoreRow {
            id: c.id.0.clone(),
            title: c.title.clone(),
            description: c.description.clone(),
            points: c.points,
            assigned_to: c.assigned_to.0.clone(),
            created_by: c.created_by.0.clone(),
            family_id: c.family_id.0.clone(),
            status: c.status.as_str().to_string(),
            recurrence: c.recurrence.as_str().to_string(),
            recurrence_day: c.recurrence_day.map(i32::from),
            completed_at: c.completed_at.map(|t| t.naive_utc()),
            approved_at: c.approved_at.map(|t| t.naive_utc()),
            available_at: c.available_at.map(|t| t.naive_utc()),
            created_at: c.created_at.naive_utc(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = points_history)]
pub struct PointsRow {
    pub id: i32,
    pub user_id: String,
    pub chore_id: String,
    pub points_earned: i32,
    pub created_at: NaiveDateTime,
}

impl From<PointsRow> for PointsEntry {
    fn from(row: PointsRow) -> Self {
        PointsEntry {
            id: row.id,
            user_id: ProfileId(row.user_id),
            chore_id: ChoreId(row.chore_id),
            points_earned: row.points_earned,
            created_at: utc(row.created_at),
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = points_history)]
pub struct NewPointsRow<'a> {
    pub user_id: &'a str,
    pub chore_id: &'a str,
    pub points_earned: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub jti: &'a str,
    pub profile_id: &'a str,
    pub issued_at: NaiveDateTime,
    pub last_used_at: NaiveDateTime,
}
