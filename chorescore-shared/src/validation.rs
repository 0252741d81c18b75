//! Input checks that run before any request leaves the client. The server
//! repeats them on the way in.

use chrono::{DateTime, Datelike, Utc};

use crate::api::CreateChoreReq;
use crate::auth::Role;
use crate::domain::{FamilyId, NewChore, Profile, ProfileId, Recurrence};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("points must be a whole number, got {0:?}")]
    PointsNotNumeric(String),
    #[error("points must not be negative")]
    NegativePoints,
    #[error("no child available to assign this chore to")]
    NoAssignee,
    #[error("{0} is not a child in this family")]
    UnknownAssignee(ProfileId),
    #[error("day of week must be 0-6, got {0}")]
    DayOutOfRange(u8),
    #[error("day of week only applies to weekly chores")]
    DayWithoutWeekly,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password must be at least {} characters", MIN_PASSWORD_LEN)]
    PasswordTooShort,
}

fn required(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::Required(field))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Parse a points field as typed by a user.
pub fn parse_points(input: &str) -> Result<i32, ValidationError> {
    let trimmed = input.trim();
    let value: i32 = trimmed
        .parse()
        .map_err(|_| ValidationError::PointsNotNumeric(trimmed.to_string()))?;
    if value < 0 {
        return Err(ValidationError::NegativePoints);
    }
    Ok(value)
}

/// Resolve who a new chore goes to. Without an explicit choice the first
/// child wins.
pub fn pick_assignee(
    requested: Option<&ProfileId>,
    members: &[Profile],
) -> Result<ProfileId, ValidationError> {
    let mut children = members.iter().filter(|m| m.role == Role::Child);
    match requested {
        Some(id) => children
            .find(|m| &m.id == id)
            .map(|m| m.id.clone())
            .ok_or_else(|| ValidationError::UnknownAssignee(id.clone())),
        None => children
            .next()
            .map(|m| m.id.clone())
            .ok_or(ValidationError::NoAssignee),
    }
}

/// Check a create request and turn it into an insertable chore.
///
/// Weekly chores without a day default to the weekday of `now`.
pub fn new_chore(
    req: &CreateChoreReq,
    created_by: &ProfileId,
    family_id: &FamilyId,
    members: &[Profile],
    now: DateTime<Utc>,
) -> Result<NewChore, ValidationError> {
    let title = required(&req.title, "title")?;
    if req.points < 0 {
        return Err(ValidationError::NegativePoints);
    }
    let assigned_to = pick_assignee(req.assigned_to.as_ref(), members)?;
    let recurrence_day = match (req.recurrence, req.recurrence_day) {
        (_, Some(day)) if day > 6 => return Err(ValidationError::DayOutOfRange(day)),
        (Recurrence::Weekly, Some(day)) => Some(day),
        (Recurrence::Weekly, None) => Some(now.weekday().num_days_from_sunday() as u8),
        (_, Some(_)) => return Err(ValidationError::DayWithoutWeekly),
        (_, None) => None,
    };
    let description = req
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    Ok(NewChore {
        title,
        description,
        points: req.points,
        assigned_to,
        created_by: created_by.clone(),
        family_id: family_id.clone(),
        recurrence: req.recurrence,
        recurrence_day,
        available_at: None,
    })
}

pub fn family_name(input: &str) -> Result<String, ValidationError> {
    required(input, "family name")
}

pub fn profile_name(input: &str) -> Result<String, ValidationError> {
    required(input, "name")
}

pub fn invite_code(input: &str) -> Result<String, ValidationError> {
    let code = required(input, "invite code")?;
    Ok(crate::invite::normalize(&code))
}

/// Trimmed, lowercased address with a plausible shape.
pub fn email(input: &str) -> Result<String, ValidationError> {
    let addr = required(input, "email")?.to_lowercase();
    let Some((local, domain)) = addr.split_once('@') else {
        return Err(ValidationError::InvalidEmail);
    };
    if local.is_empty()
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(addr)
}

pub fn password(input: &str) -> Result<(), ValidationError> {
    if input.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn member(id: &str, role: Role) -> Profile {
        Profile {
            id: id.into(),
            name: id.to_uppercase(),
            avatar: role.default_avatar().into(),
            role,
            family_id: Some("fam".into()),
            email: format!("{id}@example.com"),
        }
    }

    fn req(title: &str, points: i32) -> CreateChoreReq {
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
    fn points_must_be_numeric_and_non_negative() {
        assert_eq!(parse_points(" 20 "), Ok(20));
        assert_eq!(parse_points("0"), Ok(0));
        assert_eq!(
            parse_points("lots"),
            Err(ValidationError::PointsNotNumeric("lots".into()))
        );
        assert_eq!(parse_points("-5"), Err(ValidationError::NegativePoints));
    }

    #[test]
    fn assignee_defaults_to_first_child() {
        let members = vec![member("mom", Role::Parent), member("kid", Role::Child)];
        assert_eq!(pick_assignee(None, &members), Ok("kid".into()));
        assert_eq!(
            pick_assignee(Some(&"mom".into()), &members),
            Err(ValidationError::UnknownAssignee("mom".into()))
        );
        assert_eq!(
            pick_assignee(None, &members[..1]),
            Err(ValidationError::NoAssignee)
        );
    }

    #[test]
    fn new_chore_trims_and_validates() {
        let members = vec![member("kid", Role::Child)];
        let now = Utc.with_ymd_and_hms(2025, 3, 12, 8, 0, 0).unwrap(); // a Wednesday
        let mut r = req("  Dishes  ", 15);
        r.description = Some("   ".into());
        let chore = new_chore(&r, &"mom".into(), &"fam".into(), &members, now).unwrap();
        assert_eq!(chore.title, "Dishes");
        assert_eq!(chore.description, None);
        assert_eq!(chore.assigned_to.as_str(), "kid");
        assert_eq!(chore.recurrence_day, None);

        r.recurrence = Recurrence::Weekly;
        let weekly = new_chore(&r, &"mom".into(), &"fam".into(), &members, now).unwrap();
        assert_eq!(weekly.recurrence_day, Some(3));

        r.recurrence = Recurrence::Daily;
        r.recurrence_day = Some(2);
        assert_eq!(
            new_chore(&r, &"mom".into(), &"fam".into(), &members, now),
            Err(ValidationError::DayWithoutWeekly)
        );
        r.recurrence = Recurrence::Weekly;
        r.recurrence_day = Some(9);
        assert_eq!(
            new_chore(&r, &"mom".into(), &"fam".into(), &members, now),
            Err(ValidationError::DayOutOfRange(9))
        );
        assert_eq!(
            new_chore(&req("   ", 1), &"mom".into(), &"fam".into(), &members, now),
            Err(ValidationError::Required("title"))
        );
        assert_eq!(
            new_chore(&req("x", -1), &"mom".into(), &"fam".into(), &members, now),
            Err(ValidationError::NegativePoints)
        );
    }

    #[test]
    fn email_shape() {
        assert_eq!(email(" Mom@Example.COM "), Ok("mom@example.com".into()));
        assert_eq!(email("nope"), Err(ValidationError::InvalidEmail));
        assert_eq!(email("a@b"), Err(ValidationError::InvalidEmail));
        assert_eq!(email(""), Err(ValidationError::Required("email")));
    }
}
