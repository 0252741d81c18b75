pub mod models;
pub mod schema;

use chorescore_shared::auth::Role;
use chorescore_shared::domain::{
    Chore, ChoreId, Family, FamilyId, NewChore, PointsEntry, Profile, ProfileId,
};
use chorescore_shared::invite;
use chorescore_shared::lifecycle::{self, TransitionError};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use models::{
    ChoreRow, FamilyRow, NewPointsRow, NewProfileRow, NewSession, PointsRow, ProfileChanges,
    ProfileRow,
};
use tracing::trace;

/// Attempts at drawing an unused invite code before giving up.
const INVITE_CODE_ATTEMPTS: usize = 16;

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The caller supplied invalid input, or a stored row failed to decode.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The requested lifecycle step does not apply to the row as stored.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid invite code")]
    InvalidInviteCode,

    /// Only the assignee may mark a chore done.
    #[error("chore is assigned to someone else")]
    NotAssignee,
}

/// Everything needed to register a profile.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub confirmed: bool,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub profile: Profile,
    pub password_hash: String,
    pub confirmed: bool,
}

/// Rows written by one approval.
#[derive(Debug, Clone)]
pub struct Approved {
    pub chore: Chore,
    pub entry: PointsEntry,
    pub regenerated: Option<Chore>,
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    // Profiles

    pub async fn create_profile(
        &self,
        account: NewAccount,
        now: DateTime<Utc>,
    ) -> Result<Profile, StorageError> {
        use schema::profiles::dsl as p;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Profile, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Profile, StorageError> {
                let taken: i64 = p::profiles
                    .filter(p::email.eq(&account.email))
                    .count()
                    .get_result(conn)?;
                if taken > 0 {
                    return Err(StorageError::Conflict("email already registered".into()));
                }
                let id = ProfileId::new_random();
                let row = NewProfileRow {
                    id: id.as_str(),
                    email: &account.email,
                    password_hash: &account.password_hash,
                    name: &account.name,
                    avatar: account.role.default_avatar(),
                    role: account.role.as_str(),
                    confirmed: account.confirmed,
                    created_at: now.naive_utc(),
                };
                diesel::insert_into(p::profiles).values(&row).execute(conn)?;
                load_profile(conn, id.as_str())
            })
        })
        .await?
    }

    pub async fn find_credentials(&self, email: &str) -> Result<Option<Credentials>, StorageError> {
        use schema::profiles::dsl as p;
        let pool = self.pool.clone();
        let email = email.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Credentials>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let row = p::profiles
                .filter(p::email.eq(&email))
                .select(ProfileRow::as_select())
                .first(&mut conn)
                .optional()?;
            row.map(|row| -> Result<Credentials, StorageError> {
                let password_hash = row.password_hash.clone();
                let confirmed = row.confirmed;
                Ok(Credentials {
                    profile: Profile::try_from(row)?,
                    password_hash,
                    confirmed,
                })
            })
            .transpose()
        })
        .await?
    }

    pub async fn get_profile(&self, id: &ProfileId) -> Result<Option<Profile>, StorageError> {
        let pool = self.pool.clone();
        let id = id.0.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Profile>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            match load_profile(&mut conn, &id) {
                Ok(p) => Ok(Some(p)),
                Err(StorageError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await?
    }

    pub async fn update_profile(
        &self,
        id: &ProfileId,
        name: Option<String>,
        avatar: Option<String>,
    ) -> Result<Profile, StorageError> {
        use schema::profiles::dsl as p;
        let pool = self.pool.clone();
        let id = id.0.clone();
        tokio::task::spawn_blocking(move || -> Result<Profile, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            if name.is_some() || avatar.is_some() {
                let changes = ProfileChanges {
                    name: name.as_deref(),
                    avatar: avatar.as_deref(),
                };
                let n = diesel::update(p::profiles.find(&id))
                    .set(&changes)
                    .execute(&mut conn)?;
                if n == 0 {
                    return Err(StorageError::NotFound("profile"));
                }
            }
            load_profile(&mut conn, &id)
        })
        .await?
    }

    /// Marks an account as confirmed. Returns false for an unknown email.
    pub async fn confirm_profile(&self, email: &str) -> Result<bool, StorageError> {
        use schema::profiles::dsl as p;
        let pool = self.pool.clone();
        let email = email.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let n = diesel::update(p::profiles.filter(p::email.eq(&email)))
                .set(p::confirmed.eq(true))
                .execute(&mut conn)?;
            Ok(n > 0)
        })
        .await?
    }

    /// Family members ordered by role, then name.
    pub async fn list_members(&self, family: &FamilyId) -> Result<Vec<Profile>, StorageError> {
        use schema::profiles::dsl as p;
        let pool = self.pool.clone();
        let fid = family.0.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Profile>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            p::profiles
                .filter(p::family_id.eq(&fid))
                .order((p::role.asc(), p::name.asc()))
                .select(ProfileRow::as_select())
                .load(&mut conn)?
                .into_iter()
                .map(Profile::try_from)
                .collect()
        })
        .await?
    }

    // Families

    pub async fn get_family(&self, id: &FamilyId) -> Result<Option<Family>, StorageError> {
        use schema::families::dsl as f;
        let pool = self.pool.clone();
        let id = id.0.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Family>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(f::families
                .find(&id)
                .select(FamilyRow::as_select())
                .first(&mut conn)
                .optional()?
                .map(Family::from))
        })
        .await?
    }

    /// Creates a family with a fresh invite code and attaches `owner` to it
    /// in the same transaction.
    pub async fn create_family(
        &self,
        owner: &ProfileId,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Family, StorageError> {
        use schema::{families::dsl as f, profiles::dsl as p};
        let pool = self.pool.clone();
        let owner = owner.0.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || -> Result<Family, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Family, StorageError> {
                let profile = load_profile(conn, &owner)?;
                if profile.family_id.is_some() {
                    return Err(StorageError::Conflict(
                        "profile already belongs to a family".into(),
                    ));
                }
                let row = FamilyRow {
                    id: FamilyId::new_random().0,
                    name,
                    invite_code: unused_invite_code(conn)?,
                    created_at: now.naive_utc(),
                };
                diesel::insert_into(f::families).values(&row).execute(conn)?;
                diesel::update(p::profiles.find(&owner))
                    .set(p::family_id.eq(Some(&row.id)))
                    .execute(conn)?;
                trace!(family_id = %row.id, owner = %owner, "family created");
                Ok(Family::from(row))
            })
        })
        .await?
    }

    /// Looks up a family by invite code (case-insensitive) and attaches
    /// `member`. Nothing changes when the code is unknown.
    pub async fn join_family(
        &self,
        member: &ProfileId,
        code: &str,
    ) -> Result<Family, StorageError> {
        use schema::{families::dsl as f, profiles::dsl as p};
        let pool = self.pool.clone();
        let member = member.0.clone();
        let code = invite::normalize(code);
        tokio::task::spawn_blocking(move || -> Result<Family, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Family, StorageError> {
                let family = f::families
                    .filter(f::invite_code.eq(&code))
                    .select(FamilyRow::as_select())
                    .first(conn)
                    .optional()?
                    .ok_or(StorageError::InvalidInviteCode)?;
                let profile = load_profile(conn, &member)?;
                if profile.family_id.is_some() {
                    return Err(StorageError::Conflict(
                        "profile already belongs to a family".into(),
                    ));
                }
                diesel::update(p::profiles.find(&member))
                    .set(p::family_id.eq(Some(&family.id)))
                    .execute(conn)?;
                Ok(Family::from(family))
            })
        })
        .await?
    }

    // Chores

    /// Newest first.
    pub async fn list_chores(&self, family: &FamilyId) -> Result<Vec<Chore>, StorageError> {
        use schema::chores::dsl as c;
        let pool = self.pool.clone();
        let fid = family.0.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Chore>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            c::chores
                .filter(c::family_id.eq(&fid))
                .order((c::created_at.desc(), c::id.asc()))
                .select(ChoreRow::as_select())
                .load(&mut conn)?
                .into_iter()
                .map(Chore::try_from)
                .collect()
        })
        .await?
    }

    pub async fn get_chore(
        &self,
        family: &FamilyId,
        id: &ChoreId,
    ) -> Result<Option<Chore>, StorageError> {
        let pool = self.pool.clone();
        let fid = family.0.clone();
        let id = id.0.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Chore>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            match load_chore(&mut conn, &fid, &id) {
                Ok(c) => Ok(Some(c)),
                Err(StorageError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await?
    }

    pub async fn insert_chore(
        &self,
        new: NewChore,
        now: DateTime<Utc>,
    ) -> Result<Chore, StorageError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Chore, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            insert_chore_row(&mut conn, new, now)
        })
        .await?
    }

    /// Ledger rows that reference the chore are left alone.
    pub async fn delete_chore(
        &self,
        family: &FamilyId,
        id: &ChoreId,
    ) -> Result<bool, StorageError> {
        use schema::chores::dsl as c;
        let pool = self.pool.clone();
        let fid = family.0.clone();
        let id = id.0.clone();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let n = diesel::delete(c::chores.filter(c::id.eq(&id)).filter(c::family_id.eq(&fid)))
                .execute(&mut conn)?;
            Ok(n > 0)
        })
        .await?
    }

    /// Marks the chore done on behalf of `by`, who must be its assignee.
    pub async fn complete_chore(
        &self,
        family: &FamilyId,
        id: &ChoreId,
        by: &ProfileId,
        now: DateTime<Utc>,
    ) -> Result<Chore, StorageError> {
        let by = by.clone();
        self.transition(family, id, move |chore| {
            if chore.assigned_to != by {
                return Err(StorageError::NotAssignee);
            }
            Ok(lifecycle::mark_complete(chore, now)?)
        })
        .await
    }

    pub async fn reject_chore(
        &self,
        family: &FamilyId,
        id: &ChoreId,
    ) -> Result<Chore, StorageError> {
        self.transition(family, id, |chore| Ok(lifecycle::reject(chore)?))
            .await
    }

    /// Applies an approval: status change, ledger entry, and either the
    /// regenerated daily chore or the pushed-out weekly date, all or nothing.
    pub async fn approve_chore(
        &self,
        family: &FamilyId,
        id: &ChoreId,
        now: DateTime<Utc>,
    ) -> Result<Approved, StorageError> {
        use schema::points_history::dsl as ph;
        let pool = self.pool.clone();
        let fid = family.0.clone();
        let id = id.0.clone();
        tokio::task::spawn_blocking(move || -> Result<Approved, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Approved, StorageError> {
                let current = load_chore(conn, &fid, &id)?;
                let approval = lifecycle::approve(&current, now)?;
                save_chore(conn, &approval.chore)?;
                let entry: PointsRow = diesel::insert_into(ph::points_history)
                    .values(&NewPointsRow {
                        user_id: approval.entry.user_id.as_str(),
                        chore_id: approval.entry.chore_id.as_str(),
                        points_earned: approval.entry.points_earned,
                        created_at: now.naive_utc(),
                    })
                    .returning(PointsRow::as_returning())
                    .get_result(conn)?;
                let regenerated = approval
                    .regenerated
                    .map(|next| insert_chore_row(conn, next, now))
                    .transpose()?;
                Ok(Approved {
                    chore: approval.chore,
                    entry: entry.into(),
                    regenerated,
                })
            })
        })
        .await?
    }

    /// Loads a chore, runs `step` on it and saves the result, inside one
    /// immediate transaction.
    async fn transition<F>(
        &self,
        family: &FamilyId,
        id: &ChoreId,
        step: F,
    ) -> Result<Chore, StorageError>
    where
        F: FnOnce(&Chore) -> Result<Chore, StorageError> + Send + 'static,
    {
        let pool = self.pool.clone();
        let fid = family.0.clone();
        let id = id.0.clone();
        tokio::task::spawn_blocking(move || -> Result<Chore, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Chore, StorageError> {
                let current = load_chore(conn, &fid, &id)?;
                let next = step(&current)?;
                save_chore(conn, &next)?;
                Ok(next)
            })
        })
        .await?
    }

    // Points ledger

    /// All ledger rows for current members of `family`, oldest first.
    pub async fn list_family_points(
        &self,
        family: &FamilyId,
    ) -> Result<Vec<PointsEntry>, StorageError> {
        use schema::{points_history::dsl as ph, profiles::dsl as p};
        let pool = self.pool.clone();
        let fid = family.0.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<PointsEntry>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let member_ids: Vec<String> = p::profiles
                .filter(p::family_id.eq(&fid))
                .select(p::id)
                .load(&mut conn)?;
            Ok(ph::points_history
                .filter(ph::user_id.eq_any(member_ids))
                .order(ph::id.asc())
                .select(PointsRow::as_select())
                .load(&mut conn)?
                .into_iter()
                .map(PointsEntry::from)
                .collect())
        })
        .await?
    }

    pub async fn list_user_points(
        &self,
        user: &ProfileId,
    ) -> Result<Vec<PointsEntry>, StorageError> {
        use schema::points_history::dsl as ph;
        let pool = self.pool.clone();
        let uid = user.0.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<PointsEntry>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(ph::points_history
                .filter(ph::user_id.eq(&uid))
                .order(ph::id.asc())
                .select(PointsRow::as_select())
                .load(&mut conn)?
                .into_iter()
                .map(PointsEntry::from)
                .collect())
        })
        .await?
    }

    // Sessions

    pub async fn create_session(
        &self,
        jti_: &str,
        profile: &ProfileId,
    ) -> Result<(), StorageError> {
        use schema::sessions;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        let pid = profile.0.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let now = Utc::now().naive_utc();
            let new = NewSession {
                jti: &j,
                profile_id: &pid,
                issued_at: now,
                last_used_at: now,
            };
            diesel::insert_into(sessions::table)
                .values(&new)
                .on_conflict_do_nothing()
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    pub async fn delete_session(&self, jti_: &str) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let n = diesel::delete(sessions.filter(jti.eq(&j))).execute(&mut conn)?;
            Ok(n > 0)
        })
        .await?
    }

    /// Bumps `last_used_at` if the session exists and was used after
    /// `cutoff`. Returns false otherwise.
    pub async fn touch_session_with_cutoff(
        &self,
        jti_: &str,
        cutoff: chrono::NaiveDateTime,
    ) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let now = Utc::now().naive_utc();
            let updated =
                diesel::update(sessions.filter(jti.eq(&j)).filter(last_used_at.ge(cutoff)))
                    .set(last_used_at.eq(now))
                    .execute(&mut conn)?;
            Ok(updated > 0)
        })
        .await?
    }
}

fn load_profile(conn: &mut SqliteConnection, id: &str) -> Result<Profile, StorageError> {
    use schema::profiles::dsl as p;
    let row = p::profiles
        .find(id)
        .select(ProfileRow::as_select())
        .first(conn)
        .optional()?
        .ok_or(StorageError::NotFound("profile"))?;
    Profile::try_from(row)
}

fn load_chore(conn: &mut SqliteConnection, family: &str, id: &str) -> Result<Chore, StorageError> {
    use schema::chores::dsl as c;
    let row = c::chores
        .filter(c::id.eq(id))
        .filter(c::family_id.eq(family))
        .select(ChoreRow::as_select())
        .first(conn)
        .optional()?
        .ok_or(StorageError::NotFound("chore"))?;
    Chore::try_from(row)
}

fn save_chore(conn: &mut SqliteConnection, chore: &Chore) -> Result<(), StorageError> {
    use schema::chores::dsl as c;
    let row = ChoreRow::from(chore);
    diesel::update(c::chores.find(&row.id))
        .set(&row)
        .execute(conn)?;
    Ok(())
}

fn insert_chore_row(
    conn: &mut SqliteConnection,
    new: NewChore,
    now: DateTime<Utc>,
) -> Result<Chore, StorageError> {
    use schema::chores::dsl as c;
    let chore = new.into_chore(ChoreId::new_random(), now);
    diesel::insert_into(c::chores)
        .values(ChoreRow::from(&chore))
        .execute(conn)?;
    Ok(chore)
}

fn unused_invite_code(conn: &mut SqliteConnection) -> Result<String, StorageError> {
    use schema::families::dsl as f;
    for _ in 0..INVITE_CODE_ATTEMPTS {
        let code = invite::generate();
        let taken: i64 = f::families.filter(f::invite_code.eq(&code)).count().get_result(conn)?;
        if taken == 0 {
            return Ok(code);
        }
    }
    Err(StorageError::Conflict(
        "could not allocate a unique invite code".into(),
    ))
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // WAL for concurrent readers during writes; busy_timeout so writers queue
    // instead of failing with SQLITE_BUSY.
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    diesel::sql_query("PRAGMA foreign_keys=ON;").execute(conn)?;
    Ok(())
}
