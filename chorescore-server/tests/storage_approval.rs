use chorescore_server::storage::{NewAccount, StorageError, Store};
use chorescore_shared::auth::Role;
use chorescore_shared::domain::{Chore, ChoreStatus, Family, NewChore, Profile, Recurrence};
use chrono::{DateTime, Utc};
use diesel::prelude::*;

struct Fixture {
    store: Store,
    db_path: String,
    family: Family,
    kid: Profile,
    parent: Profile,
    _tempdir: tempfile::TempDir,
}

async fn fixture(now: DateTime<Utc>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("approve.db").to_string_lossy().to_string();
    let store = Store::connect_sqlite(&db_path).await.unwrap();
    let account = |email: &str, name: &str, role| NewAccount {
        email: email.into(),
        password_hash: "x".into(),
        name: name.into(),
        role,
        confirmed: true,
    };
    let parent = store
        .create_profile(account("mom@example.com", "Mom", Role::Parent), now)
        .await
        .unwrap();
    let kid = store
        .create_profile(account("ann@example.com", "Ann", Role::Child), now)
        .await
        .unwrap();
    let family = store.create_family(&parent.id, "Home", now).await.unwrap();
    store.join_family(&kid.id, &family.invite_code).await.unwrap();
    Fixture {
        store,
        db_path,
        family,
        kid,
        parent,
        _tempdir: dir,
    }
}

impl Fixture {
    /// Inserts a chore for the kid, marks it done and returns the stored row.
    async fn awaiting_approval(
        &self,
        title: &str,
        recurrence: Recurrence,
        now: DateTime<Utc>,
    ) -> Chore {
        let chore = self
            .store
            .insert_chore(
                NewChore {
                    title: title.into(),
                    description: None,
                    points: 10,
                    assigned_to: self.kid.id.clone(),
                    created_by: self.parent.id.clone(),
                    family_id: self.family.id.clone(),
                    recurrence,
                    recurrence_day: (recurrence == Recurrence::Weekly).then_some(6),
                    available_at: None,
                },
                now,
            )
            .await
            .unwrap();
        self.store
            .complete_chore(&self.family.id, &chore.id, &self.kid.id, now)
            .await
            .unwrap();
        self.store
            .get_chore(&self.family.id, &chore.id)
            .await
            .unwrap()
            .unwrap()
    }

    fn raw_sql(&self, sql: &str) {
        let mut conn = SqliteConnection::establish(&self.db_path).unwrap();
        diesel::sql_query(sql).execute(&mut conn).unwrap();
    }
}

#[tokio::test]
async fn approval_is_all_or_nothing() {
    let now = Utc::now();
    let fx = fixture(now).await;
    let daily = fx.awaiting_approval("Dishes", Recurrence::Daily, now).await;
    let weekly = fx.awaiting_approval("Lawn", Recurrence::Weekly, now).await;

    fx.raw_sql(
        "CREATE TRIGGER ledger_down BEFORE INSERT ON points_history \
         BEGIN SELECT RAISE(ABORT, 'ledger down'); END;",
    );

    for chore in [&daily, &weekly] {
        let err = fx
            .store
            .approve_chore(&fx.family.id, &chore.id, now)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Database(_)), "{err}");
        assert!(err.to_string().contains("ledger down"), "{err}");

        let stored = fx
            .store
            .get_chore(&fx.family.id, &chore.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&stored, chore, "{} must be untouched", chore.title);
        assert_eq!(stored.status, ChoreStatus::PendingApproval);
        assert_eq!(stored.approved_at, None);
        assert_eq!(stored.available_at, None);
    }
    // No regenerated daily sibling and no ledger rows.
    assert_eq!(fx.store.list_chores(&fx.family.id).await.unwrap().len(), 2);
    let ledger = fx.store.list_user_points(&fx.kid.id).await.unwrap();
    assert!(ledger.is_empty());

    fx.raw_sql("DROP TRIGGER ledger_down;");

    let approved = fx
        .store
        .approve_chore(&fx.family.id, &daily.id, now)
        .await
        .unwrap();
    assert_eq!(approved.chore.status, ChoreStatus::Completed);
    assert!(approved.regenerated.is_some());
    assert_eq!(fx.store.list_chores(&fx.family.id).await.unwrap().len(), 3);
    let ledger = fx.store.list_user_points(&fx.kid.id).await.unwrap();
    assert_eq!(ledger.len(), 1);
}

#[tokio::test]
async fn only_the_assignee_completes() {
    let now = Utc::now();
    let fx = fixture(now).await;
    let chore = fx
        .store
        .insert_chore(
            NewChore {
                title: "Trash".into(),
                description: None,
                points: 5,
                assigned_to: fx.kid.id.clone(),
                created_by: fx.parent.id.clone(),
                family_id: fx.family.id.clone(),
                recurrence: Recurrence::None,
                recurrence_day: None,
                available_at: None,
            },
            now,
        )
        .await
        .unwrap();

    let err = fx
        .store
        .complete_chore(&fx.family.id, &chore.id, &fx.parent.id, now)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotAssignee), "{err}");
    let stored = fx
        .store
        .get_chore(&fx.family.id, &chore.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ChoreStatus::Pending);
    assert_eq!(stored.completed_at, None);

    let done = fx
        .store
        .complete_chore(&fx.family.id, &chore.id, &fx.kid.id, now)
        .await
        .unwrap();
    assert_eq!(done.status, ChoreStatus::PendingApproval);
}
