//! Signed-in state shared across the client.
//!
//! A [`Session`] is cheap to clone. Everything that needs the bearer token or
//! the family scope reads it from here, and anything that must react to
//! sign-in, sign-out or a family change holds a [`SessionWatcher`].

use chorescore_shared::auth::Role;
use chorescore_shared::domain::{FamilyId, ProfileId};
use chorescore_shared::jwt::{self, JwtClaims};
use tokio::sync::watch;

use crate::AppError;

const KEYRING_SERVICE: &str = "chorescore-client";

/// Persistence for the bearer token.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<String>, AppError>;
    fn save(&self, token: &str) -> Result<(), AppError>;
    fn clear(&self) -> Result<(), AppError>;
}

/// OS keyring entry keyed by the normalized server URL.
pub struct KeyringStore {
    entry: keyring::Entry,
}

impl KeyringStore {
    pub fn new(server_url: &str) -> Result<Self, AppError> {
        let entry = keyring::Entry::new(
            KEYRING_SERVICE,
            &crate::config::normalize_server_url(server_url),
        )
        .map_err(|e| AppError::Keyring(e.to_string()))?;
        Ok(Self { entry })
    }
}

impl TokenStore for KeyringStore {
    fn load(&self) -> Result<Option<String>, AppError> {
        match self.entry.get_password() {
            Ok(t) => Ok(Some(t)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AppError::Keyring(e.to_string())),
        }
    }

    fn save(&self, token: &str) -> Result<(), AppError> {
        self.entry
            .set_password(token)
            .map_err(|e| AppError::Keyring(e.to_string()))
    }

    fn clear(&self) -> Result<(), AppError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AppError::Keyring(e.to_string())),
        }
    }
}

/// A token together with the claims read from it.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub token: String,
    pub claims: JwtClaims,
}

impl SignedIn {
    pub fn profile_id(&self) -> ProfileId {
        self.claims.profile_id()
    }

    pub fn role(&self) -> Role {
        self.claims.role
    }

    pub fn family_id(&self) -> Option<FamilyId> {
        self.claims.family_id()
    }
}

pub type SessionWatcher = watch::Receiver<Option<SignedIn>>;

#[derive(Clone)]
pub struct Session {
    server_url: String,
    state: watch::Sender<Option<SignedIn>>,
}

impl Session {
    pub fn new(server_url: &str) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            server_url: crate::config::normalize_server_url(server_url),
            state,
        }
    }

    /// Start from whatever token `store` holds. A token that no longer decodes
    /// is discarded.
    pub fn restore(server_url: &str, store: &dyn TokenStore) -> Result<Self, AppError> {
        let session = Self::new(server_url);
        if let Some(token) = store.load()? {
            match session.sign_in(&token) {
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "stored token unreadable; discarding");
                    store.clear()?;
                }
            }
        }
        Ok(session)
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Replace the current token. Observers see the change even when only the
    /// family claim differs.
    pub fn sign_in(&self, token: &str) -> Result<SignedIn, AppError> {
        let claims = jwt::decode_unverified(token)
            .map_err(|e| AppError::Http(format!("invalid token: {e}")))?;
        let signed_in = SignedIn {
            token: token.to_string(),
            claims,
        };
        self.state.send_replace(Some(signed_in.clone()));
        Ok(signed_in)
    }

    pub fn sign_out(&self) {
        self.state.send_replace(None);
    }

    pub fn current(&self) -> Option<SignedIn> {
        self.state.borrow().clone()
    }

    /// Like [`Session::current`] but an error when signed out.
    pub fn require(&self) -> Result<SignedIn, AppError> {
        self.current()
            .ok_or_else(|| AppError::Config("not signed in; run `chorescore login` first".into()))
    }

    /// Signed-in state that already belongs to a family.
    pub fn require_family(&self) -> Result<(SignedIn, FamilyId), AppError> {
        let s = self.require()?;
        let fid = s.family_id().ok_or_else(|| {
            AppError::Config(
                "not in a family yet; run `chorescore create-family` or `chorescore join-family`"
                    .into(),
            )
        })?;
        Ok((s, fid))
    }

    pub fn subscribe(&self) -> SessionWatcher {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MemoryStore(Mutex<Option<String>>);

    impl TokenStore for MemoryStore {
        fn load(&self) -> Result<Option<String>, AppError> {
            Ok(self.0.lock().unwrap().clone())
        }
        fn save(&self, token: &str) -> Result<(), AppError> {
            *self.0.lock().unwrap() = Some(token.to_string());
            Ok(())
        }
        fn clear(&self) -> Result<(), AppError> {
            *self.0.lock().unwrap() = None;
            Ok(())
        }
    }

    fn token(sub: &str, family: Option<&str>) -> String {
        let claims = JwtClaims {
            sub: sub.into(),
            jti: format!("jti-{sub}"),
            exp: 4_102_444_800,
            role: Role::Child,
            family_id: family.map(str::to_string),
        };
        jwt::encode(&claims, b"test").unwrap()
    }

    #[tokio::test]
    async fn observers_see_sign_in_and_family_changes() {
        let session = Session::new("localhost:5151");
        assert_eq!(session.server_url(), "http://localhost:5151");
        let mut rx = session.subscribe();
        assert!(rx.borrow().is_none());

        session.sign_in(&token("p1", None)).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow_and_update().as_ref().map(|s| s.profile_id()),
            Some(ProfileId::from("p1"))
        );

        session.sign_in(&token("p1", Some("fam"))).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow_and_update().as_ref().and_then(|s| s.family_id()),
            Some(FamilyId::from("fam"))
        );

        session.sign_out();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }

    #[test]
    fn family_is_required_for_family_commands() {
        let session = Session::new("http://localhost:5151");
        assert!(session.require().is_err());
        session.sign_in(&token("p1", None)).unwrap();
        assert!(session.require().is_ok());
        assert!(session.require_family().is_err());
        session.sign_in(&token("p1", Some("fam"))).unwrap();
        let (_, fid) = session.require_family().unwrap();
        assert_eq!(fid.as_str(), "fam");
    }

    #[test]
    fn restore_reads_the_store_and_drops_garbage() {
        let store = MemoryStore(Mutex::new(Some(token("p2", Some("fam")))));
        let session = Session::restore("http://localhost:5151", &store).unwrap();
        assert_eq!(
            session.current().map(|s| s.profile_id()),
            Some(ProfileId::from("p2"))
        );

        let bad = MemoryStore(Mutex::new(Some("not-a-token".into())));
        let session = Session::restore("http://localhost:5151", &bad).unwrap();
        assert!(session.current().is_none());
        assert_eq!(bad.load().unwrap(), None);
    }
}
