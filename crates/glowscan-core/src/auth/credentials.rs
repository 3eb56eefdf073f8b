use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::vault::{SecretBackend, StorageError};
use crate::clock::{Clock, SystemClock};

/// Access tokens are good for 5 minutes.
const ACCESS_TOKEN_LIFETIME_MINUTES: i64 = 5;

/// Session tokens are good for 1 hour.
const SESSION_TOKEN_LIFETIME_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Access,
    Session,
}

impl CredentialKind {
    pub fn lifetime(&self) -> Duration {
        match self {
            CredentialKind::Access => Duration::minutes(ACCESS_TOKEN_LIFETIME_MINUTES),
            CredentialKind::Session => Duration::minutes(SESSION_TOKEN_LIFETIME_MINUTES),
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::Access => write!(f, "access"),
            CredentialKind::Session => write!(f, "session"),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub kind: CredentialKind,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn issue(kind: CredentialKind, token: String, now: DateTime<Utc>) -> Self {
        Self {
            kind,
            token,
            expires_at: now + kind.lifetime(),
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// Keep tokens out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// At most one credential of each kind. Last write wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    pub access: Option<Credential>,
    pub session: Option<Credential>,
}

impl CredentialSet {
    pub fn get(&self, kind: CredentialKind) -> Option<&Credential> {
        match kind {
            CredentialKind::Access => self.access.as_ref(),
            CredentialKind::Session => self.session.as_ref(),
        }
    }

    fn slot(&mut self, kind: CredentialKind) -> &mut Option<Credential> {
        match kind {
            CredentialKind::Access => &mut self.access,
            CredentialKind::Session => &mut self.session,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.session.is_none()
    }
}

/// Owns the access/session credential pair and writes it through to a
/// durable [`SecretBackend`].
///
/// All reads and writes go through one lock, so concurrent saves from a
/// refresh and a login serialize cleanly. A failed write leaves the
/// in-memory set untouched.
pub struct CredentialStore {
    backend: Box<dyn SecretBackend>,
    clock: Arc<dyn Clock>,
    state: Mutex<CredentialSet>,
}

impl CredentialStore {
    /// Open a store over the given backend, loading anything already persisted.
    ///
    /// An unreadable backend is treated as empty; the error is logged.
    pub fn open(backend: Box<dyn SecretBackend>) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    pub fn with_clock(backend: Box<dyn SecretBackend>, clock: Arc<dyn Clock>) -> Self {
        let set = match Self::read_backend(backend.as_ref()) {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, "Failed to load stored credentials, starting empty");
                CredentialSet::default()
            }
        };
        debug!(
            access = set.access.is_some(),
            session = set.session.is_some(),
            "Credential store opened"
        );

        Self {
            backend,
            clock,
            state: Mutex::new(set),
        }
    }

    fn read_backend(backend: &dyn SecretBackend) -> Result<CredentialSet, StorageError> {
        match backend.load()? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::Corrupt(format!("credential set: {}", e))),
            None => Ok(CredentialSet::default()),
        }
    }

    fn persist(&self, set: &CredentialSet) -> Result<(), StorageError> {
        if set.is_empty() {
            return self.backend.erase();
        }
        let bytes = serde_json::to_vec(set)
            .map_err(|e| StorageError::Corrupt(format!("credential set: {}", e)))?;
        self.backend.store(&bytes)
    }

    /// Store a token of the given kind, expiring one lifetime from now.
    pub fn save(&self, kind: CredentialKind, token: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let mut next = state.clone();
        *next.slot(kind) = Some(Credential::issue(kind, token.to_string(), self.clock.now()));

        self.persist(&next)?;
        *state = next;
        debug!(%kind, "Credential saved");
        Ok(())
    }

    /// The stored token of this kind, valid or not.
    pub fn get(&self, kind: CredentialKind) -> Option<String> {
        self.state.lock().get(kind).map(|c| c.token.clone())
    }

    pub fn is_valid(&self, kind: CredentialKind) -> bool {
        let now = self.clock.now();
        self.state
            .lock()
            .get(kind)
            .map(|c| c.is_valid_at(now))
            .unwrap_or(false)
    }

    pub fn is_logged_in(&self) -> bool {
        self.is_valid(CredentialKind::Access) || self.is_valid(CredentialKind::Session)
    }

    /// Best valid token for an outgoing request: access first, then session.
    pub fn bearer(&self) -> Option<String> {
        let now = self.clock.now();
        let state = self.state.lock();
        [CredentialKind::Access, CredentialKind::Session]
            .into_iter()
            .filter_map(|kind| state.get(kind))
            .find(|c| c.is_valid_at(now))
            .map(|c| c.token.clone())
    }

    /// Any stored token, ignoring expiry, access first.
    pub fn stored(&self) -> Option<(CredentialKind, String)> {
        let state = self.state.lock();
        [CredentialKind::Access, CredentialKind::Session]
            .into_iter()
            .find_map(|kind| state.get(kind).map(|c| (kind, c.token.clone())))
    }

    /// Time left before this kind expires, if one is stored.
    pub fn expires_in(&self, kind: CredentialKind) -> Option<Duration> {
        let now = self.clock.now();
        self.state.lock().get(kind).map(|c| c.expires_at - now)
    }

    pub fn snapshot(&self) -> CredentialSet {
        self.state.lock().clone()
    }

    /// Put back a set taken with [`snapshot`](Self::snapshot).
    pub fn restore(&self, set: CredentialSet) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        self.persist(&set)?;
        *state = set;
        debug!("Credentials restored");
        Ok(())
    }

    /// Remove both credentials. Idempotent.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        self.backend.erase()?;
        *state = CredentialSet::default();
        debug!("Credentials cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::vault::{EncryptedFileVault, MemoryVault, SecretBackend, StorageError};
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    fn store_with_clock() -> (CredentialStore, ManualClock) {
        let clock = ManualClock::default();
        let store = CredentialStore::with_clock(Box::new(MemoryVault::new()), Arc::new(clock.clone()));
        (store, clock)
    }

    #[test]
    fn test_fresh_store_is_logged_out() {
        let (store, _) = store_with_clock();
        assert!(!store.is_logged_in());
        assert!(!store.is_valid(CredentialKind::Access));
        assert_eq!(store.get(CredentialKind::Session), None);
        assert_eq!(store.bearer(), None);
    }

    #[test]
    fn test_access_expires_after_five_minutes() {
        let (store, clock) = store_with_clock();
        store.save(CredentialKind::Access, "acc").unwrap();
        assert!(store.is_valid(CredentialKind::Access));

        clock.advance(Duration::minutes(5) - Duration::seconds(1));
        assert!(store.is_valid(CredentialKind::Access));

        clock.advance(Duration::seconds(1));
        assert!(!store.is_valid(CredentialKind::Access));
        assert!(!store.is_logged_in());
        // Expired tokens are still readable.
        assert_eq!(store.get(CredentialKind::Access).as_deref(), Some("acc"));
    }

    #[test]
    fn test_bearer_prefers_valid_access_then_session() {
        let (store, clock) = store_with_clock();
        store.save(CredentialKind::Session, "sess").unwrap();
        store.save(CredentialKind::Access, "acc").unwrap();
        assert_eq!(store.bearer().as_deref(), Some("acc"));

        clock.advance(Duration::minutes(10));
        assert_eq!(store.bearer().as_deref(), Some("sess"));
        assert!(store.is_logged_in());

        clock.advance(Duration::hours(1));
        assert_eq!(store.bearer(), None);
        assert_eq!(store.stored(), Some((CredentialKind::Access, "acc".to_string())));
    }

    #[test]
    fn test_last_write_wins() {
        let (store, clock) = store_with_clock();
        store.save(CredentialKind::Access, "first").unwrap();
        clock.advance(Duration::minutes(4));
        store.save(CredentialKind::Access, "second").unwrap();

        assert_eq!(store.get(CredentialKind::Access).as_deref(), Some("second"));
        // Expiry restarts from the second save.
        clock.advance(Duration::minutes(4));
        assert!(store.is_valid(CredentialKind::Access));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (store, _) = store_with_clock();
        store.save(CredentialKind::Access, "acc").unwrap();
        store.save(CredentialKind::Session, "sess").unwrap();

        store.clear().unwrap();
        store.clear().unwrap();
        assert!(!store.is_logged_in());
        assert_eq!(store.stored(), None);
    }

    #[test]
    fn test_expires_in() {
        let (store, clock) = store_with_clock();
        assert_eq!(store.expires_in(CredentialKind::Session), None);
        store.save(CredentialKind::Session, "sess").unwrap();
        clock.advance(Duration::minutes(15));
        assert_eq!(store.expires_in(CredentialKind::Session), Some(Duration::minutes(45)));
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.vault");

        let store = CredentialStore::open(Box::new(EncryptedFileVault::open(&path, "pass").unwrap()));
        store.save(CredentialKind::Session, "sess-token").unwrap();
        drop(store);

        let reopened = CredentialStore::open(Box::new(EncryptedFileVault::open(&path, "pass").unwrap()));
        assert_eq!(reopened.get(CredentialKind::Session).as_deref(), Some("sess-token"));
        assert!(reopened.is_valid(CredentialKind::Session));
    }

    #[test]
    fn test_debug_redacts_token() {
        let cred = Credential::issue(CredentialKind::Access, "secret-token".into(), Utc::now());
        let rendered = format!("{:?}", cred);
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }

    /// Hands the store a backend the test can still read.
    struct SharedVault(Arc<MemoryVault>);

    impl SecretBackend for SharedVault {
        fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
            self.0.load()
        }

        fn store(&self, bytes: &[u8]) -> Result<(), StorageError> {
            self.0.store(bytes)
        }

        fn erase(&self) -> Result<(), StorageError> {
            self.0.erase()
        }
    }

    fn writer_kind(thread: usize, step: usize) -> CredentialKind {
        if (thread + step) % 2 == 0 {
            CredentialKind::Access
        } else {
            CredentialKind::Session
        }
    }

    #[test]
    fn test_concurrent_saves_and_clears_stay_consistent() {
        const THREADS: usize = 8;
        const STEPS: usize = 50;

        let vault = Arc::new(MemoryVault::new());
        let store = Arc::new(CredentialStore::open(Box::new(SharedVault(vault.clone()))));

        let handles: Vec<_> = (0..THREADS)
            .map(|thread| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for step in 0..STEPS {
                        let token = format!("t{}-{}", thread, step);
                        store.save(writer_kind(thread, step), &token).unwrap();
                        if let Some(bearer) = store.bearer() {
                            assert!(bearer.starts_with('t'));
                        }
                        if thread == 0 && step % 10 == 5 {
                            store.clear().unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let final_set = store.snapshot();
        for kind in [CredentialKind::Access, CredentialKind::Session] {
            if let Some(cred) = final_set.get(kind) {
                let written = (0..THREADS)
                    .flat_map(|t| (0..STEPS).map(move |s| (t, s)))
                    .any(|(t, s)| writer_kind(t, s) == kind && cred.token == format!("t{}-{}", t, s));
                assert!(written, "{} holds a token no writer saved", kind);
            }
        }

        let reloaded = CredentialStore::open(Box::new(SharedVault(vault)));
        assert_eq!(reloaded.snapshot(), final_set);
    }

    #[test]
    fn test_later_save_of_same_kind_wins() {
        let (store, _) = store_with_clock();
        store.save(CredentialKind::Session, "first").unwrap();
        store.save(CredentialKind::Session, "second").unwrap();
        assert_eq!(store.get(CredentialKind::Session).as_deref(), Some("second"));
    }

    fn kind_strategy() -> impl Strategy<Value = CredentialKind> {
        prop_oneof![Just(CredentialKind::Access), Just(CredentialKind::Session)]
    }

    proptest! {
        #[test]
        fn prop_valid_until_lifetime_elapses(
            kind in kind_strategy(),
            token in "[A-Za-z0-9._-]{1,64}",
            elapsed_secs in 0i64..(3 * 3600),
        ) {
            let (store, clock) = store_with_clock();
            store.save(kind, &token).unwrap();
            prop_assert!(store.is_valid(kind));

            clock.advance(Duration::seconds(elapsed_secs));
            let expected = Duration::seconds(elapsed_secs) < kind.lifetime();
            prop_assert_eq!(store.is_valid(kind), expected);
        }

        #[test]
        fn prop_clear_always_logs_out(
            saves in proptest::collection::vec((kind_strategy(), "[a-z]{1,12}"), 0..6),
        ) {
            let (store, _) = store_with_clock();
            for (kind, token) in &saves {
                store.save(*kind, token).unwrap();
            }
            store.clear().unwrap();
            prop_assert!(!store.is_logged_in());
        }
    }
}
