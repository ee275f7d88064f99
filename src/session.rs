//! Session-scoped authorization state: the signed-in account's profile,
//! fetched once per sign-in and cleared on sign-out.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::identity::{AuthIdentity, IdentityProvider};
use crate::store::profiles::{ProfileStore, UserProfile};
use crate::types::Role;

#[derive(Default)]
struct CacheState {
    /// Profile of the live account, once a fetch has completed. `None`
    /// both before the fetch and when no profile document exists.
    profile: Option<UserProfile>,
    /// Distinguishes "checked and absent" from "not yet checked".
    fetched: bool,
    /// The account the cache is tracking; `None` when signed out.
    live: Option<AuthIdentity>,
    /// Bumped on every identity transition. A fetch result only installs
    /// if the generation it started under is still current, so a sign-out
    /// wins over any fetch still in flight.
    generation: u64,
}

/// The signed-in account's authorization profile, mirrored from the
/// document store.
///
/// Owns exactly one profile at a time, for the live account only. Create
/// one per app, [`attach`](SessionContext::attach) it to the identity
/// provider at startup, and shut the listener down at teardown.
///
/// Store failures never escape: they leave the cache in its
/// least-privileged state (`None`) and are logged.
pub struct SessionContext<S> {
    store: Arc<S>,
    state: Arc<Mutex<CacheState>>,
}

// Manual Clone: avoid derive adding an `S: Clone` bound.
impl<S> Clone for SessionContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            state: self.state.clone(),
        }
    }
}

impl<S: ProfileStore> SessionContext<S> {
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// Subscribe to `provider` and keep the cache in sync with every
    /// identity transition, in emission order.
    ///
    /// The provider's current identity is applied first, so attaching to
    /// an already-signed-in provider does not miss the account. Returns
    /// the listener handle; keep it alive for the life of the app and
    /// [`shutdown`](SessionListener::shutdown) it at teardown.
    pub fn attach<P: IdentityProvider>(&self, provider: &P) -> SessionListener {
        let mut changes = provider.subscribe();
        let initial = provider.current_identity();
        let context = self.clone();
        let task = tokio::spawn(async move {
            if initial.is_some() {
                context.handle_identity_change(initial).await;
            }
            while let Some(change) = changes.recv().await {
                context.handle_identity_change(change).await;
            }
        });
        SessionListener { task }
    }

    /// Apply one identity transition.
    ///
    /// Sign-in starts a profile fetch for the new account. Sign-out clears
    /// the cache before this call ever suspends, so no decision made after
    /// it can observe the previous account's profile, even while that
    /// account's fetch is still in flight.
    pub async fn handle_identity_change(&self, identity: Option<AuthIdentity>) {
        match identity {
            None => {
                let mut state = self.state.lock();
                state.profile = None;
                state.fetched = false;
                state.live = None;
                state.generation += 1;
                drop(state);
                tracing::info!("Signed out; session profile cleared");
            }
            Some(identity) => {
                let generation = {
                    let mut state = self.state.lock();
                    state.profile = None;
                    state.fetched = false;
                    state.live = Some(identity.clone());
                    state.generation += 1;
                    state.generation
                };
                self.fetch_and_install(&identity, generation).await;
            }
        }
    }

    /// Make sure the live account's profile has been fetched.
    ///
    /// Idempotent: fetches only when a live account has no completed fetch
    /// yet. After this resolves, [`current_role`](Self::current_role)
    /// reflects the live account — its profile, or `None` if the account
    /// has no profile document or the fetch failed. Overlapping calls may
    /// both fetch; profile fetches are idempotent, so the race is benign.
    pub async fn ensure_loaded(&self) {
        let pending = {
            let state = self.state.lock();
            match (&state.live, state.fetched) {
                (Some(identity), false) => Some((identity.clone(), state.generation)),
                _ => None,
            }
        };
        if let Some((identity, generation)) = pending {
            self.fetch_and_install(&identity, generation).await;
        }
    }

    /// Role of the live account's cached profile. Pure read: `None` when
    /// signed out, unfetched, profile-less, or after a failed fetch.
    #[must_use]
    pub fn current_role(&self) -> Option<Role> {
        self.state.lock().profile.as_ref().map(|p| p.role)
    }

    /// The live account's cached profile, if one is loaded.
    #[must_use]
    pub fn profile(&self) -> Option<UserProfile> {
        self.state.lock().profile.clone()
    }

    async fn fetch_and_install(&self, identity: &AuthIdentity, generation: u64) {
        let result = self.store.get_profile(&identity.uid).await;

        let mut state = self.state.lock();
        if state.generation != generation {
            // The identity changed while the fetch was in flight; whatever
            // came back belongs to a session that no longer exists.
            tracing::debug!(uid = %identity.uid, "Discarding stale profile fetch");
            return;
        }
        match result {
            Ok(profile) => {
                state.profile = profile;
                state.fetched = true;
            }
            Err(error) => {
                state.profile = None;
                state.fetched = true;
                drop(state);
                tracing::warn!(
                    uid = %identity.uid,
                    error = %error,
                    "Profile fetch failed; treating account as unprivileged"
                );
            }
        }
    }
}

/// Handle for the identity-change listener spawned by
/// [`SessionContext::attach`]. Aborts the listener when shut down or
/// dropped.
pub struct SessionListener {
    task: JoinHandle<()>,
}

impl SessionListener {
    pub fn shutdown(self) {
        self.task.abort();
    }
}

impl Drop for SessionListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use super::*;
    use crate::identity::DevIdentity;
    use crate::store::StoreError;
    use crate::types::UserId;
    use serde_json::Map;

    /// Profile store double: seedable profiles, a fetch counter, an
    /// optional failure switch, and an optional gate that holds fetches
    /// open until released.
    #[derive(Default)]
    struct StubProfiles {
        profiles: Mutex<std::collections::HashMap<String, UserProfile>>,
        fetches: AtomicUsize,
        fail: AtomicBool,
        gate: Option<Arc<Notify>>,
    }

    impl StubProfiles {
        fn with_profile(uid: &str, role: Role) -> Self {
            let stub = Self::default();
            stub.profiles.lock().insert(
                uid.to_owned(),
                UserProfile {
                    uid: UserId::from(uid),
                    email: format!("{uid}@example.com"),
                    display_name: None,
                    photo_url: None,
                    role,
                    created_at: None,
                    extra: Map::new(),
                },
            );
            stub
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn failing(self) -> Self {
            self.fail.store(true, Ordering::SeqCst);
            self
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    impl ProfileStore for StubProfiles {
        fn get_profile(
            &self,
            uid: &UserId,
        ) -> impl Future<Output = Result<Option<UserProfile>, StoreError>> + Send {
            let uid = uid.clone();
            async move {
                self.fetches.fetch_add(1, Ordering::SeqCst);
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                if self.fail.load(Ordering::SeqCst) {
                    return Err(StoreError::Unavailable {
                        operation: "get profile",
                        status: None,
                        detail: "store offline".into(),
                    });
                }
                Ok(self.profiles.lock().get(uid.as_str()).cloned())
            }
        }

        fn create_profile(
            &self,
            _identity: &crate::identity::AuthIdentity,
        ) -> impl Future<Output = Result<(), StoreError>> + Send {
            async { unreachable!("not exercised by session tests") }
        }

        fn set_profile(
            &self,
            _uid: &UserId,
            _fields: Map<String, serde_json::Value>,
        ) -> impl Future<Output = Result<(), StoreError>> + Send {
            async { unreachable!("not exercised by session tests") }
        }

        fn set_role(
            &self,
            _uid: &UserId,
            _role: Role,
        ) -> impl Future<Output = Result<(), StoreError>> + Send {
            async { unreachable!("not exercised by session tests") }
        }

        fn list_profiles(
            &self,
        ) -> impl Future<Output = Result<Vec<UserProfile>, StoreError>> + Send {
            async { unreachable!("not exercised by session tests") }
        }

        fn count_profiles(&self) -> impl Future<Output = Result<u64, StoreError>> + Send {
            async { unreachable!("not exercised by session tests") }
        }

        fn delete_profile(
            &self,
            _uid: &UserId,
        ) -> impl Future<Output = Result<(), StoreError>> + Send {
            async { unreachable!("not exercised by session tests") }
        }
    }

    fn identity(uid: &str) -> AuthIdentity {
        AuthIdentity::new(uid, format!("{uid}@example.com"))
    }

    #[tokio::test]
    async fn no_stored_profile_reads_as_no_role() {
        let session = SessionContext::new(Arc::new(StubProfiles::default()));
        session.handle_identity_change(Some(identity("u-1"))).await;
        session.ensure_loaded().await;
        assert_eq!(session.current_role(), None);
    }

    #[tokio::test]
    async fn sign_in_loads_the_profile() {
        let session = SessionContext::new(Arc::new(StubProfiles::with_profile("u-1", Role::Admin)));
        session.handle_identity_change(Some(identity("u-1"))).await;
        assert_eq!(session.current_role(), Some(Role::Admin));
    }

    #[tokio::test]
    async fn cache_follows_the_last_transition() {
        let store = Arc::new(StubProfiles::with_profile("admin", Role::Admin));
        let session = SessionContext::new(store);

        session.handle_identity_change(Some(identity("admin"))).await;
        session.handle_identity_change(None).await;
        session.handle_identity_change(Some(identity("nobody"))).await;

        assert_eq!(session.current_role(), None);
        assert!(session.profile().is_none());
    }

    #[tokio::test]
    async fn sign_out_clears_synchronously() {
        let session = SessionContext::new(Arc::new(StubProfiles::with_profile("u-1", Role::Admin)));
        session.handle_identity_change(Some(identity("u-1"))).await;
        assert_eq!(session.current_role(), Some(Role::Admin));

        session.handle_identity_change(None).await;
        assert_eq!(session.current_role(), None);
        assert!(session.profile().is_none());
    }

    #[tokio::test]
    async fn late_fetch_does_not_repopulate_after_sign_out() {
        let gate = Arc::new(Notify::new());
        let store = Arc::new(StubProfiles::with_profile("u-1", Role::Admin).gated(gate.clone()));
        let session = SessionContext::new(store);

        // Sign-in whose fetch blocks on the gate.
        let in_flight = {
            let session = session.clone();
            tokio::spawn(async move {
                session.handle_identity_change(Some(identity("u-1"))).await;
            })
        };
        tokio::task::yield_now().await;

        // Sign-out lands while that fetch is still in flight.
        session.handle_identity_change(None).await;
        assert_eq!(session.current_role(), None);

        // The fetch now resolves — into a discarded generation.
        gate.notify_one();
        in_flight.await.unwrap();
        assert_eq!(session.current_role(), None);
        assert!(session.profile().is_none());
    }

    #[tokio::test]
    async fn ensure_loaded_fetches_at_most_once() {
        let store = Arc::new(StubProfiles::with_profile("u-1", Role::Student));
        let session = SessionContext::new(store.clone());
        session.handle_identity_change(Some(identity("u-1"))).await;
        assert_eq!(store.fetches(), 1, "sign-in fetches once");

        session.ensure_loaded().await;
        session.ensure_loaded().await;
        assert_eq!(store.fetches(), 1, "already-fetched profile is not refetched");
    }

    #[tokio::test]
    async fn ensure_loaded_without_identity_is_a_no_op() {
        let store = Arc::new(StubProfiles::default());
        let session = SessionContext::new(store.clone());
        session.ensure_loaded().await;
        assert_eq!(store.fetches(), 0);
    }

    #[tokio::test]
    async fn failed_fetch_is_swallowed_and_not_retried() {
        let store = Arc::new(StubProfiles::with_profile("u-1", Role::Admin).failing());
        let session = SessionContext::new(store.clone());

        session.handle_identity_change(Some(identity("u-1"))).await;
        assert_eq!(session.current_role(), None, "failure reads as no role");

        session.ensure_loaded().await;
        assert_eq!(store.fetches(), 1, "failure counts as a completed check");
    }

    #[tokio::test]
    async fn attach_applies_transitions_and_seeds_current() {
        let provider = DevIdentity::new();
        provider.sign_in(identity("u-1"));

        let store = Arc::new(StubProfiles::with_profile("u-1", Role::Admin));
        let session = SessionContext::new(store);
        let listener = session.attach(&provider);

        wait_for(&session, Some(Role::Admin)).await;

        provider.sign_out();
        wait_for(&session, None).await;

        listener.shutdown();
    }

    async fn wait_for<S: ProfileStore>(session: &SessionContext<S>, role: Option<Role>) {
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            loop {
                if session.current_role() == role {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("session never reached the expected role");
    }
}
