//! Session lifecycle
//!
//! Owns the client's view of who is signed in. The state machine is
//!
//! ```text
//! Uninitialized -> Initializing -> Authenticated | Anonymous
//! Authenticated <-> Anonymous            (login, logout, expiry)
//! any -> Terminated                      (terminate)
//! ```
//!
//! Every transition publishes a new [`SessionSnapshot`]. Auth events pushed
//! by the backend are applied by a listener task started with
//! [`SessionManager::spawn_listener`].

pub mod bootstrap;

pub use bootstrap::ProfileBootstrap;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::{
    fmt,
    sync::{Arc, Weak},
};
use tokio::{
    sync::{Mutex, broadcast::error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    backend::{AuthBackend, AuthEvent, DataService},
    config::SessionConfig,
    error::{CrmError, CrmResult},
    models::{Actor, AuthSession, AuthUser, Profile, ProfileUpdate, Registration},
    persistence::SessionPersistence,
    repositories::ProfileRepository,
    store::ClientStore,
    tenant::SessionSource,
    validation,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Initializing,
    Authenticated,
    Anonymous,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initializing => "initializing",
            SessionState::Authenticated => "authenticated",
            SessionState::Anonymous => "anonymous",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Published view of the session
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session: Option<AuthSession>,
    pub actor: Option<Actor>,
    /// Set once the first initialization attempt has finished
    pub initialized: bool,
}

impl SessionSnapshot {
    fn user_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.user.id)
    }

    fn sign_out(&mut self) {
        if self.state != SessionState::Terminated {
            self.state = SessionState::Anonymous;
        }
        self.session = None;
        self.actor = None;
    }
}

pub struct SessionManager {
    auth: Arc<dyn AuthBackend>,
    profiles: ProfileRepository,
    bootstrap: ProfileBootstrap,
    persistence: Arc<dyn SessionPersistence>,
    store: ClientStore,
    config: SessionConfig,
    snapshot: ArcSwap<SessionSnapshot>,
    refresh_lock: Mutex<()>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(
        auth: Arc<dyn AuthBackend>,
        data: Arc<dyn DataService>,
        persistence: Arc<dyn SessionPersistence>,
        store: ClientStore,
        config: SessionConfig,
    ) -> Self {
        let profiles = ProfileRepository::new(data);
        Self {
            auth,
            bootstrap: ProfileBootstrap::new(profiles.clone()),
            profiles,
            persistence,
            store,
            config,
            snapshot: ArcSwap::from_pointee(SessionSnapshot::default()),
            refresh_lock: Mutex::new(()),
            listener: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshot.load_full()
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.load().state
    }

    pub fn is_initialized(&self) -> bool {
        self.snapshot.load().initialized
    }

    pub fn current_actor(&self) -> Option<Actor> {
        self.snapshot.load().actor.clone()
    }

    /// Publish a modified copy of the snapshot and return the previous one
    fn publish(&self, f: impl Fn(&mut SessionSnapshot)) -> Arc<SessionSnapshot> {
        self.snapshot.rcu(|current| {
            let mut next = SessionSnapshot::clone(current);
            f(&mut next);
            next
        })
    }

    fn ensure_ready(&self) -> CrmResult<()> {
        match self.state() {
            SessionState::Anonymous | SessionState::Authenticated => Ok(()),
            other => Err(CrmError::InvalidState(other)),
        }
    }

    /// Recover a persisted session, at most once.
    ///
    /// Later calls return the current state without doing any work.
    pub async fn initialize(&self) -> SessionState {
        let previous = self.publish(|s| {
            if s.state == SessionState::Uninitialized {
                s.state = SessionState::Initializing;
            }
        });
        if previous.state != SessionState::Uninitialized {
            debug!(state = %previous.state, "Session already initialized");
            return self.state();
        }

        info!("Initializing session");
        match self.recover().await {
            Some(session) => {
                self.adopt(session).await;
            }
            None => {
                self.publish(|s| {
                    if s.state == SessionState::Initializing {
                        s.sign_out();
                    }
                });
            }
        }
        self.publish(|s| s.initialized = true);

        let state = self.state();
        info!(state = %state, "Session initialized");
        state
    }

    async fn recover(&self) -> Option<AuthSession> {
        let stored = match self.persistence.load().await {
            Ok(stored) => stored?,
            Err(e) => {
                warn!("Failed to load persisted session: {}", e);
                return None;
            }
        };

        let validated = if stored.expires_within(self.config.refresh_margin()) {
            self.auth.refresh(&stored.refresh_token).await
        } else {
            let user = self.auth.get_user(&stored.access_token).await;
            match user {
                Ok(user) => Ok(AuthSession { user, ..stored }),
                Err(_) => self.auth.refresh(&stored.refresh_token).await,
            }
        };

        match validated {
            Ok(session) => Some(session),
            Err(e) if e.rejects_credentials() => {
                info!("Persisted session is no longer valid: {}", e);
                self.clear_persisted().await;
                None
            }
            Err(e) => {
                warn!("Could not validate persisted session, keeping it: {}", e);
                None
            }
        }
    }

    /// Make `session` the current one and load the actor's profile
    async fn adopt(&self, session: AuthSession) -> Option<Actor> {
        let user = session.user.clone();
        let previous = self.publish(|s| {
            if s.state != SessionState::Terminated {
                s.state = SessionState::Authenticated;
                s.session = Some(session.clone());
                s.actor = Some(Actor::from_user(&user));
            }
        });
        if previous.state == SessionState::Terminated {
            return None;
        }
        if let Some(replaced) = previous.session.as_ref().filter(|s| s.user.id != user.id) {
            self.switch_user(replaced).await;
        }

        if let Err(e) = self.persistence.save(&session).await {
            warn!(user_id = %user.id, "Failed to persist session: {}", e);
        }

        let actor = self.load_actor(&user).await;
        self.publish_actor(&actor);
        Some(actor)
    }

    /// Forget everything cached for `replaced` and end its remote session
    async fn switch_user(&self, replaced: &AuthSession) {
        info!(user_id = %replaced.user.id, "Replacing session of another user");
        self.store.clear();
        if let Err(e) = self.auth.sign_out(replaced).await {
            warn!(user_id = %replaced.user.id, "Remote sign-out of replaced session failed: {}", e);
        }
    }

    async fn load_actor(&self, user: &AuthUser) -> Actor {
        let mut actor = Actor::from_user(user);
        match self.bootstrap.ensure(user).await {
            Ok((profile, organization)) => {
                actor.profile = Some(profile);
                actor.organization = organization;
            }
            Err(e) => warn!(user_id = %user.id, "Profile bootstrap failed: {}", e),
        }
        actor
    }

    /// Install `actor` if its user is still the signed-in one
    fn publish_actor(&self, actor: &Actor) {
        self.publish(|s| {
            if s.state == SessionState::Authenticated && s.user_id() == Some(actor.id) {
                s.actor = Some(actor.clone());
            }
        });
        self.store.set_actor(self.current_actor());
    }

    /// Replace credentials of the signed-in user, keeping the actor
    async fn merge_credentials(&self, fresh: AuthSession) -> bool {
        let previous = self.publish(|s| {
            if s.state == SessionState::Authenticated && s.user_id() == Some(fresh.user.id) {
                s.session = Some(fresh.clone());
            }
        });
        let merged = previous.state == SessionState::Authenticated
            && previous.user_id() == Some(fresh.user.id);
        if merged {
            if let Err(e) = self.persistence.save(&fresh).await {
                warn!(user_id = %fresh.user.id, "Failed to persist refreshed session: {}", e);
            }
        }
        merged
    }

    async fn clear_persisted(&self) {
        if let Err(e) = self.persistence.clear().await {
            warn!("Failed to clear persisted session: {}", e);
        }
    }

    /// Drop every trace of the session on this client
    async fn clear_local(&self) {
        self.publish(SessionSnapshot::sign_out);
        self.store.clear();
        self.clear_persisted().await;
    }

    pub async fn login(&self, email: &str, password: &str) -> CrmResult<Actor> {
        self.ensure_ready()?;
        self.store
            .track(async {
                let session = self.auth.sign_in(email, password).await.map_err(|e| {
                    warn!("Sign-in failed for {}: {}", email, e);
                    CrmError::Auth(e)
                })?;
                info!(user_id = %session.user.id, "Signed in");
                self.adopt(session)
                    .await
                    .ok_or(CrmError::InvalidState(SessionState::Terminated))
            })
            .await
    }

    /// Register a new user.
    ///
    /// Returns `None` when the backend holds the session back until the
    /// email address is confirmed.
    pub async fn register(&self, registration: &Registration) -> CrmResult<Option<Actor>> {
        self.ensure_ready()?;
        validation::validate_email(&registration.email).map_err(CrmError::ValidationFailed)?;
        validation::validate_required("password", &registration.password)
            .map_err(CrmError::ValidationFailed)?;
        validation::validate_required("first_name", &registration.first_name)
            .map_err(CrmError::ValidationFailed)?;
        validation::validate_required("last_name", &registration.last_name)
            .map_err(CrmError::ValidationFailed)?;

        self.store
            .track(async {
                let Some(session) = self.auth.sign_up(registration).await? else {
                    info!("Registered {}, awaiting email confirmation", registration.email);
                    return Ok(None);
                };
                info!(user_id = %session.user.id, "Registered and signed in");
                self.adopt(session)
                    .await
                    .map(Some)
                    .ok_or(CrmError::InvalidState(SessionState::Terminated))
            })
            .await
    }

    /// Sign out.
    ///
    /// Local state is cleared before the backend is told, in every state but
    /// `Terminated`; a failed remote sign-out is logged and does not fail the
    /// call. Before initialization completes the state itself is left alone.
    pub async fn logout(&self) -> CrmResult<()> {
        let previous = self.publish(|s| {
            if s.state == SessionState::Terminated {
                return;
            }
            if s.state == SessionState::Authenticated {
                s.state = SessionState::Anonymous;
            }
            s.session = None;
            s.actor = None;
        });
        if previous.state == SessionState::Terminated {
            return Err(CrmError::InvalidState(SessionState::Terminated));
        }
        self.store.clear();
        self.clear_persisted().await;

        let Some(session) = previous.session.as_ref() else {
            debug!("Logout without an active session");
            return Ok(());
        };
        match self.auth.sign_out(session).await {
            Ok(()) => info!(user_id = %session.user.id, "Signed out"),
            Err(e) => warn!(
                user_id = %session.user.id,
                "Remote sign-out failed, local session cleared: {}", e
            ),
        }
        Ok(())
    }

    /// Exchange the refresh credential for new credentials
    pub async fn refresh(&self) -> CrmResult<AuthSession> {
        self.refresh_from(None).await
    }

    /// Single-flight refresh.
    ///
    /// With `stale_token` set, a concurrent caller that already replaced that
    /// access credential wins and its session is returned as is.
    async fn refresh_from(&self, stale_token: Option<&str>) -> CrmResult<AuthSession> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.snapshot();
        let session = match (current.state, current.session.as_ref()) {
            (SessionState::Authenticated, Some(session)) => session.clone(),
            _ => return Err(CrmError::Unauthenticated("no active session".to_string())),
        };
        let replaced = stale_token.is_some_and(|stale| session.access_token != stale);
        if replaced && !session.expires_within(self.config.refresh_margin()) {
            debug!("Session already refreshed by a concurrent caller");
            return Ok(session);
        }

        match self.auth.refresh(&session.refresh_token).await {
            Ok(fresh) => {
                info!(user_id = %fresh.user.id, "Session refreshed");
                self.merge_credentials(fresh.clone()).await;
                Ok(fresh)
            }
            Err(e) if e.rejects_credentials() => {
                warn!(user_id = %session.user.id, "Session refresh rejected: {}", e);
                self.clear_local().await;
                Err(CrmError::Unauthenticated(format!(
                    "session could not be refreshed: {}",
                    e
                )))
            }
            Err(e) => {
                warn!(user_id = %session.user.id, "Session refresh failed, keeping credentials: {}", e);
                Err(CrmError::Auth(e))
            }
        }
    }

    /// Current session, refreshed first when it is about to expire
    pub async fn active_session(&self) -> CrmResult<AuthSession> {
        let current = self.snapshot();
        let session = match (current.state, current.session.as_ref()) {
            (SessionState::Authenticated, Some(session)) => session,
            _ => return Err(CrmError::Unauthenticated("no active session".to_string())),
        };

        if session.expires_within(self.config.refresh_margin()) {
            debug!(user_id = %session.user.id, "Credentials about to expire");
            return self.refresh_from(Some(&session.access_token)).await;
        }
        Ok(session.clone())
    }

    /// Apply an event pushed by the auth backend
    pub async fn handle_event(&self, event: AuthEvent) {
        let current = self.snapshot();
        if matches!(
            current.state,
            SessionState::Uninitialized | SessionState::Initializing | SessionState::Terminated
        ) {
            debug!(state = %current.state, "Ignoring auth event");
            return;
        }
        let known_user = current.user_id();

        match event {
            AuthEvent::SignedIn(session) if known_user == Some(session.user.id) => {
                self.merge_credentials(session).await;
            }
            AuthEvent::SignedIn(session) => {
                info!(user_id = %session.user.id, "Adopting session signed in elsewhere");
                self.adopt(session).await;
            }
            AuthEvent::TokenRefreshed(session) => {
                if !self.merge_credentials(session).await {
                    debug!("Ignoring token refresh for another session");
                }
            }
            AuthEvent::UserUpdated(session) if known_user == Some(session.user.id) => {
                let user = session.user.clone();
                if self.merge_credentials(session).await {
                    let actor = self.load_actor(&user).await;
                    self.publish_actor(&actor);
                }
            }
            AuthEvent::UserUpdated(_) => debug!("Ignoring user update for another session"),
            AuthEvent::SignedOut { user_id } if known_user == Some(user_id) => {
                info!(user_id = %user_id, "Signed out elsewhere");
                self.clear_local().await;
            }
            AuthEvent::SignedOut { .. } => {}
        }
    }

    /// Start applying auth events in the background.
    ///
    /// The task holds only a weak reference and stops once the manager is
    /// dropped, terminated, or the backend closes its event channel.
    pub async fn spawn_listener(self: &Arc<Self>) {
        let mut events = self.auth.subscribe();
        let weak: Weak<Self> = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(manager) = weak.upgrade() else {
                            break;
                        };
                        manager.handle_event(event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth event listener fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Auth event listener stopped");
        });

        if let Some(previous) = self.listener.lock().await.replace(handle) {
            previous.abort();
        }
    }

    /// Stop reacting to anything; the persisted session is kept
    pub async fn terminate(&self) {
        self.publish(|s| s.state = SessionState::Terminated);
        if let Some(listener) = self.listener.lock().await.take() {
            listener.abort();
        }
        info!("Session manager terminated");
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> CrmResult<Profile> {
        for (field, value) in [("first_name", &update.first_name), ("last_name", &update.last_name)] {
            if let Some(value) = value {
                validation::validate_required(field, value).map_err(CrmError::ValidationFailed)?;
            }
        }
        self.write_profile(&update, None).await
    }

    pub async fn complete_onboarding(&self) -> CrmResult<Profile> {
        self.write_profile(&ProfileUpdate::default(), Some(true)).await
    }

    async fn write_profile(
        &self,
        update: &ProfileUpdate,
        onboarding_completed: Option<bool>,
    ) -> CrmResult<Profile> {
        let session = self.active_session().await?;
        let profile = self
            .profiles
            .update_profile(session.user.id, update, onboarding_completed)
            .await?;

        self.publish(|s| {
            if let Some(actor) = s.actor.as_mut().filter(|a| a.id == profile.id) {
                actor.profile = Some(profile.clone());
            }
        });
        self.store.set_actor(self.current_actor());
        Ok(profile)
    }
}

#[async_trait]
impl SessionSource for SessionManager {
    async fn active_session(&self) -> CrmResult<AuthSession> {
        SessionManager::active_session(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{MemoryAuthBackend, MemoryDataService},
        models::UserMetadata,
        persistence::{MemorySessionPersistence, SessionPersistence},
    };

    fn manager(auth: Arc<MemoryAuthBackend>) -> SessionManager {
        SessionManager::new(
            auth,
            Arc::new(MemoryDataService::new()),
            Arc::new(MemorySessionPersistence::new()),
            ClientStore::new(),
            SessionConfig::default(),
        )
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Authenticated.to_string(), "authenticated");
        assert_eq!(
            CrmError::InvalidState(SessionState::Terminated).to_string(),
            "Session manager is terminated"
        );
    }

    #[tokio::test]
    async fn test_initialize_runs_once() {
        let auth = Arc::new(MemoryAuthBackend::new());
        let manager = manager(auth);

        assert_eq!(manager.initialize().await, SessionState::Anonymous);
        assert!(manager.is_initialized());
        assert_eq!(manager.initialize().await, SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_login_requires_initialization() {
        let auth = Arc::new(MemoryAuthBackend::new());
        let manager = manager(auth);

        let result = manager.login("ada@example.com", "Secret123").await;
        assert!(matches!(
            result,
            Err(CrmError::InvalidState(SessionState::Uninitialized))
        ));
    }

    #[tokio::test]
    async fn test_terminated_manager_ignores_events() {
        let auth = Arc::new(MemoryAuthBackend::new());
        let user = auth
            .add_user("ada@example.com", "Secret123", UserMetadata::default())
            .await;
        let session = auth.issue_session(user.id).await.unwrap();
        let manager = manager(auth);
        manager.initialize().await;
        manager.terminate().await;

        manager.handle_event(AuthEvent::SignedIn(session)).await;
        assert_eq!(manager.state(), SessionState::Terminated);
        assert!(manager.current_actor().is_none());
        assert!(manager.logout().await.is_err());
    }

    #[tokio::test]
    async fn test_logout_before_initialization_clears_persisted_session() {
        let auth = Arc::new(MemoryAuthBackend::new());
        let user = auth
            .add_user("ada@example.com", "Secret123", UserMetadata::default())
            .await;
        let session = auth.issue_session(user.id).await.unwrap();
        let persistence = Arc::new(MemorySessionPersistence::with_session(session));
        let manager = SessionManager::new(
            auth,
            Arc::new(MemoryDataService::new()),
            persistence.clone(),
            ClientStore::new(),
            SessionConfig::default(),
        );

        assert!(manager.logout().await.is_ok());
        assert_eq!(manager.state(), SessionState::Uninitialized);
        assert!(persistence.load().await.unwrap().is_none());
        assert_eq!(manager.initialize().await, SessionState::Anonymous);
    }
}
