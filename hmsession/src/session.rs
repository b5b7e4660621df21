use crate::api::{ApiError, Credentials, ProfileApi};
use crate::cache::{ProfileCache, TokenStore};
use crate::clock::{Clock, SystemClock};
use crate::codec;
use crate::config::SessionConfig;
use crate::guard::{GuardRejection, RouteDecision};
use crate::monitor::{ExpiryMonitor, ExpiryTrigger};
use crate::role::{has_permission, Permission};
use crate::storage::{Storage, StorageEvents, AUTH_TOKEN_KEY};
use crate::token::BearerToken;
use crate::types::SessionUser;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

//--------------------------------------------------------------------------------------------------
// Session state, as seen by the UI
//--------------------------------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub token: Option<BearerToken>,
    pub user: Option<SessionUser>,
    pub is_loading: bool,
    pub is_logged_in: bool,
}

impl SessionState {
    // Nothing is known until the first load settles
    fn initial() -> Self {
        SessionState {
            token: None,
            user: None,
            is_loading: true,
            is_logged_in: false,
        }
    }

    fn logged_out() -> Self {
        SessionState {
            token: None,
            user: None,
            is_loading: false,
            is_logged_in: false,
        }
    }

    fn logged_in(token: BearerToken, user: SessionUser) -> Self {
        SessionState {
            token: Some(token),
            user: Some(user),
            is_loading: false,
            is_logged_in: true,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Navigation to the login surface
//--------------------------------------------------------------------------------------------------

pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self, login_path: &str);
}

impl<F> Navigator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn redirect_to_login(&self, login_path: &str) {
        self(login_path)
    }
}

struct LogOnlyNavigator;

impl Navigator for LogOnlyNavigator {
    fn redirect_to_login(&self, login_path: &str) {
        debug!("No navigator attached, not redirecting to {}", login_path);
    }
}

//--------------------------------------------------------------------------------------------------
// Errors and reasons
//--------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("token is not a well-formed JWT")]
    MalformedToken,
    #[error("token has already expired")]
    ExpiredToken,
    #[error("credentials were rejected: {0}")]
    Rejected(#[source] ApiError),
    #[error("login request failed: {0}")]
    Request(#[source] ApiError),
    #[error("login was overtaken by a newer session change")]
    Superseded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogoutReason {
    Requested,
    Expired,
    InvalidToken,
    AuthRejected,
    ProfileUnavailable,
}

//--------------------------------------------------------------------------------------------------
// Builder
//--------------------------------------------------------------------------------------------------

pub struct SessionBuilder {
    storage: Arc<dyn Storage>,
    api: Arc<dyn ProfileApi>,
    clock: Arc<dyn Clock>,
    navigator: Arc<dyn Navigator>,
    config: SessionConfig,
}

impl SessionBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Session {
        let SessionBuilder {
            storage,
            api,
            clock,
            navigator,
            config,
        } = self;

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let monitor = ExpiryMonitor::new(
                clock.clone(),
                config.expiry_poll_interval(),
                move |token: &BearerToken, trigger: ExpiryTrigger| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_token_expired(token, trigger);
                    }
                },
            );
            let (state, _) = watch::channel(SessionState::initial());

            Inner {
                tokens: TokenStore::new(storage.clone()),
                cache: ProfileCache::new(storage.clone(), clock.clone(), config.refresh_interval()),
                storage,
                api,
                clock,
                navigator,
                config,
                monitor,
                state,
                sequence: Mutex::new(0),
                tasks: Mutex::new(Vec::new()),
            }
        });

        Session { inner }
    }
}

//--------------------------------------------------------------------------------------------------
// Session coordinator
//--------------------------------------------------------------------------------------------------

/// Owns the session state. Cheap to clone, every clone drives the same session.
///
/// Background timers and listeners stop when `shutdown` is called or the last clone is dropped.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    storage: Arc<dyn Storage>,
    tokens: TokenStore,
    cache: ProfileCache,
    api: Arc<dyn ProfileApi>,
    navigator: Arc<dyn Navigator>,
    monitor: ExpiryMonitor,
    state: watch::Sender<SessionState>,
    // Latest issued load/login/refresh; results from older calls are dropped
    sequence: Mutex<u64>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

impl Session {
    pub fn builder(storage: Arc<dyn Storage>, api: Arc<dyn ProfileApi>) -> SessionBuilder {
        SessionBuilder {
            storage,
            api,
            clock: Arc::new(SystemClock),
            navigator: Arc::new(LogOnlyNavigator),
            config: SessionConfig::default(),
        }
    }

    /// Rehydrates the session, then starts the refresh timer and the cross-context listener
    pub async fn start(&self) {
        // Subscribe first so a change made during the initial load isn't missed
        let events = self.inner.storage.subscribe();

        self.inner.load_session().await;

        let mut tasks = Vec::new();
        match events {
            Some(events) => tasks.push(tokio::spawn(watch_storage(
                Arc::downgrade(&self.inner),
                events,
            ))),
            None => debug!("Storage has no change feed, other contexts won't be followed"),
        }
        tasks.push(tokio::spawn(refresh_periodically(
            Arc::downgrade(&self.inner),
            self.inner.config.refresh_interval(),
        )));

        let previous = std::mem::replace(&mut *self.inner.tasks.lock(), tasks);
        for task in previous {
            task.abort();
        }
    }

    pub fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            task.abort();
        }
        self.inner.monitor.disarm();
        debug!("Session background work stopped");
    }

    pub async fn load_session(&self) {
        self.inner.load_session().await
    }

    /// Stores the token and enriches the user from the profile API.
    ///
    /// If a load for the same token settles first, that result is returned. `Superseded` means
    /// a logout or a different token took over while the profile was being fetched.
    pub async fn login(&self, token: BearerToken) -> Result<SessionUser, LoginError> {
        self.inner.login(token).await
    }

    pub async fn login_with_credentials(
        &self,
        credentials: Credentials,
    ) -> Result<SessionUser, LoginError> {
        let token = self.inner.api.login(&credentials).await.map_err(|err| {
            warn!("Login for {} failed: {}", credentials.email, err);
            if err.is_auth_error() {
                LoginError::Rejected(err)
            } else {
                LoginError::Request(err)
            }
        })?;

        self.inner.login(token).await
    }

    /// Safe to call any number of times
    pub fn logout(&self) {
        self.inner.force_logout(LogoutReason::Requested);
    }

    pub async fn refresh_user(&self) {
        self.inner.refresh_user().await
    }

    /// To be called when the host regains focus or returns to the foreground
    pub async fn on_focus(&self) {
        if self.inner.monitor.check_now() {
            return;
        }

        let settled_login = {
            let state = self.inner.state.borrow();
            state.is_logged_in && !state.is_loading
        };
        if settled_login && self.inner.cache.needs_refresh() {
            self.inner.load_session().await;
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn user(&self) -> Option<SessionUser> {
        self.inner.state.borrow().user.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.state.borrow().is_logged_in
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().is_loading
    }

    pub fn is_expiring_soon(&self) -> bool {
        let token = self.inner.state.borrow().token.clone();
        token.is_some_and(|token| {
            codec::is_expiring_soon(
                &token,
                self.inner.clock.now_ms(),
                self.inner.config.expiring_soon_buffer_ms(),
            )
        })
    }

    /// Waits for loading to settle, then yields the user or redirects to the login surface
    pub async fn require_login(&self) -> Result<SessionUser, GuardRejection> {
        let mut receiver = self.inner.state.subscribe();
        let settled = receiver
            .wait_for(|state| state.route_decision() != RouteDecision::Pending)
            .await
            .map(|state| (*state).clone());

        match settled {
            Ok(SessionState {
                user: Some(user),
                is_logged_in: true,
                ..
            }) => Ok(user),
            _ => {
                self.inner
                    .navigator
                    .redirect_to_login(&self.inner.config.login_path);
                Err(GuardRejection::LoginRequired)
            }
        }
    }

    /// UI gating only, the server makes the real decision
    pub async fn require_permission(
        &self,
        permission: Permission,
    ) -> Result<SessionUser, GuardRejection> {
        let user = self.require_login().await?;
        if has_permission(user.role_id, permission) {
            Ok(user)
        } else {
            Err(GuardRejection::Forbidden {
                role_name: user.role_name,
                permission,
            })
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Transitions
//--------------------------------------------------------------------------------------------------

impl Inner {
    fn begin(&self) -> u64 {
        let mut sequence = self.sequence.lock();
        *sequence += 1;
        *sequence
    }

    fn is_current(&self, seq: u64) -> bool {
        *self.sequence.lock() == seq
    }

    // Runs `apply` only if no newer call has started, and keeps newer calls out while it runs
    fn commit(&self, seq: u64, apply: impl FnOnce()) -> bool {
        let sequence = self.sequence.lock();
        if *sequence != seq {
            debug!("Discarding result of superseded session call {}", seq);
            return false;
        }
        apply();
        true
    }

    fn publish(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    fn force_logout(&self, reason: LogoutReason) {
        self.begin();
        self.monitor.disarm();
        self.tokens.clear();
        self.cache.clear();
        self.publish(SessionState::logged_out());

        match reason {
            LogoutReason::Requested => info!("Logged out"),
            _ => warn!("Session ended: {:?}", reason),
        }
        self.navigator.redirect_to_login(&self.config.login_path);
    }

    fn ensure_armed(&self, token: &BearerToken) {
        if self.monitor.armed_token().as_ref() != Some(token) {
            self.monitor.arm(token);
        }
    }

    fn on_token_expired(self: Arc<Self>, token: &BearerToken, trigger: ExpiryTrigger) {
        // Another context may already have stored a newer token; follow it instead of wiping it
        if let Ok(Some(stored)) = self.tokens.get() {
            if &stored != token && !codec::is_expired(&stored, self.clock.now_ms()) {
                debug!("Expired token was replaced ({:?}), reloading", trigger);
                let inner = self.clone();
                tokio::spawn(async move { inner.load_session().await });
                return;
            }
        }
        self.force_logout(LogoutReason::Expired);
    }

    async fn fetch_user(
        &self,
        token: &BearerToken,
        previous: Option<&SessionUser>,
    ) -> Result<SessionUser, ApiError> {
        let profile = self.api.current_profile(token).await?;

        let hospital_name = match self.api.hospital(token, profile.hospital_id).await {
            Ok(hospital) => Some(hospital.name),
            Err(err) if err.is_auth_error() => return Err(err),
            Err(err) => {
                warn!("Hospital {} lookup failed: {}", profile.hospital_id, err);
                previous
                    .filter(|user| user.hospital_id == profile.hospital_id)
                    .and_then(|user| user.hospital_name.clone())
            }
        };

        Ok(profile.into_session_user(hospital_name))
    }

    async fn load_session(&self) {
        let seq = self.begin();
        let (was_logged_in, held_token, held_user) = {
            let state = self.state.borrow();
            (state.is_logged_in, state.token.clone(), state.user.clone())
        };

        // An unreadable store only loses persistence, the session held in memory carries on
        let stored = match self.tokens.get() {
            Ok(stored) => stored,
            Err(err) => {
                warn!("Auth token could not be read, keeping the current session: {}", err);
                held_token.clone()
            }
        };

        let Some(token) = stored else {
            self.monitor.disarm();
            let applied = self.commit(seq, || self.publish(SessionState::logged_out()));
            if applied && was_logged_in {
                info!("Auth token was removed, session ended");
                self.navigator.redirect_to_login(&self.config.login_path);
            }
            return;
        };

        // Expiry is always decided before the cache or the network are touched
        let claims = match codec::decode_claims(&token) {
            Some(claims) if !claims.is_expired_at(self.clock.now_ms()) => claims,
            Some(_) => return self.force_logout(LogoutReason::Expired),
            None => return self.force_logout(LogoutReason::InvalidToken),
        };

        self.ensure_armed(&token);

        let cached = self.cache.get_for(claims.subject_id).or_else(|| {
            // The user already shown for this token stands in for a cache that can't be read
            held_user.filter(|_| held_token.as_ref() == Some(&token))
        });
        if let Some(user) = cached.clone().filter(|_| !self.cache.needs_refresh()) {
            debug!("Rehydrated user {} from the profile cache", user.user_id);
            self.commit(seq, || {
                self.publish(SessionState::logged_in(token.clone(), user))
            });
            return;
        }

        // Show the stale user, if any, while the profile is fetched
        let interim = SessionState {
            token: Some(token.clone()),
            user: cached.clone(),
            is_loading: cached.is_none(),
            is_logged_in: true,
        };
        if !self.commit(seq, || self.publish(interim)) {
            return;
        }

        match self.fetch_user(&token, cached.as_ref()).await {
            Ok(user) => {
                self.commit(seq, || {
                    self.cache.put(&user);
                    debug!("Profile for user {} refreshed", user.user_id);
                    self.publish(SessionState::logged_in(token.clone(), user));
                });
            }
            Err(err) if err.is_auth_error() => {
                if self.is_current(seq) {
                    warn!("Profile fetch was refused: {}", err);
                    self.force_logout(LogoutReason::AuthRejected);
                }
            }
            Err(err) => match cached {
                Some(_) => warn!("Profile refresh failed, keeping cached profile: {}", err),
                None => {
                    if self.is_current(seq) {
                        warn!("Profile fetch failed with nothing cached: {}", err);
                        self.force_logout(LogoutReason::ProfileUnavailable);
                    }
                }
            },
        }
    }

    async fn login(&self, token: BearerToken) -> Result<SessionUser, LoginError> {
        let Some(claims) = codec::decode_claims(&token) else {
            warn!("Refusing login with a malformed token");
            return Err(LoginError::MalformedToken);
        };
        if claims.is_expired_at(self.clock.now_ms()) {
            warn!("Refusing login with an expired token");
            return Err(LoginError::ExpiredToken);
        }

        let seq = self.begin();
        self.cache.clear();
        self.tokens.put(&token);

        // The claims are enough to show who signed in until the profile arrives
        let interim = codec::to_session_user(&claims);
        self.publish(SessionState {
            token: Some(token.clone()),
            user: Some(interim.clone()),
            is_loading: true,
            is_logged_in: true,
        });
        self.monitor.arm(&token);

        let user = match self.fetch_user(&token, None).await {
            Ok(user) => user,
            Err(err) if err.is_auth_error() => {
                if self.is_current(seq) {
                    self.force_logout(LogoutReason::AuthRejected);
                }
                return Err(LoginError::Rejected(err));
            }
            Err(err) => {
                warn!("Profile enrichment failed, using token claims: {}", err);
                interim
            }
        };

        let applied = self.commit(seq, || {
            self.cache.put(&user);
            self.publish(SessionState::logged_in(token.clone(), user.clone()));
        });
        if !applied {
            // A load for this same token overtook the enrichment, the login still stands
            let state = self.state.borrow();
            return match (&state.token, &state.user) {
                (Some(current), Some(user)) if state.is_logged_in && current == &token => {
                    Ok(user.clone())
                }
                _ => Err(LoginError::Superseded),
            };
        }

        info!("User {} logged in as {}", user.user_id, user.role_name);
        Ok(user)
    }

    async fn refresh_user(&self) {
        let (token, previous) = {
            let state = self.state.borrow();
            match (&state.token, state.is_logged_in, state.is_loading) {
                (Some(token), true, false) => (token.clone(), state.user.clone()),
                (_, true, true) => {
                    debug!("Session is already loading, skipping refresh");
                    return;
                }
                _ => {
                    debug!("Not logged in, nothing to refresh");
                    return;
                }
            }
        };

        if codec::is_expired(&token, self.clock.now_ms()) {
            return self.force_logout(LogoutReason::Expired);
        }

        let seq = self.begin();
        match self.fetch_user(&token, previous.as_ref()).await {
            Ok(user) => {
                self.commit(seq, || {
                    self.cache.put(&user);
                    self.publish(SessionState::logged_in(token.clone(), user));
                });
            }
            Err(err) if err.is_auth_error() => {
                if self.is_current(seq) {
                    warn!("Profile refresh was refused: {}", err);
                    self.force_logout(LogoutReason::AuthRejected);
                }
            }
            Err(err) => warn!("Profile refresh failed, keeping current user: {}", err),
        }
    }

    async fn periodic_check(&self) {
        let token = self.state.borrow().token.clone();
        let Some(token) = token else {
            return;
        };

        if codec::is_expired(&token, self.clock.now_ms()) {
            return self.force_logout(LogoutReason::Expired);
        }
        if self.cache.needs_refresh() {
            debug!("Cached profile is stale, reloading session");
            self.load_session().await;
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Background tasks, holding only weak references so they never keep a session alive
//--------------------------------------------------------------------------------------------------

async fn watch_storage(inner: Weak<Inner>, mut events: StorageEvents) {
    while let Some(event) = events.recv().await {
        if event.key != AUTH_TOKEN_KEY {
            continue;
        }
        let Some(session) = inner.upgrade() else {
            break;
        };
        debug!("Auth token changed in another context, reloading session");
        session.load_session().await;
    }
}

async fn refresh_periodically(inner: Weak<Inner>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(session) = inner.upgrade() else {
            break;
        };
        session.periodic_check().await;
    }
}

//--------------------------------------------------------------------------------------------------
