use crate::clock::Clock;
use crate::storage::{Storage, StorageError, AUTH_TOKEN_KEY, LAST_REFRESH_KEY, USER_DATA_KEY};
use crate::token::BearerToken;
use crate::types::SessionUser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

//--------------------------------------------------------------------------------------------------
// Token store
//--------------------------------------------------------------------------------------------------

// Writes are best effort: a store that can't be used just means no persistence. Reads report the
// failure, since an unreadable token is not the same as no token.

pub struct TokenStore {
    storage: Arc<dyn Storage>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        TokenStore { storage }
    }

    pub fn get(&self) -> Result<Option<BearerToken>, StorageError> {
        let raw = self.storage.get(AUTH_TOKEN_KEY)?;
        Ok(raw
            .map(BearerToken::new)
            .filter(|token| !token.is_empty()))
    }

    pub fn put(&self, token: &BearerToken) {
        if let Err(err) = self.storage.set(AUTH_TOKEN_KEY, token.as_str()) {
            error!("Failed to store auth token: {}", err);
        }
    }

    pub fn clear(&self) {
        if let Err(err) = self.storage.remove(AUTH_TOKEN_KEY) {
            error!("Failed to remove auth token: {}", err);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Profile cache
//--------------------------------------------------------------------------------------------------

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(600_000);

/// The last known user plus when it was fetched, so a reload can render straight away while a
/// refresh happens in the background.
pub struct ProfileCache {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    refresh_interval_ms: i64,
}

impl ProfileCache {
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, refresh_interval: Duration) -> Self {
        ProfileCache {
            storage,
            clock,
            refresh_interval_ms: i64::try_from(refresh_interval.as_millis()).unwrap_or(i64::MAX),
        }
    }

    pub fn get(&self) -> Option<SessionUser> {
        let raw = match self.storage.get(USER_DATA_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                error!("Failed to read cached profile: {}", err);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(err) => {
                warn!("Cached profile could not be decoded, ignoring it: {}", err);
                None
            }
        }
    }

    /// The cached user, but only if it belongs to the given subject
    pub fn get_for(&self, subject_id: i64) -> Option<SessionUser> {
        let user = self.get()?;
        if user.user_id != subject_id {
            debug!(
                "Cached profile is for user {}, token is for {}",
                user.user_id, subject_id
            );
            return None;
        }
        Some(user)
    }

    pub fn put(&self, user: &SessionUser) {
        let encoded = match serde_json::to_string(user) {
            Ok(encoded) => encoded,
            Err(err) => {
                error!("Failed to encode profile for caching: {}", err);
                return;
            }
        };

        if let Err(err) = self.storage.set(USER_DATA_KEY, &encoded) {
            error!("Failed to cache profile: {}", err);
        }
        let now = self.clock.now_ms().to_string();
        if let Err(err) = self.storage.set(LAST_REFRESH_KEY, &now) {
            error!("Failed to record profile refresh time: {}", err);
        }
    }

    pub fn last_refresh_ms(&self) -> i64 {
        match self.storage.get(LAST_REFRESH_KEY) {
            Ok(Some(raw)) => raw.trim().parse().unwrap_or(0),
            Ok(None) => 0,
            Err(err) => {
                error!("Failed to read profile refresh time: {}", err);
                0
            }
        }
    }

    pub fn needs_refresh(&self) -> bool {
        self.clock.now_ms().saturating_sub(self.last_refresh_ms()) > self.refresh_interval_ms
    }

    pub fn is_fresh(&self) -> bool {
        self.get().is_some() && !self.needs_refresh()
    }

    pub fn clear(&self) {
        for key in [USER_DATA_KEY, LAST_REFRESH_KEY] {
            if let Err(err) = self.storage.remove(key) {
                error!("Failed to remove {}: {}", key, err);
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
