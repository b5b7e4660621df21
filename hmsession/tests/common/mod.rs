#![allow(dead_code)]

use async_trait::async_trait;
use hmsession::{
    ApiError, BearerToken, Clock, Credentials, Hospital, ManualClock, MemoryStorage, Navigator,
    Profile, ProfileApi, Session, SessionConfig,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

//--------------------------------------------------------------------------------------------------
// Tokens
//--------------------------------------------------------------------------------------------------

pub const NOW_SECS: i64 = 1_760_000_000;
pub const NOW_MS: i64 = NOW_SECS * 1000;

pub fn mint(subject_id: i64, expires_at: i64) -> BearerToken {
    let claims = json!({
        "sub": subject_id.to_string(),
        "email": format!("user{}@clinic.test", subject_id),
        "name": format!("Token User {}", subject_id),
        "role_id": 2,
        "hospital_id": 1,
        "iat": NOW_SECS - 60,
        "exp": expires_at,
        "iss": "hms-auth",
        "aud": "hms-web",
    });
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"integration-secret"),
    )
    .unwrap();
    BearerToken::new(token)
}

pub fn profile(id: i64, first_name: &str) -> Profile {
    Profile {
        id,
        email: format!("user{}@clinic.test", id),
        first_name: first_name.to_string(),
        last_name: "Adeyemi".to_string(),
        role_id: 2,
        hospital_id: 1,
    }
}

pub fn hospital() -> Hospital {
    Hospital {
        id: 1,
        name: "Lagos General".to_string(),
        address: None,
        phone: None,
        email: None,
        is_active: Some(true),
    }
}

pub fn unauthorized() -> ApiError {
    ApiError::Status {
        path: "/api/auth/me".to_string(),
        status: 401,
        message: "Unauthorized".to_string(),
    }
}

pub fn unreachable() -> ApiError {
    ApiError::Transport {
        path: "/api/auth/me".to_string(),
        message: "connection refused".to_string(),
    }
}

//--------------------------------------------------------------------------------------------------
// Scripted API
//--------------------------------------------------------------------------------------------------

type Scripted<T> = (Duration, Result<T, ApiError>);

pub struct ScriptedApi {
    profiles: Mutex<VecDeque<Scripted<Profile>>>,
    default_profile: Mutex<Result<Profile, ApiError>>,
    hospital: Mutex<Result<Hospital, ApiError>>,
    login: Mutex<Result<BearerToken, ApiError>>,
    pub profile_calls: AtomicUsize,
    pub hospital_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn new(default_profile: Profile) -> Arc<Self> {
        Arc::new(ScriptedApi {
            profiles: Mutex::new(VecDeque::new()),
            default_profile: Mutex::new(Ok(default_profile)),
            hospital: Mutex::new(Ok(hospital())),
            login: Mutex::new(Err(unauthorized())),
            profile_calls: AtomicUsize::new(0),
            hospital_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
        })
    }

    /// Answer for the next profile call only
    pub fn push_profile(&self, delay: Duration, result: Result<Profile, ApiError>) {
        self.profiles.lock().push_back((delay, result));
    }

    pub fn set_profile(&self, result: Result<Profile, ApiError>) {
        *self.default_profile.lock() = result;
    }

    pub fn set_hospital(&self, result: Result<Hospital, ApiError>) {
        *self.hospital.lock() = result;
    }

    pub fn set_login(&self, result: Result<BearerToken, ApiError>) {
        *self.login.lock() = result;
    }

    pub fn network_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
            + self.hospital_calls.load(Ordering::SeqCst)
            + self.login_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileApi for ScriptedApi {
    async fn login(&self, _credentials: &Credentials) -> Result<BearerToken, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login.lock().clone()
    }

    async fn current_profile(&self, _token: &BearerToken) -> Result<Profile, ApiError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.profiles.lock().pop_front();
        match scripted {
            Some((delay, result)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            None => self.default_profile.lock().clone(),
        }
    }

    async fn hospital(&self, _token: &BearerToken, _hospital_id: i64) -> Result<Hospital, ApiError> {
        self.hospital_calls.fetch_add(1, Ordering::SeqCst);
        self.hospital.lock().clone()
    }
}

//--------------------------------------------------------------------------------------------------
// Navigator that counts redirects
//--------------------------------------------------------------------------------------------------

#[derive(Default)]
pub struct CountingNavigator {
    pub redirects: AtomicUsize,
}

impl CountingNavigator {
    pub fn count(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

impl Navigator for CountingNavigator {
    fn redirect_to_login(&self, login_path: &str) {
        assert_eq!(login_path, "/login");
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}

//--------------------------------------------------------------------------------------------------
// Harness
//--------------------------------------------------------------------------------------------------

pub struct Harness {
    pub session: Session,
    pub storage: MemoryStorage,
    pub api: Arc<ScriptedApi>,
    pub clock: Arc<ManualClock>,
    pub navigator: Arc<CountingNavigator>,
}

impl Harness {
    pub fn new(api: Arc<ScriptedApi>) -> Self {
        Harness::on_storage(MemoryStorage::new(), api, Arc::new(ManualClock::new(NOW_MS)))
    }

    pub fn on_storage(storage: MemoryStorage, api: Arc<ScriptedApi>, clock: Arc<ManualClock>) -> Self {
        Harness::with_config(storage, api, clock, SessionConfig::default())
    }

    pub fn with_config(
        storage: MemoryStorage,
        api: Arc<ScriptedApi>,
        clock: Arc<ManualClock>,
        config: SessionConfig,
    ) -> Self {
        let navigator = Arc::new(CountingNavigator::default());
        let session = Session::builder(Arc::new(storage.clone()), api.clone())
            .clock(clock.clone() as Arc<dyn Clock>)
            .navigator(navigator.clone())
            .config(config)
            .build();

        Harness {
            session,
            storage,
            api,
            clock,
            navigator,
        }
    }
}
