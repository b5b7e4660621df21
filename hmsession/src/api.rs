use crate::token::BearerToken;
use crate::types::{Hospital, Profile};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// API errors
//--------------------------------------------------------------------------------------------------

const AUTH_ERROR_KEYWORDS: &[&str] = &[
    "unauthorized",
    "unauthenticated",
    "forbidden",
    "invalid token",
    "token expired",
    "jwt expired",
    "expired token",
];

#[derive(Clone, Debug, Error)]
pub enum ApiError {
    #[error("{path} returned {status}: {message}")]
    Status {
        path: String,
        status: u16,
        message: String,
    },
    #[error("{path} timed out")]
    Timeout { path: String },
    #[error("{path} could not be reached: {message}")]
    Transport { path: String, message: String },
    #[error("{path} returned an unreadable body: {message}")]
    Decode { path: String, message: String },
}

impl ApiError {
    /// Whether the server refused the credentials, as opposed to a failure that may go away
    pub fn is_auth_error(&self) -> bool {
        if let ApiError::Status {
            status: 401 | 403, ..
        } = self
        {
            return true;
        }

        let text = self.to_string().to_lowercase();
        AUTH_ERROR_KEYWORDS.iter().any(|keyword| text.contains(keyword))
    }
}

//--------------------------------------------------------------------------------------------------
// Login credentials
//--------------------------------------------------------------------------------------------------

#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// The part of the hospital API the session core consumes
//--------------------------------------------------------------------------------------------------

#[async_trait]
pub trait ProfileApi: Send + Sync {
    /// `POST /api/auth/login`
    async fn login(&self, credentials: &Credentials) -> Result<BearerToken, ApiError>;

    /// `GET /api/auth/me`
    async fn current_profile(&self, token: &BearerToken) -> Result<Profile, ApiError>;

    /// `GET /api/hospitals/{id}`
    async fn hospital(&self, token: &BearerToken, hospital_id: i64) -> Result<Hospital, ApiError>;
}

//--------------------------------------------------------------------------------------------------
// HTTP implementation
//--------------------------------------------------------------------------------------------------

#[cfg(feature = "http")]
pub use http::HttpProfileApi;

#[cfg(feature = "http")]
mod http {
    use super::{ApiError, Credentials, ProfileApi};
    use crate::token::BearerToken;
    use crate::types::{Hospital, Profile};
    use async_trait::async_trait;
    use reqwest::header::{ACCEPT, AUTHORIZATION};
    use reqwest::{Client, RequestBuilder};
    use serde::de::DeserializeOwned;
    use serde::Deserialize;
    use std::time::Duration;
    use tracing::{debug, warn};

    const LOGIN_PATH: &str = "/api/auth/login";
    const PROFILE_PATH: &str = "/api/auth/me";
    const MAX_ERROR_MESSAGE_LEN: usize = 200;

    // Some endpoints wrap their payload in `{ "data": ... }`
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Envelope<T> {
        Wrapped { data: T },
        Bare(T),
    }

    impl<T> Envelope<T> {
        fn into_inner(self) -> T {
            match self {
                Envelope::Wrapped { data } => data,
                Envelope::Bare(inner) => inner,
            }
        }
    }

    #[derive(Deserialize)]
    struct LoginResponse {
        #[serde(alias = "access_token")]
        token: String,
    }

    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(alias = "error", alias = "detail")]
        message: String,
    }

    pub struct HttpProfileApi {
        base_url: String,
        client: Client,
    }

    impl HttpProfileApi {
        pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
            let base_url = base_url.into().trim_end_matches('/').to_string();
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|err| ApiError::Transport {
                    path: base_url.clone(),
                    message: err.to_string(),
                })?;

            Ok(HttpProfileApi { base_url, client })
        }

        async fn send<T: DeserializeOwned>(
            &self,
            path: &str,
            request: RequestBuilder,
        ) -> Result<T, ApiError> {
            let transport_error = |err: reqwest::Error| {
                if err.is_timeout() {
                    ApiError::Timeout {
                        path: path.to_string(),
                    }
                } else {
                    ApiError::Transport {
                        path: path.to_string(),
                        message: err.to_string(),
                    }
                }
            };

            let response = request
                .header(ACCEPT, "application/json")
                .send()
                .await
                .map_err(transport_error)?;
            let status = response.status();
            let body = response.text().await.map_err(transport_error)?;

            if !status.is_success() {
                warn!("{} returned {}", path, status);
                return Err(ApiError::Status {
                    path: path.to_string(),
                    status: status.as_u16(),
                    message: error_message(&body),
                });
            }

            debug!("{} returned {}", path, status);
            serde_json::from_str::<Envelope<T>>(&body)
                .map(Envelope::into_inner)
                .map_err(|err| ApiError::Decode {
                    path: path.to_string(),
                    message: err.to_string(),
                })
        }

        fn get(&self, path: &str, token: &BearerToken) -> RequestBuilder {
            self.client
                .get(format!("{}{}", self.base_url, path))
                .header(AUTHORIZATION, token.authorization_header())
        }
    }

    fn error_message(body: &str) -> String {
        if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
            return parsed.message;
        }
        body.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
    }

    #[async_trait]
    impl ProfileApi for HttpProfileApi {
        async fn login(&self, credentials: &Credentials) -> Result<BearerToken, ApiError> {
            let request = self
                .client
                .post(format!("{}{}", self.base_url, LOGIN_PATH))
                .json(credentials);
            let response: LoginResponse = self.send(LOGIN_PATH, request).await?;
            Ok(BearerToken::new(response.token))
        }

        async fn current_profile(&self, token: &BearerToken) -> Result<Profile, ApiError> {
            self.send(PROFILE_PATH, self.get(PROFILE_PATH, token)).await
        }

        async fn hospital(
            &self,
            token: &BearerToken,
            hospital_id: i64,
        ) -> Result<Hospital, ApiError> {
            let path = format!("/api/hospitals/{}", hospital_id);
            self.send(&path, self.get(&path, token)).await
        }
    }

}

//--------------------------------------------------------------------------------------------------
