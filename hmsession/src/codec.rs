use crate::internal::claims::Claims;
use crate::internal::unixtime::UnixTimestamp;
use crate::role::role_name;
use crate::token::BearerToken;
use crate::types::SessionUser;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use tracing::{debug, warn};

//--------------------------------------------------------------------------------------------------
// Decoded claims
//--------------------------------------------------------------------------------------------------

pub const DEFAULT_EXPIRING_SOON_BUFFER_MS: i64 = 300_000;

/// Stands in for an identifier claim the token doesn't carry
pub const UNKNOWN_ID: i64 = 0;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenClaims {
    pub subject_id: i64,
    pub email: String,
    pub name: String,
    pub role_id: i64,
    pub hospital_id: i64,
    pub issued_at: Option<i64>,
    pub expires_at: Option<i64>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl From<Claims> for TokenClaims {
    fn from(claims: Claims) -> Self {
        TokenClaims {
            subject_id: claims.sub().unwrap_or(UNKNOWN_ID),
            email: claims.email().to_string(),
            name: claims.name().to_string(),
            role_id: claims.role_id().unwrap_or(UNKNOWN_ID),
            hospital_id: claims.hospital_id().unwrap_or(UNKNOWN_ID),
            issued_at: claims.iat().map(|ts| ts.seconds()),
            expires_at: claims.exp().map(|ts| ts.seconds()),
            issuer: claims.iss().cloned(),
            audience: claims.aud().cloned(),
        }
    }
}

impl TokenClaims {
    pub fn expiration_time_ms(&self) -> Option<i64> {
        self.expires_at
            .map(|exp| UnixTimestamp::from_seconds(exp).millis())
    }

    // A missing expiry means the token can't be trusted to still be live
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        match self.expiration_time_ms() {
            Some(expires_ms) => expires_ms < now_ms,
            None => true,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Decoding
//--------------------------------------------------------------------------------------------------

const TOKEN_SEGMENTS: usize = 3;

/// Decodes the claims of a bearer token without verifying its signature.
///
/// The result is only good for showing who is signed in before the server has been asked. It is
/// never an authorization decision. Any malformed input yields `None`.
pub fn decode_claims(token: &BearerToken) -> Option<TokenClaims> {
    let raw = token.as_str();

    let segments = raw.split('.').count();
    if segments != TOKEN_SEGMENTS {
        debug!("Token has {} segments, expected {}", segments, TOKEN_SEGMENTS);
        return None;
    }

    // Signature checks belong to the auth service, only the structure is checked here
    let mut options = Validation::new(Algorithm::HS256);
    options.insecure_disable_signature_validation();
    options.validate_exp = false;
    options.validate_nbf = false;
    options.validate_aud = false;
    options.required_spec_claims.clear();

    match decode::<Claims>(raw, &DecodingKey::from_secret(&[]), &options) {
        Ok(data) => Some(data.claims.into()),
        Err(err) => {
            match err.kind() {
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => {
                    warn!("Token is not a well-formed JWT: {:?}", err)
                }
                _ => warn!("Token claims could not be decoded: {:?}", err),
            }
            None
        }
    }
}

pub fn is_expired(token: &BearerToken, now_ms: i64) -> bool {
    decode_claims(token).map_or(true, |claims| claims.is_expired_at(now_ms))
}

pub fn is_expiring_soon(token: &BearerToken, now_ms: i64, buffer_ms: i64) -> bool {
    is_expired(token, now_ms.saturating_add(buffer_ms))
}

pub fn expiration_time_ms(token: &BearerToken) -> Option<i64> {
    decode_claims(token).and_then(|claims| claims.expiration_time_ms())
}

pub fn to_session_user(claims: &TokenClaims) -> SessionUser {
    SessionUser {
        user_id: claims.subject_id,
        name: claims.name.clone(),
        email: claims.email.clone(),
        role_id: claims.role_id,
        role_name: role_name(claims.role_id).to_string(),
        hospital_id: claims.hospital_id,
        hospital_name: None,
    }
}

//--------------------------------------------------------------------------------------------------
