use crate::token::BearerToken;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::json;

//--------------------------------------------------------------------------------------------------
// Shared helpers for unit tests
//--------------------------------------------------------------------------------------------------

pub(crate) const NOW_SECS: i64 = 1_760_000_000;
pub(crate) const NOW_MS: i64 = NOW_SECS * 1000;

pub(crate) fn mint_token(subject_id: i64, expires_at: i64) -> BearerToken {
    let claims = json!({
        "sub": subject_id.to_string(),
        "email": "staff@clinic.test",
        "name": "Clinic Staff",
        "role_id": 3,
        "hospital_id": 1,
        "iat": NOW_SECS,
        "exp": expires_at,
    });
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"unit-test-secret"),
    )
    .expect("test token");
    BearerToken::new(token)
}
