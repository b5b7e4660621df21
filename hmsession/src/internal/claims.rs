use crate::internal::unixtime::UnixTimestamp;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

//--------------------------------------------------------------------------------------------------
// JWT Claims object, as issued by the hospital auth service
//--------------------------------------------------------------------------------------------------

#[derive(Deserialize)]
pub(crate) struct Claims {
    #[serde(default, deserialize_with = "integer_or_string")]
    sub: Option<i64>,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
    #[serde(default, deserialize_with = "integer_or_string")]
    role_id: Option<i64>,
    #[serde(default, deserialize_with = "integer_or_string")]
    hospital_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    iat: Option<UnixTimestamp>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    exp: Option<UnixTimestamp>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default, deserialize_with = "single_audience")]
    aud: Option<String>,
}

impl Claims {
    pub(crate) fn sub(&self) -> Option<i64> {
        self.sub
    }

    pub(crate) fn email(&self) -> &str {
        &self.email
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn role_id(&self) -> Option<i64> {
        self.role_id
    }

    pub(crate) fn hospital_id(&self) -> Option<i64> {
        self.hospital_id
    }

    pub(crate) fn iat(&self) -> Option<UnixTimestamp> {
        self.iat
    }

    pub(crate) fn exp(&self) -> Option<UnixTimestamp> {
        self.exp
    }

    pub(crate) fn iss(&self) -> Option<&String> {
        self.iss.as_ref()
    }

    pub(crate) fn aud(&self) -> Option<&String> {
        self.aud.as_ref()
    }
}

//--------------------------------------------------------------------------------------------------
// Field helpers
//--------------------------------------------------------------------------------------------------

// The subject is string-encoded by the auth service, the other ids are usually numbers. Anything
// else reads as absent rather than spoiling the whole token.
fn integer_or_string<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let id = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    Ok(id)
}

// A timestamp that isn't numeric is treated the same as a missing one
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<UnixTimestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let seconds = value.and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)));
    Ok(seconds.map(UnixTimestamp::from_seconds))
}

fn single_audience<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let audience = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Array(values)) => values
            .into_iter()
            .find_map(|v| v.as_str().map(str::to_string)),
        _ => None,
    };
    Ok(audience)
}

//--------------------------------------------------------------------------------------------------
