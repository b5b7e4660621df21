use crate::role::role_name;
use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Session user, as shown to the UI and persisted in the profile cache
//--------------------------------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub role_id: i64,
    pub role_name: String,
    pub hospital_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital_name: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Types returned by the hospital API
//--------------------------------------------------------------------------------------------------

// The API uses snake_case, no renaming needed

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub role_id: i64,
    pub hospital_id: i64,
}

impl Profile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    pub fn into_session_user(self, hospital_name: Option<String>) -> SessionUser {
        SessionUser {
            name: self.full_name(),
            user_id: self.id,
            email: self.email,
            role_id: self.role_id,
            role_name: role_name(self.role_id).to_string(),
            hospital_id: self.hospital_id,
            hospital_name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Hospital {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

//--------------------------------------------------------------------------------------------------
