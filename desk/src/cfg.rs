use hmsession::SessionConfig;
use serde::Deserialize;

//--------------------------------------------------------------------------------------------------
// Config to be read from file
//--------------------------------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_storage_path() -> String {
    "hms-session.json".to_string()
}

//--------------------------------------------------------------------------------------------------
