use serde::Deserialize;
use std::time::Duration;

//--------------------------------------------------------------------------------------------------
// Session configuration
//--------------------------------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub refresh_interval_ms: u64,
    pub expiry_poll_interval_ms: u64,
    pub expiring_soon_buffer_ms: u64,
    pub login_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            api_base_url: "http://localhost:8000".to_string(),
            request_timeout_ms: 30_000,
            refresh_interval_ms: 600_000,
            expiry_poll_interval_ms: 30_000,
            expiring_soon_buffer_ms: 300_000,
            login_path: "/login".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    // Both intervals drive tokio intervals, which panic on zero
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }

    pub fn expiry_poll_interval(&self) -> Duration {
        Duration::from_millis(self.expiry_poll_interval_ms.max(1))
    }

    pub fn expiring_soon_buffer_ms(&self) -> i64 {
        i64::try_from(self.expiring_soon_buffer_ms).unwrap_or(i64::MAX)
    }
}

//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: SessionConfig =
            serde_json::from_str(r#"{"api_base_url":"https://hms.example"}"#).unwrap();

        assert_eq!(cfg.api_base_url, "https://hms.example");
        assert_eq!(cfg.refresh_interval(), Duration::from_secs(600));
        assert_eq!(cfg.expiry_poll_interval(), Duration::from_secs(30));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.login_path, "/login");
    }
}
