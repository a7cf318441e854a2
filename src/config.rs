use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// In-memory store when unset
    pub database_url: Option<String>,

    pub jwt_secret: String,

    #[serde(default = "default_jwt_ttl_secs")]
    pub jwt_ttl_secs: u64,

    /// Key for signing the OAuth `state` parameter; falls back to `jwt_secret`
    pub oauth_state_secret: Option<String>,

    #[serde(default = "default_oauth_redirect_uri")]
    pub oauth_redirect_uri: String,

    #[serde(default = "default_scheduler_interval_ms")]
    pub scheduler_interval_ms: u64,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_spotify_api_base_url")]
    pub spotify_api_base_url: String,

    #[serde(default = "default_spotify_token_url")]
    pub spotify_token_url: String,

    #[serde(default = "default_rust_log")]
    pub rust_log: String,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_jwt_ttl_secs() -> u64 {
    2 * 60 * 60
}

fn default_oauth_redirect_uri() -> String {
    "http://localhost:8080/services/callback".to_string()
}

fn default_scheduler_interval_ms() -> u64 {
    5000
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_spotify_api_base_url() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_spotify_token_url() -> String {
    "https://accounts.spotify.com/api/token".to_string()
}

fn default_rust_log() -> String {
    "info,areaflow=debug".to_string()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn state_secret(&self) -> &str {
        self.oauth_state_secret.as_deref().unwrap_or(&self.jwt_secret)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Configuration suitable for unit tests: in-memory store, local URLs
    pub fn for_tests() -> Self {
        Config {
            port: 8080,
            host: "127.0.0.1".to_string(),
            database_url: None,
            jwt_secret: "test_jwt_secret".to_string(),
            jwt_ttl_secs: default_jwt_ttl_secs(),
            oauth_state_secret: None,
            oauth_redirect_uri: default_oauth_redirect_uri(),
            scheduler_interval_ms: default_scheduler_interval_ms(),
            http_timeout_secs: 2,
            spotify_api_base_url: "http://127.0.0.1:9/v1".to_string(),
            spotify_token_url: "http://127.0.0.1:9/api/token".to_string(),
            rust_log: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_secret_falls_back_to_jwt_secret() {
        let mut config = Config::for_tests();
        assert_eq!(config.state_secret(), "test_jwt_secret");

        config.oauth_state_secret = Some("state_secret".to_string());
        assert_eq!(config.state_secret(), "state_secret");
    }

    #[test]
    fn test_durations() {
        let config = Config::for_tests();
        assert_eq!(config.scheduler_interval(), Duration::from_millis(5000));
        assert_eq!(config.http_timeout(), Duration::from_secs(2));
    }
}
