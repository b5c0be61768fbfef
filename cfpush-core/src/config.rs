use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::info;

/// Connection settings consumed from the caller's config/auth layer.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the Cloud Controller API, e.g. `https://api.example.com`.
    pub api_endpoint: String,
    /// Value sent verbatim in the `Authorization` header (`bearer <token>`).
    #[serde(default)]
    pub access_token: String,
    /// Delay between job status polls. Zero polls as fast as the transport allows.
    #[serde(default = "default_polling_throttle_ms")]
    pub polling_throttle_ms: u64,
    /// Upload everything when the resource-match endpoint is unsupported.
    #[serde(default = "default_resource_match_fallback")]
    pub resource_match_fallback: bool,
}

fn default_polling_throttle_ms() -> u64 {
    1000
}

fn default_resource_match_fallback() -> bool {
    true
}

impl Config {
    pub fn new(api_endpoint: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            api_endpoint: api_endpoint.into(),
            access_token: access_token.into(),
            polling_throttle_ms: default_polling_throttle_ms(),
            resource_match_fallback: default_resource_match_fallback(),
        }
    }

    pub fn with_polling_throttle(mut self, throttle: Duration) -> Self {
        self.polling_throttle_ms = throttle.as_millis() as u64;
        self
    }

    pub fn polling_throttle(&self) -> Duration {
        Duration::from_millis(self.polling_throttle_ms)
    }

    /// Resolves a server-relative path (`/v2/jobs/...`, a `next_url`) against the endpoint.
    /// Absolute URLs are returned unchanged.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.api_endpoint.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            api_endpoint = %self.api_endpoint,
            polling_throttle_ms = self.polling_throttle_ms,
            resource_match_fallback = self.resource_match_fallback,
            access_token_set = !self.access_token.is_empty(),
            "Loaded Config"
        );
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.access_token.is_empty() {
            ""
        } else {
            "<redacted>"
        };
        f.debug_struct("Config")
            .field("api_endpoint", &self.api_endpoint)
            .field("access_token", &token)
            .field("polling_throttle_ms", &self.polling_throttle_ms)
            .field("resource_match_fallback", &self.resource_match_fallback)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_relative_paths_onto_the_endpoint() {
        let config = Config::new("https://api.example.com/", "bearer t");
        assert_eq!(
            config.url("/v2/jobs/my-job-guid"),
            "https://api.example.com/v2/jobs/my-job-guid"
        );
        assert_eq!(
            config.url("v2/routes?page=2"),
            "https://api.example.com/v2/routes?page=2"
        );
        assert_eq!(
            config.url("http://other.example.com/v2/spaces"),
            "http://other.example.com/v2/spaces"
        );
    }

    #[test]
    fn defaults_apply_when_fields_are_missing() {
        let config: Config =
            serde_json::from_str(r#"{"api_endpoint": "https://api.example.com"}"#).unwrap();
        assert_eq!(config.polling_throttle(), Duration::from_secs(1));
        assert!(config.resource_match_fallback);
        assert!(config.access_token.is_empty());
    }

    #[test]
    fn debug_output_redacts_the_token() {
        let config = Config::new("https://api.example.com", "bearer s3cr3t-token");
        let printed = format!("{config:?}");
        assert!(!printed.contains("s3cr3t-token"), "{printed}");
        assert!(printed.contains("<redacted>"));
        assert!(printed.contains("https://api.example.com"));
    }

    #[test]
    fn zero_throttle_is_allowed() {
        let config = Config::new("https://api.example.com", "").with_polling_throttle(Duration::ZERO);
        assert_eq!(config.polling_throttle(), Duration::ZERO);
    }
}
