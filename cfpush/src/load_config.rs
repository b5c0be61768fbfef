/// `load_config` module: reads the YAML connection settings for the CLI and injects the access
/// token from the environment.
///
/// The file holds no secrets by default; `CF_ACCESS_TOKEN` (from the process environment or a
/// `.env` file already loaded by `main`) wins over any `access_token` key in the file.
///
/// ```yaml
/// api_endpoint: https://api.example.com
/// polling_throttle_ms: 1000
/// resource_match_fallback: true
/// ```
///
/// # Errors
/// All errors use `anyhow::Error` and name the config path.
use anyhow::Result;
use cfpush_core::config::Config;
use std::fs;
use std::path::Path;
use tracing::{error, info};

pub const ACCESS_TOKEN_ENV: &str = "CF_ACCESS_TOKEN";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: Config = match serde_yaml::from_str(&config_content) {
        Ok(conf) => conf,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!(
                "Failed to parse config YAML {:?}: {e}",
                path_ref
            ));
        }
    };

    if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
        if !token.is_empty() {
            info!(env = ACCESS_TOKEN_ENV, "Using access token from environment");
            config.access_token = token;
        }
    }

    if config.api_endpoint.trim().is_empty() {
        error!(config_path = ?path_ref, "Config has an empty api_endpoint");
        return Err(anyhow::anyhow!(
            "Config {:?} has an empty api_endpoint",
            path_ref
        ));
    }

    config.trace_loaded();
    Ok(config)
}
