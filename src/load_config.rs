use crate::config::ClientConfig;
use anyhow::Result;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

pub const ENV_API_URL: &str = "TOASTATE_API_URL";
pub const ENV_API_VERSION: &str = "TOASTATE_API_VERSION";
pub const ENV_AUTH: &str = "TOASTATE_AUTH";

/// Loads a YAML config file and overlays the `TOASTATE_*` environment
/// variables on top of it. Secrets belong in the environment, not the file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ClientConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    // An empty file deserialises to `null`, which is not a mapping.
    let config: ClientConfig = if config_content.trim().is_empty() {
        ClientConfig::default()
    } else {
        match serde_yaml::from_str(&config_content) {
            Ok(conf) => {
                info!(config_path = ?path_ref, "Parsed config YAML successfully");
                conf
            }
            Err(e) => {
                error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
            }
        }
    };

    let config = apply_env(config)?;
    config.trace_loaded();
    Ok(config)
}

/// Defaults plus environment, for callers without a config file.
pub fn load_config_from_env() -> Result<ClientConfig> {
    let config = apply_env(ClientConfig::default())?;
    config.trace_loaded();
    Ok(config)
}

fn apply_env(mut config: ClientConfig) -> Result<ClientConfig> {
    if let Some(url) = non_empty_var(ENV_API_URL) {
        info!(api_url = %url, "TOASTATE_API_URL found in env");
        config.api_url = url;
    }
    if let Some(version) = non_empty_var(ENV_API_VERSION) {
        info!(api_version = %version, "TOASTATE_API_VERSION found in env");
        config.api_version = version;
    }
    if let Some(token) = non_empty_var(ENV_AUTH) {
        info!("TOASTATE_AUTH found in env");
        config.auth_token = Some(token);
    }

    if !config.api_url.starts_with("http://") && !config.api_url.starts_with("https://") {
        error!(api_url = %config.api_url, "api_url must be an http(s) URL");
        anyhow::bail!("api_url must start with http:// or https://, got {:?}", config.api_url);
    }
    if config.auth_token.is_none() {
        warn!("No auth token configured, only public endpoints will work");
    }
    Ok(config)
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
