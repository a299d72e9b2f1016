mod types;

pub use types::*;

use crate::{Error, Result};
use std::env;
use std::str::FromStr;
use tracing::debug;

/// Builds the process configuration: optional YAML base from `CONFIG_PATH`,
/// then environment overrides, then validation.
pub async fn load() -> Result<Config> {
    let base = match env::var("CONFIG_PATH") {
        Ok(config_path) => {
            debug!("Loading configuration from: {}", config_path);
            let config_str = tokio::fs::read_to_string(&config_path).await?;
            serde_yaml::from_str(&config_str)?
        }
        Err(_) => Config::default(),
    };

    let config = apply_overrides(base, |key| env::var(key).ok())?;
    config.validate()?;

    Ok(config)
}

/// Applies environment-style overrides read through `lookup`.
pub fn apply_overrides<F>(mut config: Config, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("HOST") {
        config.server.host = host;
    }
    if let Some(port) = lookup("PORT") {
        config.server.port = parse_var("PORT", &port)?;
    }
    if let Some(level) = lookup("LOG_LEVEL") {
        config.server.logs.level = level;
    }
    if let Some(dir) = lookup("STATIC_DIR") {
        config.server.static_dir = dir;
    }
    if let Some(dir) = lookup("UPLOAD_DIR") {
        config.server.upload_dir = dir;
    }
    if let Some(limit) = lookup("MAX_UPLOAD_BYTES") {
        config.server.max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", &limit)?;
    }
    if let Some(url) = lookup("OLLAMA_API_HOST") {
        config.upstream.base_url = url;
    }
    if let Some(ms) = lookup("REQUEST_TIMEOUT_MS") {
        config.upstream.request_timeout_ms = parse_var("REQUEST_TIMEOUT_MS", &ms)?;
    }
    if let Some(ms) = lookup("PULL_TIMEOUT_MS") {
        config.upstream.pull_timeout_ms = parse_var("PULL_TIMEOUT_MS", &ms)?;
    }
    if let Some(keep_alive) = lookup("OLLAMA_KEEP_ALIVE") {
        config.upstream.keep_alive = keep_alive;
    }

    Ok(config)
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{} has an invalid value: '{}'", key, value)))
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let base_url = &self.upstream.base_url;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::config(format!(
                "upstream base URL must be http(s): '{}'",
                base_url
            )));
        }

        if self.upstream.request_timeout_ms == 0 || self.upstream.pull_timeout_ms == 0 {
            return Err(Error::config("timeouts must be greater than zero"));
        }

        if self.upstream.pull_timeout_ms <= self.upstream.request_timeout_ms {
            return Err(Error::config(format!(
                "pull timeout ({}ms) must be longer than the request timeout ({}ms)",
                self.upstream.pull_timeout_ms, self.upstream.request_timeout_ms
            )));
        }

        Ok(())
    }
}
