use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/api/v1";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("failed to read .env: {0}")]
    Dotenv(#[from] dotenvy::Error),

    #[error("cannot resolve working directory: {0}")]
    WorkingDir(#[from] std::io::Error),
}

/// Bearer credential sent with every request.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into().trim().to_string(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn is_empty(&self) -> bool {
        self.api_key.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = if self.is_empty() { "<unset>" } else { "<redacted>" };
        f.debug_struct("Credentials").field("api_key", &shown).finish()
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

/// Fixed-interval polling budget. Total wait is bounded by `interval * max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_attempts: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credentials: Credentials,
    pub service: ServiceConfig,
    pub polling: PollSettings,
    pub history_path: PathBuf,
}

impl AppConfig {
    /// Load from `.env` (if present) and the process environment.
    ///
    /// | Env Var                          | Default                       |
    /// |----------------------------------|-------------------------------|
    /// | `DASHSCOPE_API_KEY`              | empty (submission will fail)  |
    /// | `DASHSCOPE_BASE_URL`             | DashScope public endpoint     |
    /// | `CLIPFORGE_POLL_INTERVAL_SECS`   | `30`                          |
    /// | `CLIPFORGE_POLL_MAX_ATTEMPTS`    | `30`                          |
    /// | `CLIPFORGE_REQUEST_TIMEOUT_SECS` | `60`                          |
    /// | `CLIPFORGE_HISTORY_PATH`         | `./outputs/history`           |
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let default_history = env::current_dir()?.join("outputs/history");
        Self::from_lookup(|key| env::var(key).ok(), default_history)
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        default_history: PathBuf,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let seconds = |var: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(var) {
                None => Ok(default),
                Some(raw) => match raw.parse::<u64>() {
                    Ok(value) if value > 0 => Ok(value),
                    _ => Err(ConfigError::InvalidNumber { var, value: raw }),
                },
            }
        };

        let interval = seconds("CLIPFORGE_POLL_INTERVAL_SECS", 30)?;
        let max_attempts = seconds("CLIPFORGE_POLL_MAX_ATTEMPTS", 30)?;
        let max_attempts = u32::try_from(max_attempts).map_err(|_| ConfigError::InvalidNumber {
            var: "CLIPFORGE_POLL_MAX_ATTEMPTS",
            value: max_attempts.to_string(),
        })?;
        let timeout = seconds("CLIPFORGE_REQUEST_TIMEOUT_SECS", 60)?;

        Ok(Self {
            credentials: Credentials::new(get("DASHSCOPE_API_KEY").unwrap_or_default()),
            service: ServiceConfig {
                base_url: get("DASHSCOPE_BASE_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                request_timeout: Duration::from_secs(timeout),
            },
            polling: PollSettings {
                interval: Duration::from_secs(interval),
                max_attempts,
            },
            history_path: get("CLIPFORGE_HISTORY_PATH")
                .map(PathBuf::from)
                .unwrap_or(default_history),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[]), PathBuf::from("/tmp/h")).unwrap();
        assert!(config.credentials.is_empty());
        assert_eq!(config.service.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.polling, PollSettings::default());
        assert_eq!(config.history_path, PathBuf::from("/tmp/h"));
    }

    #[test]
    fn reads_overrides() {
        let config = AppConfig::from_lookup(
            lookup(&[
                ("DASHSCOPE_API_KEY", " sk-test "),
                ("DASHSCOPE_BASE_URL", "http://localhost:9000/api/v1/"),
                ("CLIPFORGE_POLL_INTERVAL_SECS", "5"),
                ("CLIPFORGE_POLL_MAX_ATTEMPTS", "12"),
            ]),
            PathBuf::from("/tmp/h"),
        )
        .unwrap();
        assert_eq!(config.credentials.api_key(), "sk-test");
        assert_eq!(config.service.base_url, "http://localhost:9000/api/v1");
        assert_eq!(config.polling.interval, Duration::from_secs(5));
        assert_eq!(config.polling.max_attempts, 12);
    }

    #[test]
    fn rejects_malformed_numbers() {
        let err = AppConfig::from_lookup(
            lookup(&[("CLIPFORGE_POLL_INTERVAL_SECS", "soon")]),
            PathBuf::from("/tmp/h"),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber { var: "CLIPFORGE_POLL_INTERVAL_SECS", .. }
        ));
    }

    #[test]
    fn debug_output_hides_the_key() {
        let rendered = format!("{:?}", Credentials::new("sk-secret"));
        assert!(!rendered.contains("sk-secret"));
    }
}
