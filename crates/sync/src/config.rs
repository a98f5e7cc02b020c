//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

/// Backend limit on actions per flush (one transactional write).
pub const DEFAULT_MAX_BATCH_SIZE: usize = 25;

/// Quiet period after the last enqueue before an automatic flush.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub api_url: String,
    pub profile_actions_path: String,
    pub content_actions_path: String,
    pub debounce: Duration,
    pub max_batch_size: usize,
    /// Directory for the local database. `None` resolves to the OS data dir.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            profile_actions_path: "/profile/actions/batch".to_string(),
            content_actions_path: "/crinz/actions/batch".to_string(),
            debounce: DEFAULT_DEBOUNCE,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            data_dir: None,
        }
    }
}

impl SyncConfig {
    /// Read overrides from `CRINZ_*` environment variables; anything unset
    /// keeps its default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup("CRINZ_API_URL") {
            config.api_url = url;
        }
        if let Some(path) = lookup("CRINZ_PROFILE_ACTIONS_PATH") {
            config.profile_actions_path = path;
        }
        if let Some(path) = lookup("CRINZ_CONTENT_ACTIONS_PATH") {
            config.content_actions_path = path;
        }
        if let Some(ms) = lookup("CRINZ_SYNC_DEBOUNCE_MS") {
            let parsed = ms.parse::<u64>().map_err(|_| ConfigError::Invalid {
                var: "CRINZ_SYNC_DEBOUNCE_MS",
                value: ms.clone(),
            })?;
            config.debounce = Duration::from_millis(parsed);
        }
        if let Some(size) = lookup("CRINZ_MAX_BATCH_SIZE") {
            config.max_batch_size = match size.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "CRINZ_MAX_BATCH_SIZE",
                        value: size,
                    });
                }
            };
        }
        if let Some(dir) = lookup("CRINZ_DATA_DIR") {
            config.data_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn profile_actions_url(&self) -> String {
        join_url(&self.api_url, &self.profile_actions_path)
    }

    pub fn content_actions_url(&self) -> String {
        join_url(&self.api_url, &self.content_actions_path)
    }

    /// Path of the local SQLite database: `{data_dir}/sync.db`.
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        let mut dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir()?,
        };
        dir.push("sync.db");
        Ok(dir)
    }
}

/// `{os_data_dir}/crinz`, falling back to `~/.local/share/crinz`.
fn default_data_dir() -> anyhow::Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .context("failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share")?;

    let mut dir = base;
    dir.push("crinz");
    Ok(dir)
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_backend_limits() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.max_batch_size, 25);
        assert_eq!(config.debounce, Duration::from_secs(2));
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("CRINZ_API_URL", "https://api.example.test/"),
            ("CRINZ_SYNC_DEBOUNCE_MS", "500"),
            ("CRINZ_DATA_DIR", "/tmp/crinz"),
        ]))
        .unwrap();

        assert_eq!(
            config.content_actions_url(),
            "https://api.example.test/crinz/actions/batch"
        );
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/tmp/crinz/sync.db")
        );
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        assert!(SyncConfig::from_lookup(lookup(&[("CRINZ_MAX_BATCH_SIZE", "0")])).is_err());
        assert!(SyncConfig::from_lookup(lookup(&[("CRINZ_SYNC_DEBOUNCE_MS", "soon")])).is_err());
    }
}
