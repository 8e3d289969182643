//! Environment-driven configuration for the access layer.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

use crate::error::{AppError, AppResult};

pub const ENV_API_URL: &str = "INVENTORY_API_URL";
pub const ENV_SESSION_DIR: &str = "INVENTORY_SESSION_DIR";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "INVENTORY_HTTP_TIMEOUT_SECS";

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_SESSION_DIR: &str = ".inventory-session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: Url,
    pub session_dir: PathBuf,
    /// `None` leaves the HTTP client's own default in place.
    pub request_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = lookup(ENV_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = Url::parse(raw_url.trim())
            .map_err(|e| AppError::config("invalid_api_url".to_string(), format!("{ENV_API_URL}='{raw_url}': {e}")))?;
        let session_dir = lookup(ENV_SESSION_DIR)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_DIR));
        let request_timeout = match lookup(ENV_HTTP_TIMEOUT_SECS) {
            None => None,
            Some(s) if s.trim().is_empty() => None,
            Some(s) => {
                let secs: u64 = s.trim().parse().map_err(|_| {
                    AppError::config("invalid_timeout".to_string(), format!("{ENV_HTTP_TIMEOUT_SECS}='{s}' is not a whole number of seconds"))
                })?;
                Some(Duration::from_secs(secs))
            }
        };
        Ok(Self { api_url, session_dir, request_timeout })
    }

    pub fn with_api_url(mut self, url: Url) -> Self {
        self.api_url = url;
        self
    }

    pub fn with_session_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.session_dir = dir.into();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_API_URL).expect("default api url is valid"),
            session_dir: PathBuf::from(DEFAULT_SESSION_DIR),
            request_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn reads_all_keys() {
        let cfg = Config::from_lookup(lookup_from(&[
            (ENV_API_URL, "https://wms.example.com/"),
            (ENV_SESSION_DIR, "/tmp/sess"),
            (ENV_HTTP_TIMEOUT_SECS, "15"),
        ]))
        .unwrap();
        assert_eq!(cfg.api_url.as_str(), "https://wms.example.com/");
        assert_eq!(cfg.session_dir, PathBuf::from("/tmp/sess"));
        assert_eq!(cfg.request_timeout, Some(Duration::from_secs(15)));
    }

    #[test]
    fn rejects_bad_values() {
        let err = Config::from_lookup(lookup_from(&[(ENV_API_URL, "not a url")])).unwrap_err();
        assert_eq!(err.code_str(), "invalid_api_url");
        let err = Config::from_lookup(lookup_from(&[(ENV_HTTP_TIMEOUT_SECS, "soon")])).unwrap_err();
        assert_eq!(err.code_str(), "invalid_timeout");
    }
}
