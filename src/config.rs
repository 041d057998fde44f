use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Bundled defaults, used when neither the environment nor a .env file sets a key
const BUNDLED_CONFIG: &str = include_str!("../assets/config.env");

pub const API_URL_VAR: &str = "GEMCHAT_API_URL";
pub const PROBE_INTERVAL_VAR: &str = "GEMCHAT_PROBE_INTERVAL_SECS";
pub const REQUEST_TIMEOUT_VAR: &str = "GEMCHAT_REQUEST_TIMEOUT_SECS";

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Shortest probe interval accepted anywhere; a zero interval would never yield.
pub const MIN_PROBE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub probe_interval: Duration,
    pub health_timeout: Duration,
    /// Upper bound on each flow call, after which it fails like any transport error.
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            probe_interval: DEFAULT_PROBE_INTERVAL,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. Unset or blank keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = get(API_URL_VAR) {
            config.api_url = url;
        }
        if let Some(secs) = get(PROBE_INTERVAL_VAR) {
            config.probe_interval = parse_secs(PROBE_INTERVAL_VAR, &secs)?.max(MIN_PROBE_INTERVAL);
        }
        if let Some(secs) = get(REQUEST_TIMEOUT_VAR) {
            config.request_timeout = parse_secs(REQUEST_TIMEOUT_VAR, &secs)?.max(Duration::from_secs(1));
        }

        config.api_url = normalize_url(&config.api_url);
        Ok(config)
    }

    pub fn with_api_url(mut self, url: impl AsRef<str>) -> Self {
        self.api_url = normalize_url(url.as_ref());
        self
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    let secs: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a whole number of seconds"))?;
    Ok(Duration::from_secs(secs))
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Location of the per-user config file, if the platform has a config directory.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gemchat").join("config.env"))
}

/// Populate the process environment from, in priority order: the real environment,
/// `./.env`, the per-user config file, then the bundled defaults.
pub fn load_dotenv() {
    // dotenvy never overrides variables that are already set
    if dotenvy::dotenv().is_ok() {
        tracing::debug!("loaded .env");
    }

    if let Some(path) = user_config_path().filter(|path| path.exists()) {
        if let Err(err) = dotenvy::from_path(&path) {
            tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable config file");
        }
    }

    load_bundled_config();
}

fn load_bundled_config() {
    for (key, value) in parse_env_lines(BUNDLED_CONFIG) {
        // Only set if not already set (allow env override)
        if env::var(key).is_err() {
            // SAFETY: We're setting env vars at startup before any threads are spawned
            unsafe {
                env::set_var(key, value);
            }
        }
    }
}

/// Parse `KEY=VALUE` lines, skipping blanks and `#` comments.
fn parse_env_lines(source: &str) -> Vec<(&str, &str)> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.api_url, "http://localhost:8000");
    }

    #[test]
    fn reads_url_and_interval() {
        let config = Config::from_lookup(lookup(&[
            (API_URL_VAR, "https://gateway.example.com/"),
            (PROBE_INTERVAL_VAR, "10"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "https://gateway.example.com");
        assert_eq!(config.probe_interval, Duration::from_secs(10));
    }

    #[test]
    fn reads_request_timeout_and_clamps_zero() {
        let config = Config::from_lookup(lookup(&[(REQUEST_TIMEOUT_VAR, "45")])).unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(45));

        let config = Config::from_lookup(lookup(&[
            (REQUEST_TIMEOUT_VAR, "0"),
            (PROBE_INTERVAL_VAR, "0"),
        ]))
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(1));
        assert_eq!(config.probe_interval, MIN_PROBE_INTERVAL);
    }

    #[test]
    fn rejects_bad_request_timeout() {
        assert!(Config::from_lookup(lookup(&[(REQUEST_TIMEOUT_VAR, "forever")])).is_err());
    }

    #[test]
    fn blank_url_falls_back_to_default() {
        let config = Config::from_lookup(lookup(&[(API_URL_VAR, "   ")])).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn rejects_bad_interval() {
        assert!(Config::from_lookup(lookup(&[(PROBE_INTERVAL_VAR, "soon")])).is_err());
    }

    #[test]
    fn bundled_config_parses() {
        let pairs = parse_env_lines(BUNDLED_CONFIG);
        assert!(pairs.contains(&(API_URL_VAR, DEFAULT_API_URL)));
    }

    #[test]
    fn env_lines_skip_comments_and_blanks() {
        let pairs = parse_env_lines("# comment\n\nA = 1\nnot a pair\n=orphan\nB=two=2\n");
        assert_eq!(pairs, vec![("A", "1"), ("B", "two=2")]);
    }
}
