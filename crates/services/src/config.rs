//! Client configuration read from `EXAM_*` environment variables.

use std::env;
use std::time::Duration;

use exam_core::ExamPolicy;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend location, credentials and the exam policy for this client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: Url,
    pub token: Option<String>,
    pub timeout: Duration,
    pub policy: ExamPolicy,
}

impl ClientConfig {
    /// Configuration for `base_url` with default policy and no token.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for unparseable or non-http(s) URLs.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base(base_url)?,
            token: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
            policy: ExamPolicy::default(),
        })
    }

    /// Reads `EXAM_*` variables from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is set but cannot be used.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` with an injectable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a value is set but cannot be used.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let base = read("EXAM_API_BASE");
        let mut config = Self::new(base.as_deref().unwrap_or(DEFAULT_API_BASE))?;
        config.token = read("EXAM_API_TOKEN").map(|token| token.trim().to_string());
        if let Some(raw) = read("EXAM_HTTP_TIMEOUT_SECS") {
            let secs: u64 = parse(&raw, "EXAM_HTTP_TIMEOUT_SECS")?;
            if secs == 0 {
                return Err(invalid("EXAM_HTTP_TIMEOUT_SECS", raw));
            }
            config.timeout = Duration::from_secs(secs);
        }

        let defaults = ExamPolicy::default();
        let duration = match read("EXAM_DURATION_HOURS") {
            Some(raw) => parse_hours(&raw)?,
            None => defaults.duration(),
        };
        let batch_size = read_or(&read, "EXAM_BATCH_SIZE", defaults.batch_size())?;
        let flush_multiple = read_or(&read, "EXAM_FLUSH_MULTIPLE", defaults.flush_multiple())?;
        let low_inventory = read_or(&read, "EXAM_LOW_INVENTORY", defaults.low_inventory())?;
        let max_violations = read_or(&read, "EXAM_MAX_VIOLATIONS", defaults.max_violations())?;
        config.policy = ExamPolicy::new(
            duration,
            batch_size,
            flush_multiple,
            low_inventory,
            max_violations,
        )?;
        if let Some(raw) = read("EXAM_FULLSCREEN_POLL_SECS") {
            let secs: u64 = parse(&raw, "EXAM_FULLSCREEN_POLL_SECS")?;
            config.policy = config.policy.with_fullscreen_poll(Duration::from_secs(secs))?;
        }
        Ok(config)
    }

    /// Points the client at another backend. A trailing slash is added so
    /// relative endpoint joins keep any path prefix.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for unparseable or non-http(s) URLs.
    pub fn with_base_url(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.base_url = parse_base(raw)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

fn parse_base(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&normalized).map_err(|source| ConfigError::InvalidBaseUrl {
        raw: raw.to_string(),
        source,
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("EXAM_API_BASE", raw.to_string()));
    }
    Ok(url)
}

fn invalid(key: &'static str, raw: String) -> ConfigError {
    ConfigError::InvalidValue { key, raw }
}

fn parse<T: std::str::FromStr>(raw: &str, key: &'static str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| invalid(key, raw.to_string()))
}

fn read_or(
    read: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u32,
) -> Result<u32, ConfigError> {
    read(key).map_or(Ok(default), |raw| parse(&raw, key))
}

fn parse_hours(raw: &str) -> Result<Duration, ConfigError> {
    let hours: f64 = parse(raw, "EXAM_DURATION_HOURS")?;
    if !hours.is_finite() || hours <= 0.0 {
        return Err(invalid("EXAM_DURATION_HOURS", raw.to_string()));
    }
    Duration::try_from_secs_f64(hours * 3600.0)
        .map_err(|_| invalid("EXAM_DURATION_HOURS", raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.base_url.as_str(), "http://localhost:8000/");
        assert_eq!(config.token, None);
        assert_eq!(config.policy, ExamPolicy::default());
        assert_eq!(config.policy.duration_secs(), 12_600);
    }

    #[test]
    fn reads_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("EXAM_API_BASE", "https://exam.example.com/backend"),
            ("EXAM_API_TOKEN", " secret "),
            ("EXAM_DURATION_HOURS", "0.5"),
            ("EXAM_BATCH_SIZE", "9"),
            ("EXAM_MAX_VIOLATIONS", "5"),
            ("EXAM_FULLSCREEN_POLL_SECS", "4"),
            ("EXAM_HTTP_TIMEOUT_SECS", "10"),
        ]))
        .unwrap();
        assert_eq!(config.base_url.as_str(), "https://exam.example.com/backend/");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.policy.duration_secs(), 1_800);
        assert_eq!(config.policy.batch_size(), 9);
        assert_eq!(config.policy.max_violations(), 5);
        assert_eq!(config.policy.fullscreen_poll(), Duration::from_secs(4));
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn blank_values_are_treated_as_unset() {
        let config =
            ClientConfig::from_lookup(lookup(&[("EXAM_API_TOKEN", "   "), ("EXAM_BATCH_SIZE", "")]))
                .unwrap();
        assert_eq!(config.token, None);
        assert_eq!(config.policy.batch_size(), 6);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("EXAM_BATCH_SIZE", "six")])),
            Err(ConfigError::InvalidValue { key: "EXAM_BATCH_SIZE", .. })
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("EXAM_DURATION_HOURS", "-1")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("EXAM_FLUSH_MULTIPLE", "7")])),
            Err(ConfigError::Policy(_))
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("EXAM_FULLSCREEN_POLL_SECS", "0")])),
            Err(ConfigError::Policy(_))
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("EXAM_API_BASE", "ftp://exam.example.com")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("EXAM_API_BASE", "not a url")])),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }
}
