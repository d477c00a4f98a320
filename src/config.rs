// Application configuration, loaded from environment variables and CLI flags.

use std::time::Duration;

pub const DEFAULT_ADVISOR_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_ADVISOR_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ADVISOR_TIMEOUT_MS: u64 = 10_000;
/// Whole-request wall clock ceiling; an advisor call never gets more.
pub const MAX_ADVISOR_TIMEOUT_MS: u64 = 15_000;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Chat-completion advisor settings.
    pub advisor: AdvisorConfig,
    /// SQLite connection string. `None` means the store is not configured
    /// and persistence endpoints answer with `stored: false`.
    pub database_url: Option<String>,
    /// Optional telemetry forward target for snap/throw logs.
    pub log_webhook_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    /// Credential. `None` puts the decision endpoint in rules-only mode.
    pub api_key: Option<String>,
    pub url: String,
    pub model: String,
    pub timeout: Duration,
}

impl AdvisorConfig {
    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            url: DEFAULT_ADVISOR_URL.to_string(),
            model: DEFAULT_ADVISOR_MODEL.to_string(),
            timeout: Duration::from_millis(DEFAULT_ADVISOR_TIMEOUT_MS),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            advisor: AdvisorConfig::default(),
            database_url: None,
            log_webhook_url: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `OPENAI_API_KEY` - advisor credential (unset or empty: rules only)
    /// - `ADVISOR_URL` - chat-completion endpoint
    /// - `ADVISOR_MODEL` - model name (default: `gpt-4o-mini`)
    /// - `ADVISOR_TIMEOUT_MS` - per-call timeout (default: 10000)
    /// - `DATABASE_URL` - SQLite connection string (unset: store disabled)
    /// - `LOG_WEBHOOK_URL` - telemetry forward target
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut config = Self::from_lookup(|key| std::env::var(key).ok());

        if let Some(port) = Self::parse_cli_value(&args, "--port").and_then(|v| v.parse().ok()) {
            config.port = port;
        }
        config
    }

    /// Build a configuration from an arbitrary key lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = get("PORT").and_then(|v| v.parse().ok()).unwrap_or(3000);

        let timeout_ms = get("ADVISOR_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_ADVISOR_TIMEOUT_MS)
            .min(MAX_ADVISOR_TIMEOUT_MS);

        let advisor = AdvisorConfig {
            api_key: get("OPENAI_API_KEY"),
            url: get("ADVISOR_URL").unwrap_or_else(|| DEFAULT_ADVISOR_URL.to_string()),
            model: get("ADVISOR_MODEL").unwrap_or_else(|| DEFAULT_ADVISOR_MODEL.to_string()),
            timeout: Duration::from_millis(timeout_ms),
        };

        Config {
            port,
            advisor,
            database_url: get("DATABASE_URL"),
            log_webhook_url: get("LOG_WEBHOOK_URL"),
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
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
    fn test_defaults_when_nothing_set() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.port, 3000);
        assert!(!config.advisor.has_key());
        assert_eq!(config.advisor.url, DEFAULT_ADVISOR_URL);
        assert_eq!(config.advisor.model, "gpt-4o-mini");
        assert_eq!(config.advisor.timeout, Duration::from_millis(10_000));
        assert!(config.database_url.is_none());
        assert!(config.log_webhook_url.is_none());
    }

    #[test]
    fn test_empty_credential_counts_as_unset() {
        let config = Config::from_lookup(lookup(&[("OPENAI_API_KEY", "   ")]));
        assert!(!config.advisor.has_key());
    }

    #[test]
    fn test_values_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("OPENAI_API_KEY", "sk-test"),
            ("ADVISOR_MODEL", "gpt-4o"),
            ("ADVISOR_TIMEOUT_MS", "2500"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("LOG_WEBHOOK_URL", "http://localhost:9999/hook"),
        ]));
        assert_eq!(config.port, 8080);
        assert_eq!(config.advisor.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.advisor.model, "gpt-4o");
        assert_eq!(config.advisor.timeout, Duration::from_millis(2500));
        assert_eq!(config.database_url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(
            config.log_webhook_url.as_deref(),
            Some("http://localhost:9999/hook")
        );
    }

    #[test]
    fn test_bad_numbers_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "not-a-port"),
            ("ADVISOR_TIMEOUT_MS", "soon"),
        ]));
        assert_eq!(config.port, 3000);
        assert_eq!(config.advisor.timeout, Duration::from_millis(10_000));
    }

    #[test]
    fn test_timeout_is_capped() {
        let config = Config::from_lookup(lookup(&[("ADVISOR_TIMEOUT_MS", "60000")]));
        assert_eq!(
            config.advisor.timeout,
            Duration::from_millis(MAX_ADVISOR_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_parse_cli_value() {
        let args: Vec<String> = ["bin", "--port", "4000"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            Config::parse_cli_value(&args, "--port").as_deref(),
            Some("4000")
        );
        assert!(Config::parse_cli_value(&args, "--host").is_none());
    }
}
