use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;
use tracing::info;

use crate::core::domain::Language;
use crate::core::errors::ConfigError;
use crate::core::time::{DEFAULT_REPORT_TIME, DEFAULT_RUN_TIME, ScheduleTime};

/// Upper bound on attempts per run; the retry table has one delay per attempt.
pub const MAX_ATTEMPTS: u32 = 5;

/// Runtime settings, built once at startup and shared behind an `Arc`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub slack_bot_token: String,
    pub slack_signing_secret: String,
    pub slack_channel_id: String,
    pub slack_report_channel_id: Option<String>,
    /// Direct-message target for failure notifications; the main channel when unset.
    pub slack_owner_user_id: Option<String>,

    pub notion_api_key: Option<String>,
    pub notion_database_id: Option<String>,

    pub default_schedule_time: ScheduleTime,
    pub timezone: Tz,
    pub bot_owner_name: String,
    pub language: Language,

    pub log_level: String,
    pub log_retention_days: u32,

    pub max_retries: u32,
    pub retry_base_interval_minutes: u64,

    /// 0 = Monday .. 6 = Sunday.
    pub weekly_report_day: u32,
    pub weekly_report_time: ScheduleTime,
    pub monthly_report_day: u32,
    pub monthly_report_time: ScheduleTime,

    pub db_path: Option<PathBuf>,

    /// Requests per minute.
    pub slack_rate_limit: u32,
    /// Requests per second.
    pub notion_rate_limit: u32,

    pub command_listen_addr: String,

    pub generator_command: String,
    pub generator_model: String,
    pub generator_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slack_bot_token: String::new(),
            slack_signing_secret: String::new(),
            slack_channel_id: String::new(),
            slack_report_channel_id: None,
            slack_owner_user_id: None,
            notion_api_key: None,
            notion_database_id: None,
            default_schedule_time: DEFAULT_RUN_TIME,
            timezone: chrono_tz::Asia::Seoul,
            bot_owner_name: "User".to_string(),
            language: Language::En,
            log_level: "info".to_string(),
            log_retention_days: 90,
            max_retries: MAX_ATTEMPTS,
            retry_base_interval_minutes: 5,
            weekly_report_day: 0,
            weekly_report_time: DEFAULT_REPORT_TIME,
            monthly_report_day: 1,
            monthly_report_time: DEFAULT_REPORT_TIME,
            db_path: None,
            slack_rate_limit: 50,
            notion_rate_limit: 3,
            command_listen_addr: "127.0.0.1:3001".to_string(),
            generator_command: "claude".to_string(),
            generator_model: "sonnet".to_string(),
            generator_timeout_secs: 180,
        }
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

impl Config {
    /// Defaults, then the TOML file, then environment variables.
    ///
    /// The file is `explicit` when given, otherwise `<data_dir>/config.toml`
    /// if it exists.
    pub async fn load(explicit: Option<&Path>, data_dir: &Path) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let candidate = data_dir.join("config.toml");
                candidate.exists().then_some(candidate)
            }
        };

        let mut config = match path {
            Some(path) => {
                let content =
                    tokio::fs::read_to_string(&path)
                        .await
                        .map_err(|source| ConfigError::Read {
                            path: path.clone(),
                            source,
                        })?;
                info!("Loading settings from {}", path.display());
                toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values from an environment-like lookup. Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("SLACK_BOT_TOKEN") {
            self.slack_bot_token = v;
        }
        if let Some(v) = get("SLACK_SIGNING_SECRET") {
            self.slack_signing_secret = v;
        }
        if let Some(v) = get("SLACK_CHANNEL_ID") {
            self.slack_channel_id = v;
        }
        if let Some(v) = get("SLACK_REPORT_CHANNEL_ID") {
            self.slack_report_channel_id = Some(v);
        }
        if let Some(v) = get("SLACK_OWNER_USER_ID") {
            self.slack_owner_user_id = Some(v);
        }
        if let Some(v) = get("NOTION_API_KEY") {
            self.notion_api_key = Some(v);
        }
        if let Some(v) = get("NOTION_DATABASE_ID") {
            self.notion_database_id = Some(v);
        }
        if let Some(v) = get("DEFAULT_SCHEDULE_TIME") {
            self.default_schedule_time = parse_env("DEFAULT_SCHEDULE_TIME", &v)?;
        }
        if let Some(v) = get("TIMEZONE") {
            self.timezone = parse_env("TIMEZONE", &v)?;
        }
        if let Some(v) = get("BOT_OWNER_NAME") {
            self.bot_owner_name = v;
        }
        if let Some(v) = get("LANGUAGE") {
            self.language = parse_env("LANGUAGE", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = get("LOG_RETENTION_DAYS") {
            self.log_retention_days = parse_env("LOG_RETENTION_DAYS", &v)?;
        }
        if let Some(v) = get("MAX_RETRIES") {
            self.max_retries = parse_env("MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("RETRY_BASE_INTERVAL_MINUTES") {
            self.retry_base_interval_minutes = parse_env("RETRY_BASE_INTERVAL_MINUTES", &v)?;
        }
        if let Some(v) = get("WEEKLY_REPORT_DAY") {
            self.weekly_report_day = parse_env("WEEKLY_REPORT_DAY", &v)?;
        }
        if let Some(v) = get("WEEKLY_REPORT_TIME") {
            self.weekly_report_time = parse_env("WEEKLY_REPORT_TIME", &v)?;
        }
        if let Some(v) = get("MONTHLY_REPORT_DAY") {
            self.monthly_report_day = parse_env("MONTHLY_REPORT_DAY", &v)?;
        }
        if let Some(v) = get("MONTHLY_REPORT_TIME") {
            self.monthly_report_time = parse_env("MONTHLY_REPORT_TIME", &v)?;
        }
        if let Some(v) = get("DB_PATH") {
            self.db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("SLACK_RATE_LIMIT") {
            self.slack_rate_limit = parse_env("SLACK_RATE_LIMIT", &v)?;
        }
        if let Some(v) = get("NOTION_RATE_LIMIT") {
            self.notion_rate_limit = parse_env("NOTION_RATE_LIMIT", &v)?;
        }
        if let Some(v) = get("COMMAND_LISTEN_ADDR") {
            self.command_listen_addr = v;
        }
        if let Some(v) = get("GENERATOR_COMMAND") {
            self.generator_command = v;
        }
        if let Some(v) = get("GENERATOR_MODEL") {
            self.generator_model = v;
        }
        if let Some(v) = get("GENERATOR_TIMEOUT_SECS") {
            self.generator_timeout_secs = parse_env("GENERATOR_TIMEOUT_SECS", &v)?;
        }
        Ok(())
    }

    /// Checks required settings and value ranges. Optional integrations are
    /// never an error here; they show up as SKIPPED in the health check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slack_bot_token.trim().is_empty() {
            return Err(ConfigError::Missing("SLACK_BOT_TOKEN"));
        }
        if self.slack_channel_id.trim().is_empty() {
            return Err(ConfigError::Missing("SLACK_CHANNEL_ID"));
        }
        if !(1..=MAX_ATTEMPTS).contains(&self.max_retries) {
            return Err(ConfigError::Invalid {
                key: "MAX_RETRIES",
                reason: format!("must be between 1 and {}", MAX_ATTEMPTS),
            });
        }
        if self.retry_base_interval_minutes == 0 {
            return Err(ConfigError::Invalid {
                key: "RETRY_BASE_INTERVAL_MINUTES",
                reason: "must be at least 1".into(),
            });
        }
        if self.weekly_report_day > 6 {
            return Err(ConfigError::Invalid {
                key: "WEEKLY_REPORT_DAY",
                reason: "must be between 0 (Monday) and 6 (Sunday)".into(),
            });
        }
        if !(1..=28).contains(&self.monthly_report_day) {
            return Err(ConfigError::Invalid {
                key: "MONTHLY_REPORT_DAY",
                reason: "must be between 1 and 28".into(),
            });
        }
        if self.slack_rate_limit == 0 || self.notion_rate_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "SLACK_RATE_LIMIT",
                reason: "rate limits must be positive".into(),
            });
        }
        if self.generator_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "GENERATOR_TIMEOUT_SECS",
                reason: "must be positive".into(),
            });
        }
        if self.command_listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid {
                key: "COMMAND_LISTEN_ADDR",
                reason: format!("'{}' is not a socket address", self.command_listen_addr),
            });
        }
        Ok(())
    }

    /// The Notion integration is on only when both credentials are present.
    pub fn notion_enabled(&self) -> bool {
        non_empty(&self.notion_api_key) && non_empty(&self.notion_database_id)
    }

    pub fn report_channel(&self) -> &str {
        match &self.slack_report_channel_id {
            Some(channel) if !channel.trim().is_empty() => channel,
            _ => &self.slack_channel_id,
        }
    }

    pub fn db_path_in(&self, data_dir: &Path) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| data_dir.join("daily_bot.db"))
    }

    /// Delay table indexed by attempt number: `base * 1`, `base * 2`, ...
    pub fn retry_delays(&self) -> Vec<Duration> {
        (1..=u64::from(MAX_ATTEMPTS))
            .map(|n| Duration::from_secs(self.retry_base_interval_minutes * n * 60))
            .collect()
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.generator_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn valid() -> Config {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("SLACK_BOT_TOKEN", "xoxb-test"),
                ("SLACK_CHANNEL_ID", "C123"),
            ]))
            .unwrap();
        config
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.default_schedule_time.to_string(), "07:00");
        assert_eq!(config.timezone, chrono_tz::Asia::Seoul);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.weekly_report_time.to_string(), "10:00");
        assert_eq!(config.slack_rate_limit, 50);
    }

    #[test]
    fn notion_enabled_requires_both_credentials() {
        let cases = [
            (None, None, false),
            (Some("secret"), None, false),
            (None, Some("db"), false),
            (Some("secret"), Some(""), false),
            (Some("secret"), Some("db"), true),
        ];
        for (key, db, expected) in cases {
            let config = Config {
                notion_api_key: key.map(String::from),
                notion_database_id: db.map(String::from),
                ..Config::default()
            };
            assert_eq!(config.notion_enabled(), expected, "{key:?} / {db:?}");
        }
    }

    #[test]
    fn missing_slack_credentials_fail_validation() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SLACK_BOT_TOKEN")));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: Config = toml::from_str(
            r#"
            slack_bot_token = "from-file"
            slack_channel_id = "C-file"
            default_schedule_time = "08:30"
            timezone = "UTC"
            language = "ko"
            "#,
        )
        .unwrap();
        config
            .apply_env(env(&[
                ("SLACK_CHANNEL_ID", "C-env"),
                ("DEFAULT_SCHEDULE_TIME", "06:15"),
                ("BOT_OWNER_NAME", "   "),
            ]))
            .unwrap();
        assert_eq!(config.slack_bot_token, "from-file");
        assert_eq!(config.slack_channel_id, "C-env");
        assert_eq!(config.default_schedule_time.to_string(), "06:15");
        assert_eq!(config.timezone, chrono_tz::UTC);
        assert_eq!(config.language, Language::Ko);
        assert_eq!(config.bot_owner_name, "User");
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = valid();
        config.weekly_report_day = 7;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.monthly_report_day = 29;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.max_retries = 6;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("TIMEZONE", "Mars/Olympus")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "TIMEZONE", .. }));

        let err = Config::default()
            .apply_env(env(&[("WEEKLY_REPORT_TIME", "25:00")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "WEEKLY_REPORT_TIME", .. }));
    }

    #[test]
    fn report_channel_falls_back_to_main_channel() {
        let mut config = valid();
        assert_eq!(config.report_channel(), "C123");
        config.slack_report_channel_id = Some("C-reports".into());
        assert_eq!(config.report_channel(), "C-reports");
    }

    #[test]
    fn retry_delays_escalate_by_base_interval() {
        let minutes: Vec<u64> = valid()
            .retry_delays()
            .iter()
            .map(|d| d.as_secs() / 60)
            .collect();
        assert_eq!(minutes, vec![5, 10, 15, 20, 25]);
    }
}
