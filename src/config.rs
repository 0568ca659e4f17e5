//! Configuration types.
//!
//! Everything is read once at startup by [`AppConfig::from_env`] and then
//! passed by reference into the constructors that need it.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::task::DEFAULT_POOL_SIZE;

const DEFAULT_PLATFORM_BASE_URL: &str = "https://ark.xiaohongshu.com";
const DEFAULT_CHAT_BASE_URL: &str = "https://api.dify.ai/v1";
const DEFAULT_LOGISTICS_PAGE: &str =
    "https://ark.xiaohongshu.com/app-order/abnormal/order/logistics";
const DEFAULT_SCHEDULE: &str = "0 0 12 * * *";

/// Whole-service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub platform: PlatformConfig,
    pub chat: ChatConfig,
    pub email: EmailConfig,
    pub scheduler: SchedulerConfig,
    pub server: ServerConfig,
}

/// Seller platform API access.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Access token, sent as `authorization` and inside the session cookie.
    pub auth_token: SecretString,
    pub base_url: String,
    pub timeout: Duration,
}

/// Chat-completion service used to draft review replies.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub timeout: Duration,
    /// User identifier sent with every chat request.
    pub user: String,
    /// Item id -> `"<type>|<introduction>"`.
    pub catalog: HashMap<String, String>,
}

/// Outbound SMTP settings for alarm email.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    pub recipients: Vec<String>,
    pub subject: String,
    /// Link placed in the alarm body.
    pub logistics_page: String,
}

/// Periodic trigger settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub schedule: cron::Schedule,
    /// Upper bound of the random extra delay, in minutes. Zero disables it.
    pub delay_range_minutes: u64,
    /// Deadline for one scheduled run.
    pub run_timeout: Duration,
    /// Concurrency limit for the scheduled batch.
    pub pool_size: usize,
}

/// Inbound HTTP settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Deadline for one `/replywithorderid` run.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 1903,
            request_timeout: Duration::from_secs(300), // 5 minutes
        }
    }
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);
        Ok(Self {
            platform: PlatformConfig::load(&vars)?,
            chat: ChatConfig::load(&vars)?,
            email: EmailConfig::load(&vars)?,
            scheduler: SchedulerConfig::load(&vars)?,
            server: ServerConfig::load(&vars)?,
        })
    }
}

impl PlatformConfig {
    fn load(vars: &Vars<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            auth_token: SecretString::from(vars.required("PLATFORM_AUTH_TOKEN")?),
            base_url: vars.or("PLATFORM_BASE_URL", DEFAULT_PLATFORM_BASE_URL),
            timeout: Duration::from_secs(vars.parse_or("PLATFORM_TIMEOUT_SECS", 60)?),
        })
    }
}

impl ChatConfig {
    fn load(vars: &Vars<'_>) -> Result<Self, ConfigError> {
        let catalog = match vars.get("CHAT_PRODUCT_CATALOG") {
            Some(raw) => parse_catalog(&raw)?,
            None => HashMap::new(),
        };
        Ok(Self {
            api_key: SecretString::from(vars.required("CHAT_API_KEY")?),
            base_url: vars.or("CHAT_BASE_URL", DEFAULT_CHAT_BASE_URL),
            timeout: Duration::from_secs(vars.parse_or("CHAT_TIMEOUT_SECS", 120)?),
            user: vars.or("CHAT_USER", "pulse-check"),
            catalog,
        })
    }
}

impl EmailConfig {
    fn load(vars: &Vars<'_>) -> Result<Self, ConfigError> {
        let username = vars.required("EMAIL_USERNAME")?;
        let recipients = split_list(&vars.required("EMAIL_RECIPIENTS")?);
        if recipients.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "EMAIL_RECIPIENTS".into(),
                message: "at least one recipient is required".into(),
            });
        }
        Ok(Self {
            smtp_host: vars.required("EMAIL_SMTP_HOST")?,
            smtp_port: vars.parse_or("EMAIL_SMTP_PORT", 465)?,
            password: SecretString::from(vars.required("EMAIL_PASSWORD")?),
            from_address: vars.or("EMAIL_FROM_ADDRESS", &username),
            username,
            recipients,
            subject: vars.or("EMAIL_SUBJECT", "Store logistics exception alert"),
            logistics_page: vars.or("EMAIL_LOGISTICS_PAGE", DEFAULT_LOGISTICS_PAGE),
        })
    }
}

impl SchedulerConfig {
    fn load(vars: &Vars<'_>) -> Result<Self, ConfigError> {
        let expression = vars.or("SCHEDULE_CRON", DEFAULT_SCHEDULE);
        let schedule =
            cron::Schedule::from_str(&expression).map_err(|e| ConfigError::InvalidValue {
                key: "SCHEDULE_CRON".into(),
                message: format!("invalid cron: {e}"),
            })?;
        Ok(Self {
            schedule,
            delay_range_minutes: vars.parse_or("SCHEDULE_DELAY_MINUTES", 10)?,
            run_timeout: Duration::from_secs(vars.parse_or("SCHEDULE_RUN_TIMEOUT_SECS", 300)?),
            pool_size: vars.parse_or("SCHEDULE_POOL_SIZE", DEFAULT_POOL_SIZE)?,
        })
    }
}

impl ServerConfig {
    fn load(vars: &Vars<'_>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            port: vars.parse_or("SERVER_PORT", defaults.port)?,
            request_timeout: Duration::from_secs(
                vars.parse_or("SERVER_REQUEST_TIMEOUT_SECS", defaults.request_timeout.as_secs())?,
            ),
        })
    }
}

struct Vars<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Vars<'_> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
            None => Ok(default),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `id=type|introduction` entries separated by `;`.
fn parse_catalog(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: "CHAT_PRODUCT_CATALOG".into(),
        message,
    };

    let mut catalog = HashMap::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (id, info) = entry
            .split_once('=')
            .ok_or_else(|| invalid(format!("entry {entry:?} is missing '='")))?;
        if !info.contains('|') {
            return Err(invalid(format!("entry {entry:?} must be id=type|introduction")));
        }
        catalog.insert(id.trim().to_string(), info.trim().to_string());
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("PLATFORM_AUTH_TOKEN", "AT-test"),
            ("CHAT_API_KEY", "app-test"),
            ("EMAIL_USERNAME", "alerts@example.com"),
            ("EMAIL_PASSWORD", "hunter2"),
            ("EMAIL_SMTP_HOST", "smtp.example.com"),
            ("EMAIL_RECIPIENTS", "ops@example.com, owner@example.com"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_fill_optional_values() {
        let config = load(&base_vars()).unwrap();

        assert_eq!(config.platform.auth_token.expose_secret(), "AT-test");
        assert_eq!(config.platform.base_url, DEFAULT_PLATFORM_BASE_URL);
        assert_eq!(config.platform.timeout, Duration::from_secs(60));
        assert_eq!(config.email.smtp_port, 465);
        assert_eq!(config.email.from_address, "alerts@example.com");
        assert_eq!(
            config.email.recipients,
            vec!["ops@example.com".to_string(), "owner@example.com".to_string()]
        );
        assert_eq!(config.scheduler.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.scheduler.delay_range_minutes, 10);
        assert_eq!(config.server.port, 1903);
        assert!(config.chat.catalog.is_empty());
    }

    #[test]
    fn missing_token_is_reported_by_name() {
        let mut vars = base_vars();
        vars.remove("PLATFORM_AUTH_TOKEN");
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "PLATFORM_AUTH_TOKEN"));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut vars = base_vars();
        vars.insert("CHAT_API_KEY", "   ");
        assert!(matches!(load(&vars), Err(ConfigError::MissingEnvVar(_))));
    }

    #[test]
    fn unparsable_port_is_invalid() {
        let mut vars = base_vars();
        vars.insert("SERVER_PORT", "ninety");
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SERVER_PORT"));
    }

    #[test]
    fn bad_cron_is_invalid() {
        let mut vars = base_vars();
        vars.insert("SCHEDULE_CRON", "every day at noon");
        let err = load(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SCHEDULE_CRON"));
    }

    #[test]
    fn catalog_entries_are_parsed() {
        let mut vars = base_vars();
        vars.insert(
            "CHAT_PRODUCT_CATALOG",
            "6564c049=Trouser clip|Hangs trousers in the wardrobe; 660ced34=Bag rack|Fits takeaway bags",
        );
        let config = load(&vars).unwrap();
        assert_eq!(
            config.chat.catalog.get("6564c049").map(String::as_str),
            Some("Trouser clip|Hangs trousers in the wardrobe")
        );
        assert_eq!(config.chat.catalog.len(), 2);
    }

    #[test]
    fn catalog_entry_without_type_is_rejected() {
        let mut vars = base_vars();
        vars.insert("CHAT_PRODUCT_CATALOG", "6564c049=just a description");
        assert!(matches!(load(&vars), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn empty_recipient_list_is_rejected() {
        let mut vars = base_vars();
        vars.insert("EMAIL_RECIPIENTS", " , ");
        assert!(matches!(load(&vars), Err(ConfigError::InvalidValue { .. })));
    }
}
