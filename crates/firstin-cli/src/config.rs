//! YAML configuration: loading, `${NAME}` environment substitution,
//! Go-style duration strings, and startup validation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use firstin_core::PollError;

const MIN_DELAY_DEFAULT: Duration = Duration::from_secs(600);
const MAX_AGE_DEFAULT: Duration = Duration::from_secs(3600);
const MAX_AGE_FLOOR: Duration = Duration::from_secs(3600);
const MAX_AGE_CEILING: Duration = Duration::from_secs(24 * 3600);
const SLACK_WEBHOOK_PREFIX: &str = "https://hooks.slack.com/";

/// Root configuration, validated and with durations parsed.
#[derive(Debug, Clone)]
pub struct Config {
    pub polling_interval: Duration,
    pub rate_limit: RateLimitConfig,
    pub filters: FilterConfig,
    pub notification: NotificationConfig,
    pub ai: AiConfig,
    pub companies: Vec<CompanyConfig>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Global minimum gap between same-ATS requests.
    pub min_delay: Duration,
    /// Per-ATS overrides of the minimum gap.
    pub ats_overrides: HashMap<String, Duration>,
}

#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Freshness window, in [1 h, 24 h].
    pub max_age: Duration,
    pub title_keywords: Vec<String>,
    pub title_exclude_keywords: Vec<String>,
    pub locations: Vec<String>,
    pub exclude_locations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationConfig {
    Log,
    Slack { webhook_url: String },
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub enabled: bool,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanyConfig {
    pub name: String,
    pub ats: String,
    #[serde(default)]
    pub board_token: Option<String>,
    #[serde(default)]
    pub workday_url: Option<String>,
    pub enabled: bool,
}

impl CompanyConfig {
    /// The board token for token-addressed families, the base URL for
    /// Workday instances. Validation guarantees presence for enabled
    /// companies.
    pub fn board_ref(&self) -> &str {
        if self.ats == "workday" {
            self.workday_url.as_deref().unwrap_or_default()
        } else {
            self.board_token.as_deref().unwrap_or_default()
        }
    }
}

// ---- Raw YAML shapes (durations as strings) ----

#[derive(Deserialize)]
struct RawConfig {
    polling_interval: String,
    #[serde(default)]
    rate_limit: RawRateLimit,
    #[serde(default)]
    filters: RawFilters,
    #[serde(default)]
    notification: RawNotification,
    #[serde(default)]
    ai: RawAi,
    #[serde(default)]
    companies: Vec<CompanyConfig>,
}

#[derive(Deserialize, Default)]
struct RawRateLimit {
    #[serde(default)]
    min_delay: Option<String>,
    #[serde(default)]
    ats_overrides: HashMap<String, String>,
}

#[derive(Deserialize, Default)]
struct RawFilters {
    #[serde(default)]
    max_age: Option<String>,
    #[serde(default)]
    title_keywords: Vec<String>,
    #[serde(default)]
    title_exclude_keywords: Vec<String>,
    #[serde(default)]
    locations: Vec<String>,
    #[serde(default)]
    exclude_locations: Vec<String>,
}

#[derive(Deserialize)]
struct RawNotification {
    #[serde(rename = "type", default = "default_notification_type")]
    kind: String,
    #[serde(default)]
    webhook_url: Option<String>,
}

impl Default for RawNotification {
    fn default() -> Self {
        Self {
            kind: default_notification_type(),
            webhook_url: None,
        }
    }
}

fn default_notification_type() -> String {
    "log".to_string()
}

#[derive(Deserialize)]
struct RawAi {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    api_key: String,
    #[serde(default = "default_ai_model")]
    model: String,
    #[serde(default = "default_ai_base_url")]
    base_url: String,
}

impl Default for RawAi {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            model: default_ai_model(),
            base_url: default_ai_base_url(),
        }
    }
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_ai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

impl Config {
    /// Read, substitute environment variables, parse, and validate the
    /// config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, PollError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PollError::Config(format!("read {}: {e}", path.display())))?;
        Self::parse(&text)
    }

    fn parse(text: &str) -> Result<Config, PollError> {
        let substituted = substitute_env(text);
        let raw: RawConfig = serde_yaml::from_str(&substituted)
            .map_err(|e| PollError::Config(format!("parse config: {e}")))?;
        Config::try_from(raw)
    }
}

impl TryFrom<RawConfig> for Config {
    type Error = PollError;

    fn try_from(raw: RawConfig) -> Result<Config, PollError> {
        let polling_interval = parse_duration_field("polling_interval", &raw.polling_interval)?;

        let min_delay = match &raw.rate_limit.min_delay {
            Some(value) => parse_duration_field("rate_limit.min_delay", value)?,
            None => MIN_DELAY_DEFAULT,
        };
        let mut ats_overrides = HashMap::new();
        for (ats, value) in &raw.rate_limit.ats_overrides {
            let field = format!("rate_limit.ats_overrides.{ats}");
            ats_overrides.insert(ats.clone(), parse_duration_field(&field, value)?);
        }

        let max_age = match &raw.filters.max_age {
            Some(value) => parse_duration_field("filters.max_age", value)?,
            None => MAX_AGE_DEFAULT,
        };

        let notification = match raw.notification.kind.as_str() {
            "slack" => NotificationConfig::Slack {
                webhook_url: raw.notification.webhook_url.unwrap_or_default(),
            },
            "log" => NotificationConfig::Log,
            other => {
                return Err(PollError::Config(format!(
                    "notification.type must be \"log\" or \"slack\", got {other:?}"
                )))
            }
        };

        let config = Config {
            polling_interval,
            rate_limit: RateLimitConfig {
                min_delay,
                ats_overrides,
            },
            filters: FilterConfig {
                max_age,
                title_keywords: raw.filters.title_keywords,
                title_exclude_keywords: raw.filters.title_exclude_keywords,
                locations: raw.filters.locations,
                exclude_locations: raw.filters.exclude_locations,
            },
            notification,
            ai: AiConfig {
                enabled: raw.ai.enabled,
                api_key: raw.ai.api_key,
                model: raw.ai.model,
                base_url: raw.ai.base_url,
            },
            companies: raw.companies,
        };
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    fn validate(&self) -> Result<(), PollError> {
        if self.polling_interval.is_zero() {
            return Err(PollError::Config(
                "polling_interval must be positive".to_string(),
            ));
        }

        if !self.companies.iter().any(|c| c.enabled) {
            return Err(PollError::Config(
                "at least one company must be enabled".to_string(),
            ));
        }

        if self.filters.max_age < MAX_AGE_FLOOR || self.filters.max_age > MAX_AGE_CEILING {
            return Err(PollError::Config(format!(
                "filters.max_age must be between 1h and 24h, got {}s",
                self.filters.max_age.as_secs()
            )));
        }

        if let NotificationConfig::Slack { webhook_url } = &self.notification {
            if webhook_url.is_empty() {
                return Err(PollError::Config(
                    "notification.webhook_url is required when type is \"slack\"".to_string(),
                ));
            }
            if !webhook_url.starts_with(SLACK_WEBHOOK_PREFIX) {
                return Err(PollError::Config(format!(
                    "notification.webhook_url must start with {SLACK_WEBHOOK_PREFIX}"
                )));
            }
        }

        for company in self.companies.iter().filter(|c| c.enabled) {
            match company.ats.as_str() {
                "workday" => {
                    if company.workday_url.as_deref().unwrap_or_default().is_empty() {
                        return Err(PollError::Config(format!(
                            "company {:?} uses workday and needs workday_url",
                            company.name
                        )));
                    }
                }
                // Microsoft is addressed by a fixed domain, not a token.
                "microsoft" => {}
                _ => {
                    if company.board_token.as_deref().unwrap_or_default().is_empty() {
                        return Err(PollError::Config(format!(
                            "company {:?} needs board_token",
                            company.name
                        )));
                    }
                }
            }
        }

        if self.ai.enabled && self.ai.api_key.is_empty() {
            return Err(PollError::Config(
                "ai.api_key is required when ai.enabled is true".to_string(),
            ));
        }

        Ok(())
    }
}

// ---- Environment substitution ----

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

/// Replace every `${NAME}` with the value of that environment variable,
/// or the empty string when unset.
fn substitute_env(text: &str) -> String {
    ENV_VAR_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

// ---- Duration strings ----

/// Parse a duration string: one or more `<number><unit>` pairs where the
/// unit is `s`, `m`, or `h` (e.g. "600s", "10m", "1h30m").
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut saw_pair = false;
    for ch in s.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration {s:?}"))?;
        let unit_secs = match ch {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            _ => return Err(format!("invalid duration unit {ch:?} in {s:?}")),
        };
        total += Duration::from_secs(value * unit_secs);
        digits.clear();
        saw_pair = true;
    }
    if !digits.is_empty() || !saw_pair {
        return Err(format!("invalid duration {s:?}"));
    }
    Ok(total)
}

fn parse_duration_field(field: &str, value: &str) -> Result<Duration, PollError> {
    parse_duration(value).map_err(|e| PollError::Config(format!("{field}: {e}")))
}
