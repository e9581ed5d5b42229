use std::fmt;
use std::path::PathBuf;

use tracing::Level;

use crate::access::AllowList;
use crate::backend::Backend;

const DEFAULT_SOURCE_URL: &str = "https://github.com/Simatwa/telegram-chatbots";
const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BARD_MODEL: &str = "gemini-2.5-flash";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A variable is present but its value can't be used.
    Invalid { key: &'static str, value: String, reason: String },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { key, value, reason } => {
                write!(f, "invalid value '{}' for '{}': {}", value, key, reason)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

pub struct Config {
    pub telegram_bot_token: String,
    pub allow_list: AllowList,
    pub default_backend: Backend,
    /// Show backend error details to users instead of a generic message.
    pub show_exceptions: bool,
    pub log_level: Level,
    /// Appended to in addition to stdout when set.
    pub log_file: Option<PathBuf>,
    /// Gemini API key used by the Bard backend.
    pub bard_api_key: String,
    pub bard_model: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_api_base: String,
    /// Catalog URL, only set when the awesome prompts feature is switched on.
    pub awesome_prompts_url: Option<String>,
    /// Where unauthorised users are pointed to run their own instance.
    pub source_url: String,
}

impl Config {
    /// Load from the process environment, after reading `.env` if there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let telegram_bot_token = get("telebot").unwrap_or_default();
        if telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telebot (Telegram bot token) is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2
            || token_parts[0].parse::<u64>().is_err()
            || token_parts[1].is_empty()
        {
            return Err(ConfigError::Validation(
                "telebot appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }

        let allow_list = AllowList::parse(&get("users_id").unwrap_or_default())?;

        let default_backend = match get("default_chatbot") {
            Some(name) => name.parse().map_err(|reason| ConfigError::Invalid {
                key: "default_chatbot",
                value: name.clone(),
                reason,
            })?,
            None => Backend::ChatGpt,
        };

        let show_exceptions = parse_bool("show_exceptions", get("show_exceptions"), true)?;
        let log_level = match get("logging_level") {
            Some(value) => parse_level(&value)?,
            None => Level::INFO,
        };

        let awesome_prompts = parse_bool("awesome_prompts", get("awesome_prompts"), false)?;
        let awesome_prompts_url = if awesome_prompts {
            match get("awesome_prompts_url") {
                Some(url) => Some(url),
                None => {
                    return Err(ConfigError::Validation(
                        "awesome_prompts is enabled but awesome_prompts_url is not set".into(),
                    ));
                }
            }
        } else {
            None
        };

        Ok(Self {
            telegram_bot_token,
            allow_list,
            default_backend,
            show_exceptions,
            log_level,
            log_file: get("log_file").map(PathBuf::from),
            bard_api_key: get("bard").unwrap_or_default(),
            bard_model: get("bard_model").unwrap_or_else(|| DEFAULT_BARD_MODEL.to_string()),
            openai_api_key: get("openai_authorization").unwrap_or_default(),
            openai_model: get("openai_model").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_api_base: get("openai_api_base")
                .unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            awesome_prompts_url,
            source_url: get("source_url").unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
        })
    }
}

fn parse_bool(
    key: &'static str,
    value: Option<String>,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value, reason: "expected true or false".into() }),
    }
}

/// Accepts Python-style numeric levels (10..50) as well as level names.
fn parse_level(value: &str) -> Result<Level, ConfigError> {
    let level = match value.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "10" | "debug" => Level::DEBUG,
        "20" | "info" => Level::INFO,
        "30" | "warn" | "warning" => Level::WARN,
        "40" | "50" | "error" | "critical" => Level::ERROR,
        _ => {
            return Err(ConfigError::Invalid {
                key: "logging_level",
                value: value.to_string(),
                reason: "expected 10, 20, 30, 40, 50 or a level name".into(),
            });
        }
    };
    Ok(level)
}
