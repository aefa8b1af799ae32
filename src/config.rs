//! Startup configuration.
//!
//! Everything is read once from the environment into an immutable [`AppConfig`]
//! which is then handed to the components that need it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DATA_PATH: &str = "./data";
const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:8000";
const DEFAULT_MAX_LOG_DAYS: usize = 7;
const DEFAULT_FIRMWARE_MAX_SIZE: usize = 16 * 1024 * 1024; // 16MiB
const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const MIN_API_KEY_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },

    #[error("API key too short. Needs to be at least 16 characters")]
    ApiKeyTooShort,

    #[error("failed to generate API key: {0}")]
    Randomness(String),
}

/// Credentials for the chat endpoint alerts are delivered to.
#[derive(Clone)]
pub struct TelegramConfig {
    pub api_base: String,
    pub bot_token: String,
    pub chat_id: String,
}

// Keep the token out of logs.
impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_base", &self.api_base)
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen_address: SocketAddr,
    pub data_path: PathBuf,
    pub database_url: String,
    pub log_path: PathBuf,
    pub max_log_days: usize,
    pub max_firmware_size: usize,
    pub api_key: String,
    /// Set when no key was configured and one was generated at startup.
    pub api_key_generated: bool,
    pub telegram: Option<TelegramConfig>,
    pub notify_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let data_path = PathBuf::from(get("BATTERY_DATA_PATH").unwrap_or(DEFAULT_DATA_PATH.into()));

        let database_url = match get("BATTERY_DATABASE_URL") {
            Some(url) => url
                .strip_prefix("sqlite://")
                .map(str::to_string)
                .unwrap_or(url),
            None => data_path.join("battery.db").to_string_lossy().into_owned(),
        };

        let log_path = get("BATTERY_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_path.join("logs"));

        let max_log_days = parse_or("BATTERY_MAX_LOG_DAYS", get("BATTERY_MAX_LOG_DAYS"), DEFAULT_MAX_LOG_DAYS)?;
        let max_firmware_size = parse_or(
            "BATTERY_FIRMWARE_MAX_SIZE_BYTES",
            get("BATTERY_FIRMWARE_MAX_SIZE_BYTES"),
            DEFAULT_FIRMWARE_MAX_SIZE,
        )?;
        let listen_address = parse_or(
            "BATTERY_LISTEN_ADDRESS",
            get("BATTERY_LISTEN_ADDRESS"),
            DEFAULT_LISTEN_ADDRESS
                .parse()
                .map_err(|_| ConfigError::Invalid {
                    name: "BATTERY_LISTEN_ADDRESS",
                    value: DEFAULT_LISTEN_ADDRESS.to_string(),
                })?,
        )?;

        let notify_secs: u64 = parse_or(
            "BATTERY_NOTIFY_TIMEOUT_SECS",
            get("BATTERY_NOTIFY_TIMEOUT_SECS"),
            DEFAULT_NOTIFY_TIMEOUT_SECS,
        )?;
        if notify_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "BATTERY_NOTIFY_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }

        let (api_key, api_key_generated) = match get("BATTERY_API_KEY") {
            Some(key) => {
                if key.len() < MIN_API_KEY_LEN {
                    return Err(ConfigError::ApiKeyTooShort);
                }
                (key, false)
            }
            None => (generate_api_key()?, true),
        };

        // Both halves are needed; a partial setup silently disables alerts.
        let telegram = match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramConfig {
                api_base: get("TELEGRAM_API_BASE")
                    .unwrap_or(DEFAULT_TELEGRAM_API_BASE.into())
                    .trim_end_matches('/')
                    .to_string(),
                bot_token,
                chat_id,
            }),
            _ => None,
        };

        Ok(AppConfig {
            listen_address,
            data_path,
            database_url,
            log_path,
            max_log_days,
            max_firmware_size,
            api_key,
            api_key_generated,
            telegram,
            notify_timeout: Duration::from_secs(notify_secs),
        })
    }

    pub fn firmware_path(&self) -> PathBuf {
        self.data_path.join("firmware")
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn generate_api_key() -> Result<String, ConfigError> {
    const CHARSET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ\
                                 abcdefghijklmnopqrstuvwxyz\
                                 0123456789";
    const LENGTH: usize = 32;
    let mut buf = [0u8; LENGTH];
    getrandom::fill(&mut buf).map_err(|e| ConfigError::Randomness(e.to_string()))?;

    Ok(buf
        .iter()
        .map(|&b| CHARSET[(b as usize) % CHARSET.len()] as char)
        .collect())
}
