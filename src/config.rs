use crate::gateway::{InicisSettings, TossSettings};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TOSS_EXECUTE_URL: &str = "https://api.tosspayments.com/v1/payments/confirm";
pub const DEFAULT_TOSS_CANCEL_URL: &str =
    "https://api.tosspayments.com/v1/payments/{paymentKey}/cancel";
pub const DEFAULT_INICIS_REFUND_URL: &str = "https://iniapi.inicis.com/v2/pg/refund";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub gateway_timeout: Duration,
    /// Provider used by card legs that name none.
    pub default_provider: String,
    pub toss: TossSettings,
    pub inicis: InicisSettings,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn optional(env_map: &HashMap<String, String>, key: &str, default: &str) -> String {
    env_map
        .get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = optional(&env_map, "PORT", "8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = required(&env_map, "DATABASE_PATH")?;

        let timeout_ms = optional(&env_map, "GATEWAY_TIMEOUT_MS", "30000")
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "GATEWAY_TIMEOUT_MS".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let default_provider = optional(&env_map, "DEFAULT_PROVIDER", "TOSS").to_ascii_uppercase();
        if !matches!(default_provider.as_str(), "TOSS" | "INICIS") {
            return Err(ConfigError::InvalidValue(
                "DEFAULT_PROVIDER".to_string(),
                format!("must be TOSS or INICIS, got {}", default_provider),
            ));
        }

        let toss = TossSettings {
            api_key: required(&env_map, "TOSS_API_KEY")?,
            execute_url: optional(&env_map, "TOSS_EXECUTE_URL", DEFAULT_TOSS_EXECUTE_URL),
            cancel_url: optional(&env_map, "TOSS_CANCEL_URL", DEFAULT_TOSS_CANCEL_URL),
        };
        if !toss.cancel_url.contains("{paymentKey}") {
            return Err(ConfigError::InvalidValue(
                "TOSS_CANCEL_URL".to_string(),
                "must contain the {paymentKey} placeholder".to_string(),
            ));
        }

        let inicis = InicisSettings {
            mid: required(&env_map, "INICIS_MID")?,
            sign_key: required(&env_map, "INICIS_SIGN_KEY")?,
            api_key: required(&env_map, "INICIS_API_KEY")?,
            refund_url: optional(&env_map, "INICIS_REFUND_URL", DEFAULT_INICIS_REFUND_URL),
            charset: optional(&env_map, "INICIS_CHARSET", "UTF-8"),
            format: optional(&env_map, "INICIS_FORMAT", "JSON"),
            client_ip: optional(&env_map, "INICIS_CLIENT_IP", "127.0.0.1"),
        };

        Ok(Config {
            port,
            database_path,
            gateway_timeout: Duration::from_millis(timeout_ms),
            default_provider,
            toss,
            inicis,
        })
    }
}
