use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_WITHDRAW_METHODS: [&str; 3] = ["Alipay", "USDT", "Paypal"];
/// Minimum commission, in whole currency units, a user must hold to withdraw.
pub const DEFAULT_WITHDRAW_LIMIT: i64 = 100;
pub const DEFAULT_TELEGRAM_API_BASE_URL: &str = "https://api.telegram.org";
pub const DEFAULT_IP_LOOKUP_BASE_URL: &str = "http://ip-api.com/json";
pub const DEFAULT_IP_LOOKUP_TIMEOUT_SECS: u64 = 3;
pub const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct WithdrawSettings {
    /// When set, withdrawal requests are refused outright.
    pub close_enabled: bool,
    pub methods: Vec<String>,
    pub limit: i64,
}

impl WithdrawSettings {
    pub fn allows_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}

impl Default for WithdrawSettings {
    fn default() -> Self {
        Self {
            close_enabled: false,
            methods: DEFAULT_WITHDRAW_METHODS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            limit: DEFAULT_WITHDRAW_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub bot_token: Option<String>,
    pub admin_chat_ids: Vec<i64>,
    pub api_base_url: String,
}

#[derive(Debug, Clone)]
pub struct IpLookupSettings {
    pub base_url: String,
    pub lang: String,
    pub timeout: Duration,
}

impl Default for IpLookupSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_IP_LOOKUP_BASE_URL.to_string(),
            lang: "en".to_string(),
            timeout: Duration::from_secs(DEFAULT_IP_LOOKUP_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    pub bind_addr: SocketAddr,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub withdraw: WithdrawSettings,
    pub telegram: TelegramSettings,
    pub ip_lookup: IpLookupSettings,
    pub notify_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file

        let database_url = required("DATABASE_URL")?;
        let frontend_origin = required("FRONTEND_ORIGIN")?;

        let bind_raw = optional("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse::<SocketAddr>().map_err(|_| ConfigError::Invalid {
            key: "BIND_ADDR",
            value: bind_raw.clone(),
        })?;

        let withdraw = WithdrawSettings {
            close_enabled: parse_flag("WITHDRAW_CLOSE_ENABLE", optional("WITHDRAW_CLOSE_ENABLE"))?,
            methods: optional("COMMISSION_WITHDRAW_METHODS")
                .map(|raw| parse_list(&raw))
                .filter(|methods| !methods.is_empty())
                .unwrap_or_else(|| WithdrawSettings::default().methods),
            limit: parse_or(
                "COMMISSION_WITHDRAW_LIMIT",
                optional("COMMISSION_WITHDRAW_LIMIT"),
                DEFAULT_WITHDRAW_LIMIT,
            )?,
        };

        let admin_chat_ids = parse_list(&optional("TELEGRAM_ADMIN_CHAT_IDS").unwrap_or_default())
            .into_iter()
            .map(|id| {
                id.parse::<i64>().map_err(|_| ConfigError::Invalid {
                    key: "TELEGRAM_ADMIN_CHAT_IDS",
                    value: id,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let telegram = TelegramSettings {
            bot_token: optional("TELEGRAM_BOT_TOKEN"),
            admin_chat_ids,
            api_base_url: optional("TELEGRAM_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE_URL.to_string()),
        };

        let ip_lookup = IpLookupSettings {
            base_url: optional("IP_LOOKUP_BASE_URL")
                .unwrap_or_else(|| DEFAULT_IP_LOOKUP_BASE_URL.to_string()),
            lang: optional("IP_LOOKUP_LANG").unwrap_or_else(|| "en".to_string()),
            timeout: Duration::from_secs(parse_or(
                "IP_LOOKUP_TIMEOUT_SECS",
                optional("IP_LOOKUP_TIMEOUT_SECS"),
                DEFAULT_IP_LOOKUP_TIMEOUT_SECS,
            )?),
        };

        let notify_timeout = Duration::from_secs(parse_or(
            "NOTIFY_TIMEOUT_SECS",
            optional("NOTIFY_TIMEOUT_SECS"),
            DEFAULT_NOTIFY_TIMEOUT_SECS,
        )?);

        Ok(Config {
            database_url,
            frontend_origin,
            bind_addr,
            jwt_issuer: optional("JWT_ISSUER").unwrap_or_else(|| "ticketdesk".to_string()),
            jwt_audience: optional("JWT_AUDIENCE").unwrap_or_else(|| "ticketdesk-users".to_string()),
            withdraw,
            telegram,
            ip_lookup,
            notify_timeout,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::Missing(key))
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(key: &'static str, raw: Option<String>) -> Result<bool, ConfigError> {
    match raw.as_deref() {
        None => Ok(false),
        Some(v) if v == "1" || v.eq_ignore_ascii_case("true") => Ok(true),
        Some(v) if v == "0" || v.eq_ignore_ascii_case("false") => Ok(false),
        Some(v) => Err(ConfigError::Invalid {
            key,
            value: v.to_string(),
        }),
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v.parse::<T>().map_err(|_| ConfigError::Invalid { key, value: v }),
    }
}
