use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::time::Duration;

const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_USSD_TEMPLATE: &str = "*737*000*{amount}*{reference}#";

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Account details handed to payers who pick an asynchronous rail.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RailSettings {
    pub bank_account_name: Option<String>,
    pub bank_account_number: Option<String>,
    pub bank_name: Option<String>,
    pub ussd_code_template: String,
    pub crypto_deposit_address: Option<String>,
    pub crypto_network: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub provider_api_url: String,
    pub provider_secret_key: String,
    pub provider_publishable_key: String,
    pub merchant_api_key: String,
    pub rail_webhook_secret: String,
    pub card_session_timeout_secs: u64,
    pub expiry_sweep_interval_secs: u64,
    pub public_base_url: String,
    pub cors_allowed_origins: Vec<String>,
    pub log_format: LogFormat,
    pub rails: RailSettings,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()?;

        Ok(Config {
            server_port,
            database_url: optional("DATABASE_URL"),
            redis_url: optional("REDIS_URL"),
            provider_api_url: env::var("PROVIDER_API_URL")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            provider_secret_key: env::var("PROVIDER_SECRET_KEY")?,
            provider_publishable_key: env::var("PROVIDER_PUBLISHABLE_KEY")?,
            merchant_api_key: env::var("MERCHANT_API_KEY")?,
            rail_webhook_secret: env::var("RAIL_WEBHOOK_SECRET")?,
            card_session_timeout_secs: parse_secs(
                "CARD_SESSION_TIMEOUT_SECS",
                DEFAULT_SESSION_TIMEOUT_SECS,
            )?,
            expiry_sweep_interval_secs: parse_secs(
                "EXPIRY_SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL_SECS,
            )?,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", server_port)),
            cors_allowed_origins: parse_origins(
                &env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string()),
            ),
            log_format: parse_log_format(
                &env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
            )?,
            rails: RailSettings {
                bank_account_name: optional("BANK_ACCOUNT_NAME"),
                bank_account_number: optional("BANK_ACCOUNT_NUMBER"),
                bank_name: optional("BANK_NAME"),
                ussd_code_template: env::var("USSD_CODE_TEMPLATE")
                    .unwrap_or_else(|_| DEFAULT_USSD_TEMPLATE.to_string()),
                crypto_deposit_address: optional("CRYPTO_DEPOSIT_ADDRESS"),
                crypto_network: optional("CRYPTO_NETWORK"),
            },
        })
    }

    pub fn card_session_timeout(&self) -> Duration {
        Duration::from_secs(self.card_session_timeout_secs)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs)
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_secs(key: &str, default: u64) -> Result<u64> {
    let secs = match env::var(key) {
        Ok(raw) => raw.trim().parse::<u64>()?,
        Err(_) => default,
    };
    if secs == 0 {
        anyhow::bail!("{} must be greater than zero", key);
    }
    Ok(secs)
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_log_format(raw: &str) -> Result<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "text" | "" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_origin_list() {
        assert_eq!(
            parse_origins(" https://a.example.com, ,https://b.example.com "),
            vec!["https://a.example.com", "https://b.example.com"]
        );
        assert_eq!(parse_origins("*"), vec!["*"]);
    }

    #[test]
    fn parses_log_format() {
        assert_eq!(parse_log_format("JSON").unwrap(), LogFormat::Json);
        assert_eq!(parse_log_format("text").unwrap(), LogFormat::Text);
        assert!(parse_log_format("xml").is_err());
    }

    #[test]
    fn rejects_zero_durations() {
        assert!(parse_secs("PAYLINK_TEST_UNSET_DURATION", 0).is_err());
        assert_eq!(parse_secs("PAYLINK_TEST_UNSET_DURATION", 45).unwrap(), 45);
    }
}
