use bigdecimal::BigDecimal;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub base_url: String,
    pub payment_gateway_url: String,
    pub payment_secret_key: String,
    pub payment_webhook_secret: String,
    pub push_gateway_url: String,
    pub push_access_token: Option<String>,
    /// Comma-separated origins; any origin is allowed when unset.
    pub cors_allowed_origins: Option<String>,
    pub pricing: Pricing,
    pub log_format: LogFormat,
}

/// Monetary constants shared by the gateway and the wallet services.
#[derive(Debug, Clone, PartialEq)]
pub struct Pricing {
    /// Coins charged for every message sent.
    pub message_fee: BigDecimal,
    /// Coins credited per unit of top-up currency.
    pub coin_conversion_rate: BigDecimal,
    /// Largest top-up accepted in a single request.
    pub top_up_ceiling: BigDecimal,
    pub currency: String,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            message_fee: BigDecimal::new(5.into(), 1),
            coin_conversion_rate: BigDecimal::from(10),
            top_up_ceiling: BigDecimal::from(1000),
            currency: "USD".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let defaults = Pricing::default();
        let pricing = Pricing {
            message_fee: decimal_var("MESSAGE_FEE", defaults.message_fee)?,
            coin_conversion_rate: decimal_var("COIN_CONVERSION_RATE", defaults.coin_conversion_rate)?,
            top_up_ceiling: decimal_var("TOP_UP_CEILING", defaults.top_up_ceiling)?,
            currency: defaults.currency,
        };

        if pricing.message_fee <= BigDecimal::from(0) {
            anyhow::bail!("MESSAGE_FEE must be greater than 0");
        }

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            jwt_secret: env::var("JWT_SECRET")?,
            base_url: env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            payment_gateway_url: env::var("PAYMENT_GATEWAY_URL")
                .unwrap_or_else(|_| "https://api.flutterwave.com/v3".to_string()),
            payment_secret_key: env::var("PAYMENT_SECRET_KEY")?,
            payment_webhook_secret: env::var("PAYMENT_WEBHOOK_SECRET")?,
            push_gateway_url: env::var("PUSH_GATEWAY_URL")
                .unwrap_or_else(|_| "https://exp.host/--/api/v2/push/send".to_string()),
            push_access_token: env::var("PUSH_ACCESS_TOKEN").ok(),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS").ok(),
            pricing,
            log_format: parse_log_format(&env::var("LOG_FORMAT").unwrap_or_default()),
        })
    }
}

fn decimal_var(name: &str, default: BigDecimal) -> anyhow::Result<BigDecimal> {
    match env::var(name) {
        Ok(raw) => BigDecimal::from_str(raw.trim())
            .map_err(|e| anyhow::anyhow!("{} is not a valid decimal: {}", name, e)),
        Err(_) => Ok(default),
    }
}

fn parse_log_format(raw: &str) -> LogFormat {
    if raw.trim().eq_ignore_ascii_case("json") {
        LogFormat::Json
    } else {
        LogFormat::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pricing() {
        let pricing = Pricing::default();
        assert_eq!(pricing.message_fee, BigDecimal::from_str("0.5").unwrap());
        assert_eq!(pricing.coin_conversion_rate, BigDecimal::from(10));
        assert_eq!(pricing.top_up_ceiling, BigDecimal::from(1000));
        assert_eq!(pricing.currency, "USD");
    }

    #[test]
    fn test_parse_log_format() {
        assert_eq!(parse_log_format("json"), LogFormat::Json);
        assert_eq!(parse_log_format(" JSON "), LogFormat::Json);
        assert_eq!(parse_log_format(""), LogFormat::Text);
        assert_eq!(parse_log_format("pretty"), LogFormat::Text);
    }
}
