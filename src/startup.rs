use crate::config::Config;
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::time::Duration;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub payment_gateway: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.payment_gateway
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Payment Gateway:       {}", status(self.payment_gateway));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        payment_gateway: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    if let Err(e) = validate_payment_gateway(&config.payment_gateway_url).await {
        report.payment_gateway = false;
        report.errors.push(format!("Payment gateway: {}", e));
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.jwt_secret.len() < 16 {
        anyhow::bail!("JWT_SECRET must be at least 16 characters");
    }
    if config.payment_secret_key.is_empty() {
        anyhow::bail!("PAYMENT_SECRET_KEY is empty");
    }
    if config.payment_webhook_secret.is_empty() {
        anyhow::bail!("PAYMENT_WEBHOOK_SECRET is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }

    url::Url::parse(&config.base_url).context("BASE_URL is not a valid URL")?;
    url::Url::parse(&config.payment_gateway_url)
        .context("PAYMENT_GATEWAY_URL is not a valid URL")?;
    url::Url::parse(&config.push_gateway_url).context("PUSH_GATEWAY_URL is not a valid URL")?;

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

/// Only reachability is checked; any HTTP answer below 500 counts.
async fn validate_payment_gateway(gateway_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let response = client
        .get(gateway_url)
        .send()
        .await
        .context("Failed to connect to payment gateway")?;

    if response.status().is_server_error() {
        anyhow::bail!("Payment gateway returned status: {}", response.status());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogFormat, Pricing};

    fn config() -> Config {
        Config {
            server_port: 3000,
            database_url: "postgres://localhost:5432/test".to_string(),
            jwt_secret: "0123456789abcdef0123".to_string(),
            base_url: "http://localhost:3000".to_string(),
            payment_gateway_url: "https://api.flutterwave.com/v3".to_string(),
            payment_secret_key: "sk_test".to_string(),
            payment_webhook_secret: "whsec".to_string(),
            push_gateway_url: "https://exp.host/--/api/v2/push/send".to_string(),
            push_access_token: None,
            cors_allowed_origins: None,
            pricing: Pricing::default(),
            log_format: LogFormat::Text,
        }
    }

    #[test]
    fn test_validate_env_vars_accepts_complete_config() {
        assert!(validate_env_vars(&config()).is_ok());
    }

    #[test]
    fn test_validate_env_vars_empty_database_url() {
        let config = Config {
            database_url: String::new(),
            ..config()
        };
        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn test_validate_env_vars_short_jwt_secret() {
        let config = Config {
            jwt_secret: "short".to_string(),
            ..config()
        };
        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn test_validate_env_vars_invalid_url() {
        let config = Config {
            payment_gateway_url: "not-a-url".to_string(),
            ..config()
        };
        assert!(validate_env_vars(&config).is_err());
    }

    #[tokio::test]
    async fn test_payment_gateway_reachable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/").with_status(404).create_async().await;
        assert!(validate_payment_gateway(&server.url()).await.is_ok());
    }

    #[tokio::test]
    async fn test_payment_gateway_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/").with_status(503).create_async().await;
        assert!(validate_payment_gateway(&server.url()).await.is_err());
    }
}
