use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::adapters::PostgresStore;
use crate::config::Config;
use crate::domain::ExternalPaymentRefs;
use crate::payments::PaymentClient;
use crate::services::PaymentReconciliation;

#[derive(Parser)]
#[command(name = "milove-core")]
#[command(about = "Milove Core - paid messaging gateway and wallet ledger", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP and WebSocket server (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Coin top-up commands
    #[command(subcommand)]
    Topup(TopupCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum TopupCommands {
    /// Verify a pending or failed top-up with the payment provider and settle it
    Reconcile {
        /// Top-up reference (tx-...)
        #[arg(value_name = "REFERENCE")]
        reference: String,
    },
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    use sqlx::migrate::Migrator;
    use std::path::Path;

    let pool = crate::db::create_pool(config).await?;
    let migrator = Migrator::new(Path::new("./migrations")).await?;

    tracing::info!("Running database migrations...");
    migrator.run(&pool).await?;

    tracing::info!("Database migrations completed");
    println!("✓ Database migrations completed");

    Ok(())
}

pub async fn handle_topup_reconcile(config: &Config, reference: &str) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;
    let reconciliation = PaymentReconciliation::new(
        Arc::new(PostgresStore::new(pool)),
        Arc::new(PaymentClient::new(
            config.payment_gateway_url.clone(),
            config.payment_secret_key.clone(),
        )),
        config.pricing.clone(),
        &config.base_url,
    );

    let outcome = reconciliation
        .reconcile(reference, &ExternalPaymentRefs::default())
        .await
        .map_err(|e| anyhow::anyhow!("Reconciliation of {} failed: {}", reference, e))?;

    println!("✓ {} -> {}", reference, outcome.status());
    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Base URL: {}", config.base_url);
    println!("  Payment Gateway URL: {}", config.payment_gateway_url);
    println!("  Push Gateway URL: {}", config.push_gateway_url);
    println!("  Message Fee: {}", config.pricing.message_fee);
    println!("  Coin Conversion Rate: {}", config.pricing.coin_conversion_rate);
    println!("  Top-up Ceiling: {} {}", config.pricing.top_up_ceiling, config.pricing.currency);

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_password() {
        assert_eq!(
            mask_password("postgres://milove:hunter2@db:5432/milove"),
            "postgres://milove:****@db:5432/milove"
        );
        assert_eq!(mask_password("postgres://db/milove"), "postgres://db/milove");
    }

    #[test]
    fn test_parse_topup_reconcile() {
        let cli = Cli::try_parse_from(["milove-core", "topup", "reconcile", "tx-abc"]).unwrap();
        match cli.command {
            Some(Commands::Topup(TopupCommands::Reconcile { reference })) => {
                assert_eq!(reference, "tx-abc")
            }
            _ => panic!("expected topup reconcile"),
        }
    }

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["milove-core"]).unwrap();
        assert!(cli.command.is_none());
    }
}
