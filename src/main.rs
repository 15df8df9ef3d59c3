use clap::Parser;
use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use milove_core::adapters::PostgresStore;
use milove_core::cli::{self, Cli, Commands, DbCommands, TopupCommands};
use milove_core::config::{Config, LogFormat};
use milove_core::health::{HealthChecks, PaymentGatewayChecker, PostgresChecker};
use milove_core::middleware::auth::JwtVerifier;
use milove_core::payments::PaymentClient;
use milove_core::services::ExpoPushClient;
use milove_core::{create_app, startup, AppState, Collaborators};

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    match cli.command {
        None | Some(Commands::Serve) => serve(config).await,
        Some(Commands::Db(DbCommands::Migrate)) => cli::handle_db_migrate(&config).await,
        Some(Commands::Topup(TopupCommands::Reconcile { reference })) => {
            cli::handle_topup_reconcile(&config, &reference).await
        }
        Some(Commands::Config) => {
            cli::handle_config_validate(&config)?;
            let pool = milove_core::db::create_pool(&config).await?;
            let report = startup::validate_environment(&config, &pool).await?;
            report.print();
            if !report.is_valid() {
                anyhow::bail!("Startup validation failed");
            }
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = milove_core::db::create_pool(&config).await?;

    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let payment_client = PaymentClient::new(
        config.payment_gateway_url.clone(),
        config.payment_secret_key.clone(),
    );
    tracing::info!("Payment client initialized with URL: {}", config.payment_gateway_url);

    let health = HealthChecks::new()
        .with("postgres", true, Arc::new(PostgresChecker::new(pool.clone())))
        .with(
            "payment_gateway",
            false,
            Arc::new(PaymentGatewayChecker::new(payment_client.clone())),
        );

    let state = AppState::new(
        Arc::new(PostgresStore::new(pool)),
        Collaborators {
            tokens: Arc::new(JwtVerifier::new(&config.jwt_secret)),
            payments: Arc::new(payment_client),
            push: Arc::new(ExpoPushClient::new(
                config.push_gateway_url.clone(),
                config.push_access_token.clone(),
            )),
        },
        config.pricing.clone(),
        &config.base_url,
        config.payment_webhook_secret.clone(),
    )
    .with_health(health);

    let app = create_app(state, config.cors_allowed_origins.as_deref());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
