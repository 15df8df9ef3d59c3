pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod payments;
pub mod ports;
pub mod services;
pub mod startup;
pub mod utils;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Pricing;
use crate::health::HealthChecks;
use crate::ports::{PaymentGateway, PushSink, Store, TokenVerifier};
use crate::services::{
    ChatGateway, ConversationService, GatewayPorts, NotificationDispatcher, PaymentReconciliation,
    PresenceRegistry, WalletService,
};

/// Remote collaborators the services talk to.
pub struct Collaborators {
    pub tokens: Arc<dyn TokenVerifier>,
    pub payments: Arc<dyn PaymentGateway>,
    pub push: Arc<dyn PushSink>,
}

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ChatGateway>,
    pub conversations: ConversationService,
    pub wallet: WalletService,
    pub payments: PaymentReconciliation,
    pub health: HealthChecks,
    pub webhook_secret: String,
}

impl AppState {
    /// Wires every service over a single storage backend.
    pub fn new<S: Store + 'static>(
        store: Arc<S>,
        collaborators: Collaborators,
        pricing: Pricing,
        base_url: &str,
        webhook_secret: String,
    ) -> Self {
        let notifier = NotificationDispatcher::new(store.clone(), collaborators.push);
        let gateway = ChatGateway::new(
            GatewayPorts {
                users: store.clone(),
                relationships: store.clone(),
                conversations: store.clone(),
                attachments: store.clone(),
                tokens: collaborators.tokens,
            },
            PresenceRegistry::new(),
            notifier,
            pricing.clone(),
        );

        Self {
            gateway: Arc::new(gateway),
            conversations: ConversationService::new(store.clone(), store.clone()),
            wallet: WalletService::new(store.clone(), store.clone(), store.clone(), pricing.clone()),
            payments: PaymentReconciliation::new(store, collaborators.payments, pricing, base_url),
            health: HealthChecks::new(),
            webhook_secret,
        }
    }

    pub fn with_health(mut self, health: HealthChecks) -> Self {
        self.health = health;
        self
    }
}

fn cors_layer(allowed_origins: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or_default()
        .split(',')
        .filter_map(|o| HeaderValue::from_str(o.trim()).ok())
        .filter(|o| !o.is_empty())
        .collect();
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}

pub fn create_app(state: AppState, allowed_origins: Option<&str>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api-docs/openapi.json", get(handlers::openapi_json))
        .route("/chat", get(handlers::ws::ws_handler))
        .route("/chats/relationship-events", post(handlers::chat::relationship_event))
        .route("/chats/:user_id/messages", get(handlers::chat::history))
        .route("/wallet", get(handlers::wallet::wallet_info))
        .route("/wallet/gifts", get(handlers::wallet::list_gifts))
        .route("/wallet/gifts/send", post(handlers::wallet::send_gift))
        .route("/wallet/deduct", post(handlers::wallet::deduct))
        .route("/wallet/transactions", get(handlers::wallet::list_transactions))
        .route("/wallet/transactions/:id", get(handlers::wallet::get_transaction))
        .route("/wallet/buy-coins", post(handlers::wallet::buy_coins))
        .route("/wallet/callback", get(handlers::webhook::payment_callback))
        .route("/wallet/webhook", post(handlers::webhook::payment_webhook))
        .layer(axum::middleware::from_fn(
            middleware::request_logger::request_logger_middleware,
        ))
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}
