use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use utoipa::ToSchema;

use crate::payments::PaymentClient;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub online_sessions: usize,
    #[schema(value_type = Object)]
    pub dependencies: HashMap<String, DependencyStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

impl DependencyStatus {
    fn healthy(start: Instant) -> Self {
        DependencyStatus::Healthy {
            status: "healthy".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn unhealthy(error: impl Into<String>) -> Self {
        DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: error.into(),
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    async fn check(&self) -> DependencyStatus;
}

pub struct PostgresChecker {
    pool: sqlx::PgPool,
}

impl PostgresChecker {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DependencyChecker for PostgresChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e.to_string()),
        }
    }
}

/// Reports the payment provider as unhealthy while its circuit breaker is open.
pub struct PaymentGatewayChecker {
    client: PaymentClient,
}

impl PaymentGatewayChecker {
    pub fn new(client: PaymentClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DependencyChecker for PaymentGatewayChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.client.circuit_state().as_str() {
            "closed" => DependencyStatus::healthy(start),
            state => DependencyStatus::unhealthy(format!("circuit breaker {}", state)),
        }
    }
}

#[derive(Clone)]
struct Registered {
    name: String,
    critical: bool,
    checker: Arc<dyn DependencyChecker>,
}

/// The set of dependencies probed by `/health`.
#[derive(Clone)]
pub struct HealthChecks {
    checkers: Vec<Registered>,
    start_time: Instant,
}

impl Default for HealthChecks {
    fn default() -> Self {
        Self {
            checkers: Vec::new(),
            start_time: Instant::now(),
        }
    }
}

impl HealthChecks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a checker. A failing critical dependency makes the service
    /// unhealthy; any other failure only degrades it.
    pub fn with(mut self, name: &str, critical: bool, checker: Arc<dyn DependencyChecker>) -> Self {
        self.checkers.push(Registered {
            name: name.to_string(),
            critical,
            checker,
        });
        self
    }

    pub async fn check(&self, online_sessions: usize) -> HealthResponse {
        let timeout_duration = Duration::from_secs(5);

        let results = futures::future::join_all(
            self.checkers
                .iter()
                .map(|r| timeout(timeout_duration, r.checker.check())),
        )
        .await;

        let mut dependencies = HashMap::new();
        let mut has_critical_failure = false;
        let mut has_non_critical_failure = false;

        for (registered, result) in self.checkers.iter().zip(results) {
            let status = result.unwrap_or_else(|_| DependencyStatus::unhealthy("timeout"));
            if matches!(status, DependencyStatus::Unhealthy { .. }) {
                if registered.critical {
                    has_critical_failure = true;
                } else {
                    has_non_critical_failure = true;
                }
            }
            dependencies.insert(registered.name.clone(), status);
        }

        let status = if has_critical_failure {
            "unhealthy"
        } else if has_non_critical_failure {
            "degraded"
        } else {
            "healthy"
        };

        HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            online_sessions,
            dependencies,
        }
    }
}
