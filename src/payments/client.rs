use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::ports::{PaymentGateway, PaymentLinkRequest};

#[derive(Error, Debug)]
pub enum PaymentGatewayError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Invalid response from payment gateway: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

#[derive(Debug, Serialize)]
struct CreatePaymentBody<'a> {
    tx_ref: &'a str,
    amount: String,
    currency: &'a str,
    redirect_url: &'a str,
    customer: Customer<'a>,
    customizations: Customizations<'a>,
}

#[derive(Debug, Serialize)]
struct Customer<'a> {
    email: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct Customizations<'a> {
    title: &'a str,
}

/// Response from the gateway's /payments endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentLinkResponse {
    pub status: String,
    pub message: Option<String>,
    pub data: Option<PaymentLinkData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentLinkData {
    pub link: Option<String>,
}

/// Response from the gateway's verify-by-reference endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPaymentResponse {
    pub status: String,
    pub data: Option<VerifiedPayment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedPayment {
    pub id: Option<i64>,
    pub tx_ref: Option<String>,
    pub flw_ref: Option<String>,
    pub status: String,
    pub currency: Option<String>,
}

const PAID_STATUS: &str = "successful";
const CHECKOUT_TITLE: &str = "Milove Payment";

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

/// HTTP client for the hosted-payment provider
#[derive(Clone)]
pub struct PaymentClient {
    client: Client,
    base_url: String,
    secret_key: String,
    circuit_breaker: Breaker,
}

impl PaymentClient {
    /// Creates a new PaymentClient with the default circuit breaker
    pub fn new(base_url: String, secret_key: String) -> Self {
        Self::with_circuit_breaker(base_url, secret_key, 3, 60)
    }

    /// Creates a new PaymentClient with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        base_url: String,
        secret_key: String,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        PaymentClient {
            client,
            base_url,
            secret_key,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn guarded<T, F>(&self, call: F) -> Result<T, PaymentGatewayError>
    where
        F: std::future::Future<Output = Result<T, PaymentGatewayError>>,
    {
        match self.circuit_breaker.call(call).await {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(PaymentGatewayError::CircuitBreakerOpen(
                "Payment gateway circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[async_trait]
impl PaymentGateway for PaymentClient {
    async fn create_payment_link(
        &self,
        request: &PaymentLinkRequest,
    ) -> Result<Option<String>, PaymentGatewayError> {
        let url = self.url("payments");
        let body = CreatePaymentBody {
            tx_ref: &request.reference,
            amount: request.amount.to_string(),
            currency: &request.currency,
            redirect_url: &request.redirect_url,
            customer: Customer {
                email: &request.customer_email,
                name: &request.customer_name,
            },
            customizations: Customizations {
                title: CHECKOUT_TITLE,
            },
        };
        let client = self.client.clone();
        let secret = self.secret_key.clone();

        self.guarded(async move {
            let response = client
                .post(&url)
                .bearer_auth(secret)
                .json(&body)
                .send()
                .await?;

            if response.status().is_server_error() {
                return Err(PaymentGatewayError::InvalidResponse(format!(
                    "status {}",
                    response.status()
                )));
            }
            if !response.status().is_success() {
                tracing::warn!(status = %response.status(), "Payment link request rejected");
                return Ok(None);
            }

            let parsed = response.json::<PaymentLinkResponse>().await?;
            Ok(parsed.data.and_then(|d| d.link).filter(|l| !l.is_empty()))
        })
        .await
    }

    async fn verify_payment(&self, reference: &str) -> Result<bool, PaymentGatewayError> {
        let url = self.url("transactions/verify_by_reference");
        let client = self.client.clone();
        let secret = self.secret_key.clone();
        let reference = reference.to_string();

        self.guarded(async move {
            let response = client
                .get(&url)
                .bearer_auth(secret)
                .query(&[("tx_ref", reference.as_str())])
                .send()
                .await?;

            match response.status() {
                status if status.is_success() => {
                    let parsed = response.json::<VerifyPaymentResponse>().await?;
                    Ok(parsed
                        .data
                        .map(|payment| payment.status == PAID_STATUS)
                        .unwrap_or(false))
                }
                StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => Ok(false),
                status => Err(PaymentGatewayError::InvalidResponse(format!(
                    "status {}",
                    status
                ))),
            }
        })
        .await
    }
}
