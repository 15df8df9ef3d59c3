#![allow(dead_code)]

use async_trait::async_trait;
use jsonwebtoken::{encode, EncodingKey, Header};
use milove_core::adapters::InMemoryStore;
use milove_core::config::Pricing;
use milove_core::middleware::auth::{Claims, JwtVerifier};
use milove_core::payments::PaymentGatewayError;
use milove_core::ports::{PaymentGateway, PaymentLinkRequest, PushError, PushNotification, PushSink};
use milove_core::{AppState, Collaborators};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-test-secret";
pub const WEBHOOK_SECRET: &str = "integration-webhook-secret";
pub const BASE_URL: &str = "http://localhost:3000";

pub fn token_for(user_id: Uuid) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn bearer(user_id: Uuid) -> String {
    format!("Bearer {}", token_for(user_id))
}

/// Payment provider double whose answers are set per test.
pub struct ScriptedGateway {
    pub issue_links: AtomicBool,
    pub paid: AtomicBool,
    pub unavailable: AtomicBool,
    pub verify_calls: AtomicUsize,
    pub link_requests: Mutex<Vec<PaymentLinkRequest>>,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self {
            issue_links: AtomicBool::new(true),
            paid: AtomicBool::new(true),
            unavailable: AtomicBool::new(false),
            verify_calls: AtomicUsize::new(0),
            link_requests: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedGateway {
    pub fn set_paid(&self, paid: bool) {
        self.paid.store(paid, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_issue_links(&self, issue: bool) {
        self.issue_links.store(issue, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_payment_link(
        &self,
        request: &PaymentLinkRequest,
    ) -> Result<Option<String>, PaymentGatewayError> {
        self.link_requests.lock().unwrap().push(request.clone());
        if self.issue_links.load(Ordering::SeqCst) {
            Ok(Some(format!("https://checkout.test/pay/{}", request.reference)))
        } else {
            Ok(None)
        }
    }

    async fn verify_payment(&self, _reference: &str) -> Result<bool, PaymentGatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        // Give racing reconcilers a chance to interleave.
        tokio::task::yield_now().await;
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PaymentGatewayError::CircuitBreakerOpen("test".to_string()));
        }
        Ok(self.paid.load(Ordering::SeqCst))
    }
}

#[derive(Default)]
pub struct RecordingPush {
    pub sent: Mutex<Vec<PushNotification>>,
}

impl RecordingPush {
    /// Waits for the spawned dispatch tasks to deliver `count` notifications.
    pub async fn wait_for(&self, count: usize) -> Vec<PushNotification> {
        for _ in 0..100 {
            {
                let sent = self.sent.lock().unwrap();
                if sent.len() >= count {
                    return sent.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushSink for RecordingPush {
    async fn push(&self, notification: &PushNotification) -> Result<(), PushError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub store: InMemoryStore,
    pub state: AppState,
    pub gateway: Arc<ScriptedGateway>,
    pub push: Arc<RecordingPush>,
}

pub fn test_app() -> TestApp {
    let store = InMemoryStore::new();
    let gateway = Arc::new(ScriptedGateway::default());
    let push = Arc::new(RecordingPush::default());
    let state = AppState::new(
        Arc::new(store.clone()),
        Collaborators {
            tokens: Arc::new(JwtVerifier::new(JWT_SECRET)),
            payments: gateway.clone(),
            push: push.clone(),
        },
        Pricing::default(),
        BASE_URL,
        WEBHOOK_SECRET.to_string(),
    );

    TestApp {
        store,
        state,
        gateway,
        push,
    }
}
