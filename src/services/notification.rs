use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::ports::{PushError, PushNotification, PushSink, UserDirectory};

pub const PREVIEW_MAX_CHARS: usize = 100;

/// Shortens message text for a notification body.
pub fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_MAX_CHARS {
        let head: String = text.chars().take(PREVIEW_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Accepts the two token shapes the push service issues.
pub fn is_valid_push_token(token: &str) -> bool {
    ["ExponentPushToken[", "ExpoPushToken["]
        .iter()
        .any(|prefix| token.starts_with(prefix) && token.len() > prefix.len() + 1)
        && token.ends_with(']')
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PushBody<'a> {
    to: &'a str,
    sound: &'static str,
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rich_content: Option<RichContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RichContent<'a> {
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct PushTicketResponse {
    data: Option<PushTicket>,
}

#[derive(Debug, Deserialize)]
struct PushTicket {
    status: String,
    message: Option<String>,
}

/// HTTP client for the Expo push service.
#[derive(Clone)]
pub struct ExpoPushClient {
    client: Client,
    url: String,
    access_token: Option<String>,
}

impl ExpoPushClient {
    pub fn new(url: String, access_token: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            url,
            access_token,
        }
    }
}

#[async_trait]
impl PushSink for ExpoPushClient {
    async fn push(&self, notification: &PushNotification) -> Result<(), PushError> {
        let body = PushBody {
            to: &notification.to,
            sound: "default",
            title: &notification.title,
            body: &notification.body,
            rich_content: notification
                .image_url
                .as_deref()
                .map(|image| RichContent { image }),
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PushError::Rejected(format!("HTTP {}", status)));
        }

        let ticket = response
            .json::<PushTicketResponse>()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;
        match ticket.data {
            Some(t) if t.status == "error" => Err(PushError::Rejected(
                t.message.unwrap_or_else(|| "unknown error".to_string()),
            )),
            _ => Ok(()),
        }
    }
}

/// Best-effort push to a user's registered device. Work happens on a spawned
/// task; outcomes are only logged.
#[derive(Clone)]
pub struct NotificationDispatcher {
    users: Arc<dyn UserDirectory>,
    sink: Arc<dyn PushSink>,
}

impl NotificationDispatcher {
    pub fn new(users: Arc<dyn UserDirectory>, sink: Arc<dyn PushSink>) -> Self {
        Self { users, sink }
    }

    pub fn dispatch(
        &self,
        user_id: Uuid,
        title: String,
        body: String,
        image_url: Option<String>,
    ) -> JoinHandle<()> {
        let users = self.users.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let user = match users.find_user(user_id).await {
                Ok(Some(user)) => user,
                Ok(None) => {
                    tracing::debug!(user_id = %user_id, "Push skipped: user not found");
                    return;
                }
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Push skipped: user lookup failed");
                    return;
                }
            };

            let Some(token) = user.push_token.filter(|t| is_valid_push_token(t)) else {
                tracing::debug!(user_id = %user_id, "Push skipped: no valid device token");
                return;
            };

            let notification = PushNotification {
                to: token,
                title,
                body,
                image_url,
            };
            if let Err(e) = sink.push(&notification).await {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to send notification");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use bigdecimal::BigDecimal;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<PushNotification>>,
    }

    #[async_trait]
    impl PushSink for RecordingSink {
        async fn push(&self, notification: &PushNotification) -> Result<(), PushError> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl PushSink for FailingSink {
        async fn push(&self, _notification: &PushNotification) -> Result<(), PushError> {
            Err(PushError::Transport("connection refused".to_string()))
        }
    }

    #[test]
    fn test_preview_truncates_long_text() {
        let long = "a".repeat(150);
        let short = preview(&long);
        assert_eq!(short.chars().count(), 103);
        assert!(short.ends_with("..."));
        assert_eq!(preview("hello"), "hello");
        assert_eq!(preview(&"b".repeat(100)), "b".repeat(100));
    }

    #[test]
    fn test_preview_counts_characters_not_bytes() {
        let text = "é".repeat(101);
        assert_eq!(preview(&text), format!("{}...", "é".repeat(100)));
    }

    #[test]
    fn test_push_token_shape() {
        assert!(is_valid_push_token("ExponentPushToken[abc123]"));
        assert!(is_valid_push_token("ExpoPushToken[abc123]"));
        assert!(!is_valid_push_token("ExponentPushToken[]"));
        assert!(!is_valid_push_token("fcm-token"));
        assert!(!is_valid_push_token("ExponentPushToken[abc"));
    }

    #[tokio::test]
    async fn test_dispatch_sends_to_registered_token() {
        let store = InMemoryStore::new();
        let mut user = store.add_user("rita", BigDecimal::from(0));
        user.push_token = Some("ExponentPushToken[rita]".to_string());
        store.insert_user(user.clone(), BigDecimal::from(0));

        let sink = Arc::new(RecordingSink::default());
        let dispatcher = NotificationDispatcher::new(Arc::new(store), sink.clone());
        dispatcher
            .dispatch(user.id, "Hi".to_string(), "there".to_string(), None)
            .await
            .unwrap();

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ExponentPushToken[rita]");
        assert_eq!(sent[0].title, "Hi");
    }

    #[tokio::test]
    async fn test_dispatch_skips_user_without_token() {
        let store = InMemoryStore::new();
        let user = store.add_user("sam", BigDecimal::from(0));

        let sink = Arc::new(RecordingSink::default());
        let dispatcher = NotificationDispatcher::new(Arc::new(store), sink.clone());
        dispatcher
            .dispatch(user.id, "Hi".to_string(), "there".to_string(), None)
            .await
            .unwrap();

        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_panic() {
        let store = InMemoryStore::new();
        let mut user = store.add_user("tom", BigDecimal::from(0));
        user.push_token = Some("ExponentPushToken[tom]".to_string());
        store.insert_user(user.clone(), BigDecimal::from(0));

        let dispatcher = NotificationDispatcher::new(Arc::new(store), Arc::new(FailingSink));
        let handle = dispatcher.dispatch(user.id, "Hi".to_string(), "x".to_string(), None);
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_expo_client_posts_rich_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/push")
            .match_header("authorization", "Bearer push-token")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "to": "ExponentPushToken[x]",
                "title": "New message from ann",
                "richContent": { "image": "https://cdn/a.png" }
            })))
            .with_status(200)
            .with_body(r#"{"data":{"status":"ok","id":"1"}}"#)
            .create_async()
            .await;

        let client = ExpoPushClient::new(
            format!("{}/push", server.url()),
            Some("push-token".to_string()),
        );
        let result = client
            .push(&PushNotification {
                to: "ExponentPushToken[x]".to_string(),
                title: "New message from ann".to_string(),
                body: "hey".to_string(),
                image_url: Some("https://cdn/a.png".to_string()),
            })
            .await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_expo_client_reports_ticket_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/push")
            .with_status(200)
            .with_body(r#"{"data":{"status":"error","message":"DeviceNotRegistered"}}"#)
            .create_async()
            .await;

        let client = ExpoPushClient::new(format!("{}/push", server.url()), None);
        let result = client
            .push(&PushNotification {
                to: "ExponentPushToken[x]".to_string(),
                title: "t".to_string(),
                body: "b".to_string(),
                image_url: None,
            })
            .await;

        assert!(matches!(result, Err(PushError::Rejected(m)) if m == "DeviceNotRegistered"));
    }
}
