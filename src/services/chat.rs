//! The conversation gateway: session lifecycle and the paid send protocol.

use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Pricing;
use crate::domain::{
    Attachment, DebitOutcome, Message, NewLedgerEntry, NewMessage, TransactionKind, UserProfile,
};
use crate::error::AppError;
use crate::handlers::ws::{AttachmentPayload, PrivateMessagePayload, ServerEvent};
use crate::middleware::auth::extract_bearer;
use crate::ports::{
    AttachmentStore, ConversationStore, RelationshipOracle, TokenVerifier, UserDirectory,
};
use crate::services::notification::{preview, NotificationDispatcher};
use crate::services::presence::{PresenceRegistry, SessionHandle};
use crate::utils::pagination::Page;

pub const MAX_TEXT_CHARS: usize = 4096;
pub const MESSAGE_FEE_DESCRIPTION: &str = "Sent Message Fee";

/// Raw `send-message` payload as it arrives from the client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub recipient_id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachment_id: Option<String>,
}

/// What a committed send produced.
#[derive(Debug, Clone)]
pub struct MessageReceipt {
    pub message: Message,
    pub attachment: Option<Attachment>,
    pub delivered: bool,
}

/// Storage and oracle dependencies of the gateway.
#[derive(Clone)]
pub struct GatewayPorts {
    pub users: Arc<dyn UserDirectory>,
    pub relationships: Arc<dyn RelationshipOracle>,
    pub conversations: Arc<dyn ConversationStore>,
    pub attachments: Arc<dyn AttachmentStore>,
    pub tokens: Arc<dyn TokenVerifier>,
}

pub struct ChatGateway {
    ports: GatewayPorts,
    presence: PresenceRegistry,
    notifier: NotificationDispatcher,
    pricing: Pricing,
}

struct ValidatedSend {
    recipient: UserProfile,
    text: Option<String>,
    attachment_id: Option<Uuid>,
}

impl ChatGateway {
    pub fn new(
        ports: GatewayPorts,
        presence: PresenceRegistry,
        notifier: NotificationDispatcher,
        pricing: Pricing,
    ) -> Self {
        Self {
            ports,
            presence,
            notifier,
            pricing,
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Resolves an `Authorization` header value to the caller's profile.
    /// Every failure collapses to `AuthenticationFailed`.
    pub async fn authenticate(&self, header: Option<&str>) -> Result<UserProfile, AppError> {
        let token = header
            .and_then(extract_bearer)
            .ok_or(AppError::AuthenticationFailed)?;
        let user_id = self
            .ports
            .tokens
            .verify(token)
            .await
            .map_err(|_| AppError::AuthenticationFailed)?;

        match self.ports.users.find_user(user_id).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(AppError::AuthenticationFailed),
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "User lookup failed during authentication");
                Err(AppError::AuthenticationFailed)
            }
        }
    }

    pub async fn connect(&self, user: &UserProfile, handle: SessionHandle) {
        let session_id = handle.session_id;
        if let Some(previous) = self.presence.register(user.id, handle).await {
            tracing::info!(
                user_id = %user.id,
                previous_session = %previous.session_id,
                "Replaced existing session"
            );
        }
        tracing::info!(user_id = %user.id, session_id = %session_id, "User connected");
    }

    pub async fn disconnect(&self, user_id: Uuid, session_id: Uuid) {
        if self.presence.unregister_session(user_id, session_id).await {
            tracing::info!(user_id = %user_id, session_id = %session_id, "User disconnected");
        } else {
            tracing::debug!(user_id = %user_id, session_id = %session_id, "Superseded session closed");
        }
    }

    async fn validate(
        &self,
        sender: &UserProfile,
        request: SendMessageRequest,
    ) -> Result<ValidatedSend, AppError> {
        let recipient_id = Uuid::parse_str(request.recipient_id.trim())
            .map_err(|_| AppError::RecipientNotFound)?;
        let recipient = self
            .ports
            .users
            .find_user(recipient_id)
            .await?
            .ok_or(AppError::RecipientNotFound)?;

        let text = request.text.filter(|t| !t.trim().is_empty());
        if let Some(text) = &text {
            if text.chars().count() > MAX_TEXT_CHARS {
                return Err(AppError::InvalidPayload(format!(
                    "text exceeds {} characters",
                    MAX_TEXT_CHARS
                )));
            }
        }
        let attachment_id = match request.attachment_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| {
                AppError::InvalidPayload("attachmentId must be a UUID".to_string())
            })?),
        };
        if text.is_none() && attachment_id.is_none() {
            return Err(AppError::InvalidPayload(
                "message needs text or an attachment".to_string(),
            ));
        }

        if self
            .ports
            .relationships
            .is_blocked(sender.id, recipient.id)
            .await?
        {
            return Err(AppError::Blocked);
        }
        if !self
            .ports
            .relationships
            .are_friends(sender.id, recipient.id)
            .await?
        {
            return Err(AppError::NotFriends);
        }

        Ok(ValidatedSend {
            recipient,
            text,
            attachment_id,
        })
    }

    /// Runs the authorization chain, commits the message together with its
    /// fee, then notifies and delivers. Errors go back to the sender only.
    pub async fn send_message(
        &self,
        sender: &UserProfile,
        request: SendMessageRequest,
    ) -> Result<MessageReceipt, AppError> {
        let ValidatedSend {
            recipient,
            text,
            attachment_id,
        } = self.validate(sender, request).await?;

        let (conversation, _) = self
            .ports
            .conversations
            .find_or_create(sender.id, recipient.id)
            .await?;
        if !conversation.messaging_enabled {
            return Err(AppError::MessagingDisabled);
        }

        let attachment = match attachment_id {
            Some(id) => Some(
                self.ports
                    .attachments
                    .attachment(id)
                    .await?
                    .ok_or_else(|| AppError::InvalidPayload("attachment not found".to_string()))?,
            ),
            None => None,
        };

        let fee = &self.pricing.message_fee;
        let fee_entry = NewLedgerEntry::settled(
            sender.id,
            TransactionKind::Debit,
            fee.clone(),
            self.pricing.currency.clone(),
            MESSAGE_FEE_DESCRIPTION,
        );
        let message = NewMessage::from_user(conversation.id, sender.id, text, attachment_id);

        let message = match self
            .ports
            .conversations
            .send_paid_message(message, sender.wallet_id, fee, fee_entry)
            .await?
        {
            DebitOutcome::Committed(message) => message,
            DebitOutcome::InsufficientBalance => return Err(AppError::InsufficientBalance),
        };

        tracing::info!(
            message_id = %message.id,
            conversation_id = %conversation.id,
            sender_id = %sender.id,
            "Message committed"
        );

        self.notify(sender, &recipient, &message, attachment.as_ref());

        let payload = PrivateMessagePayload {
            sender_id: sender.id,
            sender_handle: sender.username.clone(),
            text: message.content.clone(),
            attachment: attachment.as_ref().map(|a| AttachmentPayload {
                id: a.id,
                url: a.url.clone(),
            }),
            message_id: message.id,
        };
        let delivered = match self.presence.lookup(recipient.id).await {
            Some(session) => session.send(ServerEvent::PrivateMessage(payload)),
            None => false,
        };
        if !delivered {
            tracing::debug!(recipient_id = %recipient.id, "Recipient offline, live delivery skipped");
        }

        Ok(MessageReceipt {
            message,
            attachment,
            delivered,
        })
    }

    fn notify(
        &self,
        sender: &UserProfile,
        recipient: &UserProfile,
        message: &Message,
        attachment: Option<&Attachment>,
    ) {
        let title = format!("New message from {}", sender.username);
        let body = match &message.content {
            Some(text) => preview(text),
            None => "Sent a file".to_string(),
        };
        let image = attachment
            .map(|a| a.url.clone())
            .or_else(|| sender.avatar_url.clone());
        self.notifier.dispatch(recipient.id, title, body, image);
    }

    /// Messages exchanged with `other`, oldest first. Empty when the pair
    /// has never talked.
    pub async fn history(
        &self,
        user: &UserProfile,
        other: Uuid,
        page: Page,
    ) -> Result<Vec<Message>, AppError> {
        match self.ports.conversations.find_between(user.id, other).await? {
            Some(conversation) => Ok(self
                .ports
                .conversations
                .messages(conversation.id, page.limit, page.offset)
                .await?),
            None => Ok(Vec::new()),
        }
    }
}
