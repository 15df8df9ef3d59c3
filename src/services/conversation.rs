use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Conversation, NewMessage};
use crate::error::AppError;
use crate::ports::{ConversationStore, RelationshipOracle};

pub const FRIENDSHIP_ANNOUNCEMENT: &str = "You are now friends";

/// Relationship changes reported by the friends service. Each one
/// re-evaluates the messaging flag of the pair's conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipEvent {
    Befriended { a: Uuid, b: Uuid },
    Unfriended { a: Uuid, b: Uuid },
    Blocked { blocker: Uuid, blocked: Uuid },
    Unblocked { blocker: Uuid, blocked: Uuid },
}

#[derive(Clone)]
pub struct ConversationService {
    relationships: Arc<dyn RelationshipOracle>,
    conversations: Arc<dyn ConversationStore>,
}

impl ConversationService {
    pub fn new(
        relationships: Arc<dyn RelationshipOracle>,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            relationships,
            conversations,
        }
    }

    /// Applies `event` and returns the conversation it touched, if any.
    pub async fn apply(&self, event: RelationshipEvent) -> Result<Option<Conversation>, AppError> {
        tracing::debug!(?event, "Applying relationship event");
        match event {
            RelationshipEvent::Befriended { a, b } => {
                if !self.relationships.are_friends(a, b).await? {
                    tracing::warn!(a = %a, b = %b, "Befriended event without a friendship, ignoring");
                    return Ok(self.conversations.find_between(a, b).await?);
                }
                let (conversation, created) = self.conversations.find_or_create(a, b).await?;
                if created {
                    self.conversations
                        .append_message(NewMessage::announcement(
                            conversation.id,
                            FRIENDSHIP_ANNOUNCEMENT,
                        ))
                        .await?;
                }
                let blocked = self.relationships.is_blocked(a, b).await?;
                self.set_enabled(conversation, !blocked).await.map(Some)
            }
            // Sending is already gated on friendship, so the flag stays as is.
            RelationshipEvent::Unfriended { a, b } => {
                Ok(self.conversations.find_between(a, b).await?)
            }
            RelationshipEvent::Blocked { blocker, blocked } => {
                let Some(conversation) = self.conversations.find_between(blocker, blocked).await?
                else {
                    return Ok(None);
                };
                if !self.relationships.is_blocked(blocker, blocked).await? {
                    tracing::warn!(
                        blocker = %blocker,
                        blocked = %blocked,
                        "Blocked event without a block, ignoring"
                    );
                    return Ok(Some(conversation));
                }
                self.set_enabled(conversation, false).await.map(Some)
            }
            RelationshipEvent::Unblocked { blocker, blocked } => {
                let Some(conversation) = self.conversations.find_between(blocker, blocked).await?
                else {
                    return Ok(None);
                };
                let friends = self.relationships.are_friends(blocker, blocked).await?;
                let still_blocked = self.relationships.is_blocked(blocker, blocked).await?;
                self.set_enabled(conversation, friends && !still_blocked)
                    .await
                    .map(Some)
            }
        }
    }

    async fn set_enabled(
        &self,
        mut conversation: Conversation,
        enabled: bool,
    ) -> Result<Conversation, AppError> {
        if conversation.messaging_enabled != enabled {
            self.conversations
                .set_messaging_enabled(conversation.id, enabled)
                .await?;
            tracing::info!(
                conversation_id = %conversation.id,
                messaging_enabled = enabled,
                "Conversation messaging flag changed"
            );
            conversation.messaging_enabled = enabled;
        }
        Ok(conversation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::domain::MessageKind;
    use bigdecimal::BigDecimal;

    fn service(store: &InMemoryStore) -> ConversationService {
        ConversationService::new(Arc::new(store.clone()), Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_befriending_creates_chat_with_announcement() {
        let store = InMemoryStore::new();
        let a = store.add_user("a", BigDecimal::from(0));
        let b = store.add_user("b", BigDecimal::from(0));
        store.befriend(a.id, b.id);

        let chat = service(&store)
            .apply(RelationshipEvent::Befriended { a: a.id, b: b.id })
            .await
            .unwrap()
            .unwrap();

        assert!(chat.messaging_enabled);
        let history = store.messages(chat.id, 10, 0).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, MessageKind::Announcement);
        assert_eq!(history[0].content.as_deref(), Some(FRIENDSHIP_ANNOUNCEMENT));
    }

    #[tokio::test]
    async fn test_befriending_again_adds_no_second_announcement() {
        let store = InMemoryStore::new();
        let a = store.add_user("a", BigDecimal::from(0));
        let b = store.add_user("b", BigDecimal::from(0));
        store.befriend(a.id, b.id);
        let svc = service(&store);

        svc.apply(RelationshipEvent::Befriended { a: a.id, b: b.id }).await.unwrap();
        let chat = svc
            .apply(RelationshipEvent::Befriended { a: b.id, b: a.id })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(store.messages(chat.id, 10, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_block_disables_and_unblock_restores_for_friends() {
        let store = InMemoryStore::new();
        let a = store.add_user("a", BigDecimal::from(0));
        let b = store.add_user("b", BigDecimal::from(0));
        store.befriend(a.id, b.id);
        let svc = service(&store);
        svc.apply(RelationshipEvent::Befriended { a: a.id, b: b.id }).await.unwrap();

        store.block(b.id, a.id);
        let chat = svc
            .apply(RelationshipEvent::Blocked { blocker: b.id, blocked: a.id })
            .await
            .unwrap()
            .unwrap();
        assert!(!chat.messaging_enabled);

        store.unblock(b.id, a.id);
        let chat = svc
            .apply(RelationshipEvent::Unblocked { blocker: b.id, blocked: a.id })
            .await
            .unwrap()
            .unwrap();
        assert!(chat.messaging_enabled);
    }

    #[tokio::test]
    async fn test_unblock_keeps_disabled_when_not_friends() {
        let store = InMemoryStore::new();
        let a = store.add_user("a", BigDecimal::from(0));
        let b = store.add_user("b", BigDecimal::from(0));
        store.befriend(a.id, b.id);
        let svc = service(&store);
        svc.apply(RelationshipEvent::Befriended { a: a.id, b: b.id }).await.unwrap();
        store.unfriend(a.id, b.id);
        store.block(a.id, b.id);
        svc.apply(RelationshipEvent::Blocked { blocker: a.id, blocked: b.id }).await.unwrap();
        store.unblock(a.id, b.id);

        let chat = svc
            .apply(RelationshipEvent::Unblocked { blocker: a.id, blocked: b.id })
            .await
            .unwrap()
            .unwrap();
        assert!(!chat.messaging_enabled);
    }

    #[tokio::test]
    async fn test_unblock_keeps_disabled_while_other_side_still_blocks() {
        let store = InMemoryStore::new();
        let a = store.add_user("a", BigDecimal::from(0));
        let b = store.add_user("b", BigDecimal::from(0));
        store.befriend(a.id, b.id);
        let svc = service(&store);
        svc.apply(RelationshipEvent::Befriended { a: a.id, b: b.id }).await.unwrap();

        store.block(a.id, b.id);
        store.block(b.id, a.id);
        svc.apply(RelationshipEvent::Blocked { blocker: a.id, blocked: b.id }).await.unwrap();

        store.unblock(a.id, b.id);
        let chat = svc
            .apply(RelationshipEvent::Unblocked { blocker: a.id, blocked: b.id })
            .await
            .unwrap()
            .unwrap();
        assert!(!chat.messaging_enabled);
    }

    #[tokio::test]
    async fn test_befriended_without_friendship_is_ignored() {
        let store = InMemoryStore::new();
        let a = store.add_user("a", BigDecimal::from(0));
        let b = store.add_user("b", BigDecimal::from(0));

        let result = service(&store)
            .apply(RelationshipEvent::Befriended { a: a.id, b: b.id })
            .await
            .unwrap();

        assert!(result.is_none());
        assert!(store.find_between(a.id, b.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_befriended_keeps_chat_closed_while_blocked() {
        let store = InMemoryStore::new();
        let a = store.add_user("a", BigDecimal::from(0));
        let b = store.add_user("b", BigDecimal::from(0));
        store.befriend(a.id, b.id);
        let svc = service(&store);
        svc.apply(RelationshipEvent::Befriended { a: a.id, b: b.id }).await.unwrap();

        store.block(b.id, a.id);
        svc.apply(RelationshipEvent::Blocked { blocker: b.id, blocked: a.id })
            .await
            .unwrap();

        let chat = svc
            .apply(RelationshipEvent::Befriended { a: a.id, b: b.id })
            .await
            .unwrap()
            .unwrap();
        assert!(!chat.messaging_enabled);
        let stored = store.find_between(a.id, b.id).await.unwrap().unwrap();
        assert!(!stored.messaging_enabled);
    }

    #[tokio::test]
    async fn test_first_befriending_while_blocked_creates_closed_chat() {
        let store = InMemoryStore::new();
        let a = store.add_user("a", BigDecimal::from(0));
        let b = store.add_user("b", BigDecimal::from(0));
        store.befriend(a.id, b.id);
        store.block(a.id, b.id);

        let chat = service(&store)
            .apply(RelationshipEvent::Befriended { a: a.id, b: b.id })
            .await
            .unwrap()
            .unwrap();
        assert!(!chat.messaging_enabled);
    }

    #[tokio::test]
    async fn test_blocked_event_without_block_leaves_chat_open() {
        let store = InMemoryStore::new();
        let a = store.add_user("a", BigDecimal::from(0));
        let b = store.add_user("b", BigDecimal::from(0));
        store.befriend(a.id, b.id);
        let svc = service(&store);
        svc.apply(RelationshipEvent::Befriended { a: a.id, b: b.id }).await.unwrap();

        let chat = svc
            .apply(RelationshipEvent::Blocked { blocker: a.id, blocked: b.id })
            .await
            .unwrap()
            .unwrap();
        assert!(chat.messaging_enabled);
        let stored = store.find_between(a.id, b.id).await.unwrap().unwrap();
        assert!(stored.messaging_enabled);
    }

    #[tokio::test]
    async fn test_events_without_chat_are_noops() {
        let store = InMemoryStore::new();
        let a = store.add_user("a", BigDecimal::from(0));
        let b = store.add_user("b", BigDecimal::from(0));
        let svc = service(&store);

        assert!(svc
            .apply(RelationshipEvent::Blocked { blocker: a.id, blocked: b.id })
            .await
            .unwrap()
            .is_none());
        assert!(svc
            .apply(RelationshipEvent::Unfriended { a: a.id, b: b.id })
            .await
            .unwrap()
            .is_none());
    }
}
