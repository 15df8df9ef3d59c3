//! In-process implementation of every storage port.
//!
//! All state sits behind one mutex, so each port method is a single atomic
//! unit. The lock is never held across an `.await`. Used by the test suite
//! and for running the gateway without Postgres.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::domain::{
    Attachment, Conversation, DebitOutcome, ExternalPaymentRefs, Gift, LedgerEntry, Message,
    NewLedgerEntry, NewMessage, TransactionStatus, UserProfile, Wallet,
};
use crate::ports::{
    AttachmentStore, ConversationStore, GiftCatalog, RelationshipOracle, RepositoryError,
    RepositoryResult, UserDirectory, WalletLedger,
};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, UserProfile>,
    wallets: HashMap<Uuid, Wallet>,
    friendships: HashSet<(Uuid, Uuid)>,
    /// (blocker, blocked)
    blocks: HashSet<(Uuid, Uuid)>,
    conversations: HashMap<Uuid, Conversation>,
    messages: Vec<Message>,
    attachments: HashMap<Uuid, Attachment>,
    gifts: Vec<Gift>,
    ledger: Vec<LedgerEntry>,
}

fn pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl State {
    fn wallet_mut(&mut self, wallet_id: Uuid) -> RepositoryResult<&mut Wallet> {
        self.wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", wallet_id)))
    }

    fn wallet_of_user(&self, user_id: Uuid) -> RepositoryResult<Uuid> {
        self.wallets
            .values()
            .find(|w| w.user_id == user_id)
            .map(|w| w.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet for user {}", user_id)))
    }

    fn can_debit(&self, wallet_id: Uuid, amount: &BigDecimal) -> RepositoryResult<bool> {
        self.wallets
            .get(&wallet_id)
            .map(|w| &w.balance >= amount)
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", wallet_id)))
    }

    fn adjust(&mut self, wallet_id: Uuid, delta: BigDecimal) -> RepositoryResult<Wallet> {
        let wallet = self.wallet_mut(wallet_id)?;
        wallet.balance = &wallet.balance + delta;
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }

    fn push_entry(&mut self, entry: NewLedgerEntry) -> RepositoryResult<LedgerEntry> {
        if self.ledger.iter().any(|e| e.id == entry.id) {
            return Err(RepositoryError::Conflict(format!(
                "transaction {} already exists",
                entry.id
            )));
        }
        let entry = entry.into_entry(Utc::now());
        self.ledger.push(entry.clone());
        Ok(entry)
    }

    /// Commit timestamp for the next message in a conversation, strictly after the last one.
    fn next_timestamp(&self, conversation_id: Uuid) -> DateTime<Utc> {
        let now = Utc::now();
        match self
            .messages
            .iter()
            .rev()
            .find(|m| m.conversation_id == conversation_id)
        {
            Some(last) if last.created_at >= now => last.created_at + Duration::microseconds(1),
            _ => now,
        }
    }

    fn insert_message(&mut self, message: NewMessage) -> Message {
        let created_at = self.next_timestamp(message.conversation_id);
        let message = message.into_message(created_at);
        if let Some(conversation) = self.conversations.get_mut(&message.conversation_id) {
            conversation.updated_at = created_at;
        }
        self.messages.push(message.clone());
        message
    }

    fn settleable_mut(&mut self, reference: &str) -> Option<&mut LedgerEntry> {
        self.ledger
            .iter_mut()
            .find(|e| e.id == reference && e.status.is_settleable())
    }
}

fn apply_refs(entry: &mut LedgerEntry, refs: &ExternalPaymentRefs) {
    if refs.transaction_id.is_some() {
        entry.external_transaction_id = refs.transaction_id.clone();
    }
    if refs.reference.is_some() {
        entry.external_reference = refs.reference.clone();
    }
    entry.updated_at = Utc::now();
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a user together with a wallet holding `balance`.
    pub fn add_user(&self, username: &str, balance: BigDecimal) -> UserProfile {
        let user = UserProfile {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{}@example.com", username),
            first_name: None,
            last_name: None,
            wallet_id: Uuid::new_v4(),
            push_token: None,
            avatar_url: None,
        };
        self.insert_user(user.clone(), balance);
        user
    }

    pub fn insert_user(&self, user: UserProfile, balance: BigDecimal) {
        let mut state = self.state();
        state.wallets.insert(
            user.wallet_id,
            Wallet {
                id: user.wallet_id,
                user_id: user.id,
                balance,
                updated_at: Utc::now(),
            },
        );
        state.users.insert(user.id, user);
    }

    pub fn befriend(&self, a: Uuid, b: Uuid) {
        self.state().friendships.insert(pair(a, b));
    }

    pub fn unfriend(&self, a: Uuid, b: Uuid) {
        self.state().friendships.remove(&pair(a, b));
    }

    pub fn block(&self, blocker: Uuid, blocked: Uuid) {
        self.state().blocks.insert((blocker, blocked));
    }

    pub fn unblock(&self, blocker: Uuid, blocked: Uuid) {
        self.state().blocks.remove(&(blocker, blocked));
    }

    pub fn add_attachment(&self, url: &str) -> Attachment {
        let attachment = Attachment {
            id: Uuid::new_v4(),
            url: url.to_string(),
            created_at: Utc::now(),
        };
        self.state()
            .attachments
            .insert(attachment.id, attachment.clone());
        attachment
    }

    pub fn add_gift(&self, name: &str, points: BigDecimal) -> Gift {
        let gift = Gift {
            id: Uuid::new_v4(),
            name: name.to_string(),
            points,
            image_url: None,
        };
        self.state().gifts.push(gift.clone());
        gift
    }

    pub fn balance(&self, wallet_id: Uuid) -> Option<BigDecimal> {
        self.state().wallets.get(&wallet_id).map(|w| w.balance.clone())
    }

    pub fn message_count(&self) -> usize {
        self.state().messages.len()
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_user(&self, id: Uuid) -> RepositoryResult<Option<UserProfile>> {
        Ok(self.state().users.get(&id).cloned())
    }
}

#[async_trait]
impl RelationshipOracle for InMemoryStore {
    async fn are_friends(&self, a: Uuid, b: Uuid) -> RepositoryResult<bool> {
        Ok(self.state().friendships.contains(&pair(a, b)))
    }

    async fn is_blocked(&self, a: Uuid, b: Uuid) -> RepositoryResult<bool> {
        let state = self.state();
        Ok(state.blocks.contains(&(a, b)) || state.blocks.contains(&(b, a)))
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn find_between(&self, a: Uuid, b: Uuid) -> RepositoryResult<Option<Conversation>> {
        Ok(self
            .state()
            .conversations
            .values()
            .find(|c| c.is_between(a, b))
            .cloned())
    }

    async fn find_or_create(&self, a: Uuid, b: Uuid) -> RepositoryResult<(Conversation, bool)> {
        let mut state = self.state();
        if let Some(existing) = state.conversations.values().find(|c| c.is_between(a, b)) {
            return Ok((existing.clone(), false));
        }
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            participants: [a, b],
            messaging_enabled: true,
            created_at: now,
            updated_at: now,
        };
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok((conversation, true))
    }

    async fn set_messaging_enabled(
        &self,
        conversation_id: Uuid,
        enabled: bool,
    ) -> RepositoryResult<()> {
        let mut state = self.state();
        let conversation = state
            .conversations
            .get_mut(&conversation_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("chat {}", conversation_id)))?;
        conversation.messaging_enabled = enabled;
        conversation.updated_at = Utc::now();
        Ok(())
    }

    async fn append_message(&self, message: NewMessage) -> RepositoryResult<Message> {
        let mut state = self.state();
        if !state.conversations.contains_key(&message.conversation_id) {
            return Err(RepositoryError::NotFound(format!(
                "chat {}",
                message.conversation_id
            )));
        }
        Ok(state.insert_message(message))
    }

    async fn send_paid_message(
        &self,
        message: NewMessage,
        wallet_id: Uuid,
        fee: &BigDecimal,
        fee_entry: NewLedgerEntry,
    ) -> RepositoryResult<DebitOutcome<Message>> {
        let mut state = self.state();
        if !state.conversations.contains_key(&message.conversation_id) {
            return Err(RepositoryError::NotFound(format!(
                "chat {}",
                message.conversation_id
            )));
        }
        if !state.can_debit(wallet_id, fee)? {
            return Ok(DebitOutcome::InsufficientBalance);
        }
        state.push_entry(fee_entry)?;
        state.adjust(wallet_id, -fee.clone())?;
        Ok(DebitOutcome::Committed(state.insert_message(message)))
    }

    async fn messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Message>> {
        Ok(self
            .state()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AttachmentStore for InMemoryStore {
    async fn attachment(&self, id: Uuid) -> RepositoryResult<Option<Attachment>> {
        Ok(self.state().attachments.get(&id).cloned())
    }
}

#[async_trait]
impl GiftCatalog for InMemoryStore {
    async fn gift(&self, id: Uuid) -> RepositoryResult<Option<Gift>> {
        Ok(self.state().gifts.iter().find(|g| g.id == id).cloned())
    }

    async fn gifts(&self, limit: i64, offset: i64) -> RepositoryResult<(Vec<Gift>, i64)> {
        let state = self.state();
        let page = state
            .gifts
            .iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, state.gifts.len() as i64))
    }
}

#[async_trait]
impl WalletLedger for InMemoryStore {
    async fn wallet(&self, wallet_id: Uuid) -> RepositoryResult<Wallet> {
        self.state()
            .wallets
            .get(&wallet_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", wallet_id)))
    }

    async fn debit(
        &self,
        wallet_id: Uuid,
        amount: &BigDecimal,
        entry: NewLedgerEntry,
    ) -> RepositoryResult<DebitOutcome<Wallet>> {
        let mut state = self.state();
        if !state.can_debit(wallet_id, amount)? {
            return Ok(DebitOutcome::InsufficientBalance);
        }
        state.push_entry(entry)?;
        let wallet = state.adjust(wallet_id, -amount.clone())?;
        Ok(DebitOutcome::Committed(wallet))
    }

    async fn credit(
        &self,
        wallet_id: Uuid,
        amount: &BigDecimal,
        entry: NewLedgerEntry,
    ) -> RepositoryResult<Wallet> {
        let mut state = self.state();
        state.wallet_mut(wallet_id)?;
        state.push_entry(entry)?;
        state.adjust(wallet_id, amount.clone())
    }

    async fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        amount: &BigDecimal,
        debit_entry: NewLedgerEntry,
        credit_entry: NewLedgerEntry,
    ) -> RepositoryResult<DebitOutcome<Wallet>> {
        let mut state = self.state();
        state.wallet_mut(to)?;
        if !state.can_debit(from, amount)? {
            return Ok(DebitOutcome::InsufficientBalance);
        }
        if debit_entry.id == credit_entry.id
            || state
                .ledger
                .iter()
                .any(|e| e.id == debit_entry.id || e.id == credit_entry.id)
        {
            return Err(RepositoryError::Conflict("transfer entry ids must be new".to_string()));
        }
        state.push_entry(debit_entry)?;
        state.push_entry(credit_entry)?;
        let sender = state.adjust(from, -amount.clone())?;
        state.adjust(to, amount.clone())?;
        Ok(DebitOutcome::Committed(sender))
    }

    async fn record_transaction(&self, entry: NewLedgerEntry) -> RepositoryResult<LedgerEntry> {
        self.state().push_entry(entry)
    }

    async fn find_settleable(&self, reference: &str) -> RepositoryResult<Option<LedgerEntry>> {
        Ok(self
            .state()
            .ledger
            .iter()
            .find(|e| e.id == reference && e.status.is_settleable())
            .cloned())
    }

    async fn settle_top_up(
        &self,
        reference: &str,
        credit: &BigDecimal,
        refs: &ExternalPaymentRefs,
    ) -> RepositoryResult<Option<LedgerEntry>> {
        let mut state = self.state();
        let user_id = match state.settleable_mut(reference) {
            Some(entry) => entry.user_id,
            None => return Ok(None),
        };
        let wallet_id = state.wallet_of_user(user_id)?;
        state.adjust(wallet_id, credit.clone())?;

        let entry = state
            .settleable_mut(reference)
            .ok_or_else(|| RepositoryError::NotFound(reference.to_string()))?;
        entry.status = TransactionStatus::Success;
        apply_refs(entry, refs);
        Ok(Some(entry.clone()))
    }

    async fn fail_top_up(
        &self,
        reference: &str,
        refs: &ExternalPaymentRefs,
    ) -> RepositoryResult<Option<LedgerEntry>> {
        let mut state = self.state();
        Ok(state.settleable_mut(reference).map(|entry| {
            entry.status = TransactionStatus::Failed;
            apply_refs(entry, refs);
            entry.clone()
        }))
    }

    async fn transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<(Vec<LedgerEntry>, i64)> {
        let state = self.state();
        let owned: Vec<&LedgerEntry> = state.ledger.iter().filter(|e| e.user_id == user_id).collect();
        let total = owned.len() as i64;
        let page = owned
            .into_iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn transaction(&self, user_id: Uuid, id: &str) -> RepositoryResult<Option<LedgerEntry>> {
        Ok(self
            .state()
            .ledger
            .iter()
            .find(|e| e.id == id && e.user_id == user_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransactionKind;

    fn fee_entry(user_id: Uuid) -> NewLedgerEntry {
        NewLedgerEntry::settled(
            user_id,
            TransactionKind::Debit,
            BigDecimal::from(1),
            "USD",
            "Sent Message Fee",
        )
    }

    #[tokio::test]
    async fn test_find_or_create_is_idempotent_per_pair() {
        let store = InMemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let (first, created) = store.find_or_create(a, b).await.unwrap();
        assert!(created);
        assert!(first.messaging_enabled);

        let (second, created) = store.find_or_create(b, a).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_paid_message_rolls_back_when_short() {
        let store = InMemoryStore::new();
        let sender = store.add_user("sender", BigDecimal::from(0));
        let (chat, _) = store.find_or_create(sender.id, Uuid::new_v4()).await.unwrap();

        let outcome = store
            .send_paid_message(
                NewMessage::from_user(chat.id, sender.id, Some("hi".into()), None),
                sender.wallet_id,
                &BigDecimal::from(1),
                fee_entry(sender.id),
            )
            .await
            .unwrap();

        assert_eq!(outcome, DebitOutcome::InsufficientBalance);
        assert_eq!(store.message_count(), 0);
        let (entries, total) = store.transactions(sender.id, 10, 0).await.unwrap();
        assert!(entries.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_message_timestamps_strictly_increase() {
        let store = InMemoryStore::new();
        let (chat, _) = store
            .find_or_create(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();

        for i in 0..50 {
            store
                .append_message(NewMessage::announcement(chat.id, format!("note {}", i)))
                .await
                .unwrap();
        }

        let history = store.messages(chat.id, 100, 0).await.unwrap();
        assert_eq!(history.len(), 50);
        assert!(history.windows(2).all(|w| w[0].created_at < w[1].created_at));
    }

    #[tokio::test]
    async fn test_transfer_requires_receiver_wallet() {
        let store = InMemoryStore::new();
        let sender = store.add_user("sender", BigDecimal::from(10));

        let result = store
            .transfer(
                sender.wallet_id,
                Uuid::new_v4(),
                &BigDecimal::from(1),
                fee_entry(sender.id),
                fee_entry(sender.id),
            )
            .await;

        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
        assert_eq!(store.balance(sender.wallet_id), Some(BigDecimal::from(10)));
    }

    #[tokio::test]
    async fn test_duplicate_ledger_id_is_rejected() {
        let store = InMemoryStore::new();
        let entry = fee_entry(Uuid::new_v4());

        store.record_transaction(entry.clone()).await.unwrap();
        let result = store.record_transaction(entry).await;

        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
    }
}
