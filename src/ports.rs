//! Seams between the services and whatever stores or remote systems back them.
//! Postgres and in-memory implementations live in `crate::adapters`.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    Attachment, Conversation, DebitOutcome, ExternalPaymentRefs, Gift, LedgerEntry, Message,
    NewLedgerEntry, NewMessage, UserProfile, Wallet,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Read-only view of the user table owned by the profile service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: Uuid) -> RepositoryResult<Option<UserProfile>>;
}

/// Friendship and block state, owned by the friends service.
#[async_trait]
pub trait RelationshipOracle: Send + Sync {
    async fn are_friends(&self, a: Uuid, b: Uuid) -> RepositoryResult<bool>;

    /// True if either user blocks the other.
    async fn is_blocked(&self, a: Uuid, b: Uuid) -> RepositoryResult<bool>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn find_between(&self, a: Uuid, b: Uuid) -> RepositoryResult<Option<Conversation>>;

    /// Returns the conversation for `{a, b}` and whether it was created by this call.
    async fn find_or_create(&self, a: Uuid, b: Uuid) -> RepositoryResult<(Conversation, bool)>;

    async fn set_messaging_enabled(&self, conversation_id: Uuid, enabled: bool)
        -> RepositoryResult<()>;

    /// Appends a message that carries no fee (announcements).
    async fn append_message(&self, message: NewMessage) -> RepositoryResult<Message>;

    /// Persists `message`, debits `fee` from `wallet_id` and records `fee_entry`
    /// as one unit. Nothing is written when the balance is below the fee.
    async fn send_paid_message(
        &self,
        message: NewMessage,
        wallet_id: Uuid,
        fee: &BigDecimal,
        fee_entry: NewLedgerEntry,
    ) -> RepositoryResult<DebitOutcome<Message>>;

    /// Conversation history, oldest first.
    async fn messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Message>>;
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn attachment(&self, id: Uuid) -> RepositoryResult<Option<Attachment>>;
}

#[async_trait]
pub trait GiftCatalog: Send + Sync {
    async fn gift(&self, id: Uuid) -> RepositoryResult<Option<Gift>>;

    async fn gifts(&self, limit: i64, offset: i64) -> RepositoryResult<(Vec<Gift>, i64)>;
}

/// Balance mutation and ledger rows. Every method that changes a balance
/// writes its ledger row in the same unit.
#[async_trait]
pub trait WalletLedger: Send + Sync {
    async fn wallet(&self, wallet_id: Uuid) -> RepositoryResult<Wallet>;

    async fn debit(
        &self,
        wallet_id: Uuid,
        amount: &BigDecimal,
        entry: NewLedgerEntry,
    ) -> RepositoryResult<DebitOutcome<Wallet>>;

    async fn credit(
        &self,
        wallet_id: Uuid,
        amount: &BigDecimal,
        entry: NewLedgerEntry,
    ) -> RepositoryResult<Wallet>;

    /// Debits `from` and credits `to` as one unit; returns the sender's wallet.
    async fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        amount: &BigDecimal,
        debit_entry: NewLedgerEntry,
        credit_entry: NewLedgerEntry,
    ) -> RepositoryResult<DebitOutcome<Wallet>>;

    async fn record_transaction(&self, entry: NewLedgerEntry) -> RepositoryResult<LedgerEntry>;

    /// Looks up a ledger entry that has not reached `success`.
    async fn find_settleable(&self, reference: &str) -> RepositoryResult<Option<LedgerEntry>>;

    /// Moves a not-yet-successful entry to `success` and credits the owner's
    /// wallet by `credit` as one unit. `None` when another caller got there first.
    async fn settle_top_up(
        &self,
        reference: &str,
        credit: &BigDecimal,
        refs: &ExternalPaymentRefs,
    ) -> RepositoryResult<Option<LedgerEntry>>;

    /// Moves a not-yet-successful entry to `failed`. `None` when it already succeeded.
    async fn fail_top_up(
        &self,
        reference: &str,
        refs: &ExternalPaymentRefs,
    ) -> RepositoryResult<Option<LedgerEntry>>;

    /// A user's ledger, newest first, with the total row count.
    async fn transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<(Vec<LedgerEntry>, i64)>;

    async fn transaction(&self, user_id: Uuid, id: &str) -> RepositoryResult<Option<LedgerEntry>>;
}

/// Everything the services need from one storage backend.
pub trait Store:
    UserDirectory + RelationshipOracle + ConversationStore + AttachmentStore + GiftCatalog + WalletLedger
{
}

impl<T> Store for T where
    T: UserDirectory
        + RelationshipOracle
        + ConversationStore
        + AttachmentStore
        + GiftCatalog
        + WalletLedger
{
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token rejected")]
    Rejected,
    #[error("token has no usable subject")]
    InvalidSubject,
}

/// Verifies bearer credentials issued by the auth service.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Uuid, TokenError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLinkRequest {
    pub reference: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub redirect_url: String,
    pub customer_email: String,
    pub customer_name: String,
}

/// The hosted-payment provider, used both to open a checkout and to confirm it.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// `Ok(None)` when the provider answered without a usable link.
    async fn create_payment_link(
        &self,
        request: &PaymentLinkRequest,
    ) -> Result<Option<String>, crate::payments::PaymentGatewayError>;

    /// Whether the provider reports the payment for `reference` as paid.
    async fn verify_payment(
        &self,
        reference: &str,
    ) -> Result<bool, crate::payments::PaymentGatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    pub to: String,
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push request failed: {0}")]
    Transport(String),
    #[error("push rejected by provider: {0}")]
    Rejected(String),
}

/// Delivery transport for device notifications.
#[async_trait]
pub trait PushSink: Send + Sync {
    async fn push(&self, notification: &PushNotification) -> Result<(), PushError>;
}
