//! Postgres implementation of the storage ports.

use async_trait::async_trait;
use sqlx::types::BigDecimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{pair_key, TransactionRow};
use crate::db::queries;
use crate::domain::{
    Attachment, Conversation, DebitOutcome, ExternalPaymentRefs, Gift, LedgerEntry, Message,
    NewLedgerEntry, NewMessage, TransactionStatus, UserProfile, Wallet,
};
use crate::ports::{
    AttachmentStore, ConversationStore, GiftCatalog, RelationshipOracle, RepositoryError,
    RepositoryResult, UserDirectory, WalletLedger,
};

/// Postgres-backed store. Every multi-row mutation runs inside one sqlx
/// transaction that is rolled back on drop if any step fails.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn entries(rows: Vec<TransactionRow>) -> RepositoryResult<Vec<LedgerEntry>> {
    rows.into_iter().map(TransactionRow::into_domain).collect()
}

#[async_trait]
impl UserDirectory for PostgresStore {
    async fn find_user(&self, id: Uuid) -> RepositoryResult<Option<UserProfile>> {
        let row = queries::get_user(&self.pool, id).await?;
        Ok(row.map(|r| r.into_domain()))
    }
}

#[async_trait]
impl RelationshipOracle for PostgresStore {
    async fn are_friends(&self, a: Uuid, b: Uuid) -> RepositoryResult<bool> {
        Ok(queries::are_friends(&self.pool, a, b).await?)
    }

    async fn is_blocked(&self, a: Uuid, b: Uuid) -> RepositoryResult<bool> {
        Ok(queries::is_blocked_either_way(&self.pool, a, b).await?)
    }
}

#[async_trait]
impl ConversationStore for PostgresStore {
    async fn find_between(&self, a: Uuid, b: Uuid) -> RepositoryResult<Option<Conversation>> {
        queries::get_chat_by_pair(&self.pool, &pair_key(a, b))
            .await?
            .map(|row| row.into_domain())
            .transpose()
    }

    async fn find_or_create(&self, a: Uuid, b: Uuid) -> RepositoryResult<(Conversation, bool)> {
        let key = pair_key(a, b);
        let mut tx = self.pool.begin().await?;
        let inserted = queries::insert_chat_if_absent(&mut tx, &key, [a, b]).await?;
        tx.commit().await?;

        if let Some(row) = inserted {
            return Ok((row.into_domain()?, true));
        }

        let row = queries::get_chat_by_pair(&self.pool, &key)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("chat {}", key)))?;
        Ok((row.into_domain()?, false))
    }

    async fn set_messaging_enabled(
        &self,
        conversation_id: Uuid,
        enabled: bool,
    ) -> RepositoryResult<()> {
        let affected = queries::set_chat_messaging(&self.pool, conversation_id, enabled).await?;
        if affected == 0 {
            return Err(RepositoryError::NotFound(format!("chat {}", conversation_id)));
        }
        Ok(())
    }

    async fn append_message(&self, message: NewMessage) -> RepositoryResult<Message> {
        let mut tx = self.pool.begin().await?;
        queries::lock_chat(&mut tx, message.conversation_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("chat {}", message.conversation_id)))?;
        let row = queries::insert_message(&mut tx, &message).await?;
        tx.commit().await?;
        row.into_domain()
    }

    async fn send_paid_message(
        &self,
        message: NewMessage,
        wallet_id: Uuid,
        fee: &BigDecimal,
        fee_entry: NewLedgerEntry,
    ) -> RepositoryResult<DebitOutcome<Message>> {
        let mut tx = self.pool.begin().await?;
        queries::lock_chat(&mut tx, message.conversation_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("chat {}", message.conversation_id)))?;

        if queries::debit_wallet(&mut tx, wallet_id, fee).await?.is_none() {
            tx.rollback().await?;
            return Ok(DebitOutcome::InsufficientBalance);
        }
        queries::insert_transaction(&mut tx, &fee_entry).await?;
        let row = queries::insert_message(&mut tx, &message).await?;
        tx.commit().await?;

        Ok(DebitOutcome::Committed(row.into_domain()?))
    }

    async fn messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Message>> {
        queries::list_messages(&self.pool, conversation_id, limit, offset)
            .await?
            .into_iter()
            .map(|row| row.into_domain())
            .collect()
    }
}

#[async_trait]
impl AttachmentStore for PostgresStore {
    async fn attachment(&self, id: Uuid) -> RepositoryResult<Option<Attachment>> {
        Ok(queries::get_file(&self.pool, id).await?.map(Attachment::from))
    }
}

#[async_trait]
impl GiftCatalog for PostgresStore {
    async fn gift(&self, id: Uuid) -> RepositoryResult<Option<Gift>> {
        Ok(queries::get_gift(&self.pool, id).await?.map(Gift::from))
    }

    async fn gifts(&self, limit: i64, offset: i64) -> RepositoryResult<(Vec<Gift>, i64)> {
        let rows = queries::list_gifts(&self.pool, limit, offset).await?;
        let total = queries::count_gifts(&self.pool).await?;
        Ok((rows.into_iter().map(Gift::from).collect(), total))
    }
}

#[async_trait]
impl WalletLedger for PostgresStore {
    async fn wallet(&self, wallet_id: Uuid) -> RepositoryResult<Wallet> {
        queries::get_wallet(&self.pool, wallet_id)
            .await?
            .map(|row| row.into_domain())
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", wallet_id)))
    }

    async fn debit(
        &self,
        wallet_id: Uuid,
        amount: &BigDecimal,
        entry: NewLedgerEntry,
    ) -> RepositoryResult<DebitOutcome<Wallet>> {
        let mut tx = self.pool.begin().await?;
        let Some(wallet) = queries::debit_wallet(&mut tx, wallet_id, amount).await? else {
            tx.rollback().await?;
            return Ok(DebitOutcome::InsufficientBalance);
        };
        queries::insert_transaction(&mut tx, &entry).await?;
        tx.commit().await?;
        Ok(DebitOutcome::Committed(wallet.into_domain()))
    }

    async fn credit(
        &self,
        wallet_id: Uuid,
        amount: &BigDecimal,
        entry: NewLedgerEntry,
    ) -> RepositoryResult<Wallet> {
        let mut tx = self.pool.begin().await?;
        let wallet = queries::credit_wallet(&mut tx, wallet_id, amount)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", wallet_id)))?;
        queries::insert_transaction(&mut tx, &entry).await?;
        tx.commit().await?;
        Ok(wallet.into_domain())
    }

    async fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        amount: &BigDecimal,
        debit_entry: NewLedgerEntry,
        credit_entry: NewLedgerEntry,
    ) -> RepositoryResult<DebitOutcome<Wallet>> {
        let mut tx = self.pool.begin().await?;
        let Some(sender) = queries::debit_wallet(&mut tx, from, amount).await? else {
            tx.rollback().await?;
            return Ok(DebitOutcome::InsufficientBalance);
        };
        // Dropping `tx` on the error path rolls the debit back.
        queries::credit_wallet(&mut tx, to, amount)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", to)))?;
        queries::insert_transaction(&mut tx, &debit_entry).await?;
        queries::insert_transaction(&mut tx, &credit_entry).await?;
        tx.commit().await?;
        Ok(DebitOutcome::Committed(sender.into_domain()))
    }

    async fn record_transaction(&self, entry: NewLedgerEntry) -> RepositoryResult<LedgerEntry> {
        let mut tx = self.pool.begin().await?;
        let row = queries::insert_transaction(&mut tx, &entry).await?;
        tx.commit().await?;
        row.into_domain()
    }

    async fn find_settleable(&self, reference: &str) -> RepositoryResult<Option<LedgerEntry>> {
        queries::get_settleable_transaction(&self.pool, reference)
            .await?
            .map(TransactionRow::into_domain)
            .transpose()
    }

    async fn settle_top_up(
        &self,
        reference: &str,
        credit: &BigDecimal,
        refs: &ExternalPaymentRefs,
    ) -> RepositoryResult<Option<LedgerEntry>> {
        let mut tx = self.pool.begin().await?;
        let Some(row) =
            queries::transition_transaction(&mut tx, reference, TransactionStatus::Success, refs)
                .await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };
        queries::credit_user_wallet(&mut tx, row.user_id, credit)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet for user {}", row.user_id)))?;
        tx.commit().await?;
        row.into_domain().map(Some)
    }

    async fn fail_top_up(
        &self,
        reference: &str,
        refs: &ExternalPaymentRefs,
    ) -> RepositoryResult<Option<LedgerEntry>> {
        let mut tx = self.pool.begin().await?;
        let row =
            queries::transition_transaction(&mut tx, reference, TransactionStatus::Failed, refs)
                .await?;
        tx.commit().await?;
        row.map(TransactionRow::into_domain).transpose()
    }

    async fn transactions(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<(Vec<LedgerEntry>, i64)> {
        let rows = queries::list_user_transactions(&self.pool, user_id, limit, offset).await?;
        let total = queries::count_user_transactions(&self.pool, user_id).await?;
        Ok((entries(rows)?, total))
    }

    async fn transaction(&self, user_id: Uuid, id: &str) -> RepositoryResult<Option<LedgerEntry>> {
        queries::get_user_transaction(&self.pool, user_id, id)
            .await?
            .map(TransactionRow::into_domain)
            .transpose()
    }
}
