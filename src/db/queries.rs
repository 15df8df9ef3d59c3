use sqlx::types::BigDecimal;
use sqlx::{PgPool, Postgres, Result, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::db::models::{
    ChatRow, FileRow, GiftRow, MessageRow, TransactionRow, UserRow, WalletRow,
};
use crate::domain::{ExternalPaymentRefs, NewLedgerEntry, NewMessage, TransactionStatus};

// --- Users and relationships ---

pub async fn get_user(pool: &PgPool, id: Uuid) -> Result<Option<UserRow>> {
    sqlx::query_as::<_, UserRow>(
        r#"
        SELECT u.id, u.username, u.email, u.first_name, u.last_name,
               u.fcm_token, u.avatar_url, w.id AS wallet_id
        FROM users u
        JOIN wallets w ON w.user_id = u.id
        WHERE u.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn are_friends(pool: &PgPool, a: Uuid, b: Uuid) -> Result<bool> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM friendships
            WHERE (user_id = $1 AND friend_id = $2)
               OR (user_id = $2 AND friend_id = $1)
        )
        "#,
    )
    .bind(a)
    .bind(b)
    .fetch_one(pool)
    .await
}

pub async fn is_blocked_either_way(pool: &PgPool, a: Uuid, b: Uuid) -> Result<bool> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM blocked_users
            WHERE (user_id = $1 AND blocked_user_id = $2)
               OR (user_id = $2 AND blocked_user_id = $1)
        )
        "#,
    )
    .bind(a)
    .bind(b)
    .fetch_one(pool)
    .await
}

// --- Chats and messages ---

pub async fn get_chat_by_pair(pool: &PgPool, pair_key: &str) -> Result<Option<ChatRow>> {
    sqlx::query_as::<_, ChatRow>("SELECT * FROM chats WHERE pair_key = $1")
        .bind(pair_key)
        .fetch_optional(pool)
        .await
}

/// Inserts the chat unless the pair already owns one. `None` means another
/// writer created it first.
pub async fn insert_chat_if_absent(
    executor: &mut SqlxTransaction<'_, Postgres>,
    pair_key: &str,
    participants: [Uuid; 2],
) -> Result<Option<ChatRow>> {
    let row = sqlx::query_as::<_, ChatRow>(
        r#"
        INSERT INTO chats (id, pair_key, can_send_messages, created_at, updated_at)
        VALUES ($1, $2, TRUE, NOW(), NOW())
        ON CONFLICT (pair_key) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(pair_key)
    .fetch_optional(&mut **executor)
    .await?;

    if let Some(chat) = &row {
        sqlx::query(
            "INSERT INTO chat_participants (chat_id, user_id) VALUES ($1, $2), ($1, $3)",
        )
        .bind(chat.id)
        .bind(participants[0])
        .bind(participants[1])
        .execute(&mut **executor)
        .await?;
    }

    Ok(row)
}

pub async fn set_chat_messaging(pool: &PgPool, chat_id: Uuid, enabled: bool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE chats SET can_send_messages = $1, updated_at = NOW() WHERE id = $2",
    )
    .bind(enabled)
    .bind(chat_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Takes the row lock that serializes message appends within one chat.
pub async fn lock_chat(
    executor: &mut SqlxTransaction<'_, Postgres>,
    chat_id: Uuid,
) -> Result<Option<ChatRow>> {
    sqlx::query_as::<_, ChatRow>("SELECT * FROM chats WHERE id = $1 FOR UPDATE")
        .bind(chat_id)
        .fetch_optional(&mut **executor)
        .await
}

/// Appends a message stamped strictly after the chat's latest one. The
/// caller must hold the chat lock.
pub async fn insert_message(
    executor: &mut SqlxTransaction<'_, Postgres>,
    message: &NewMessage,
) -> Result<MessageRow> {
    let row = sqlx::query_as::<_, MessageRow>(
        r#"
        INSERT INTO messages (id, chat_id, user_id, type, content, file_id, created_at)
        SELECT $1, $2, $3, $4, $5, $6,
               GREATEST(
                   clock_timestamp(),
                   COALESCE(MAX(created_at) + INTERVAL '1 microsecond', clock_timestamp())
               )
        FROM messages
        WHERE chat_id = $2
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(message.conversation_id)
    .bind(message.sender_id)
    .bind(message.kind.as_str())
    .bind(&message.content)
    .bind(message.attachment_id)
    .fetch_one(&mut **executor)
    .await?;

    sqlx::query("UPDATE chats SET updated_at = $1 WHERE id = $2")
        .bind(row.created_at)
        .bind(row.chat_id)
        .execute(&mut **executor)
        .await?;

    Ok(row)
}

pub async fn list_messages(
    pool: &PgPool,
    chat_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<MessageRow>> {
    sqlx::query_as::<_, MessageRow>(
        "SELECT * FROM messages WHERE chat_id = $1 ORDER BY created_at ASC LIMIT $2 OFFSET $3",
    )
    .bind(chat_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn get_file(pool: &PgPool, id: Uuid) -> Result<Option<FileRow>> {
    sqlx::query_as::<_, FileRow>("SELECT id, url, created_at FROM files WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

// --- Gifts ---

pub async fn get_gift(pool: &PgPool, id: Uuid) -> Result<Option<GiftRow>> {
    sqlx::query_as::<_, GiftRow>("SELECT id, name, points, image_url FROM gifts WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_gifts(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<GiftRow>> {
    sqlx::query_as::<_, GiftRow>(
        "SELECT id, name, points, image_url FROM gifts ORDER BY points ASC, name ASC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_gifts(pool: &PgPool) -> Result<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM gifts")
        .fetch_one(pool)
        .await
}

// --- Wallets ---

pub async fn get_wallet(pool: &PgPool, id: Uuid) -> Result<Option<WalletRow>> {
    sqlx::query_as::<_, WalletRow>("SELECT * FROM wallets WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Conditional debit: `None` when the wallet is missing or holds less than `amount`.
pub async fn debit_wallet(
    executor: &mut SqlxTransaction<'_, Postgres>,
    wallet_id: Uuid,
    amount: &BigDecimal,
) -> Result<Option<WalletRow>> {
    sqlx::query_as::<_, WalletRow>(
        r#"
        UPDATE wallets
        SET balance = balance - $1, updated_at = NOW()
        WHERE id = $2 AND balance >= $1
        RETURNING *
        "#,
    )
    .bind(amount)
    .bind(wallet_id)
    .fetch_optional(&mut **executor)
    .await
}

pub async fn credit_wallet(
    executor: &mut SqlxTransaction<'_, Postgres>,
    wallet_id: Uuid,
    amount: &BigDecimal,
) -> Result<Option<WalletRow>> {
    sqlx::query_as::<_, WalletRow>(
        "UPDATE wallets SET balance = balance + $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(amount)
    .bind(wallet_id)
    .fetch_optional(&mut **executor)
    .await
}

pub async fn credit_user_wallet(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    amount: &BigDecimal,
) -> Result<Option<WalletRow>> {
    sqlx::query_as::<_, WalletRow>(
        "UPDATE wallets SET balance = balance + $1, updated_at = NOW() WHERE user_id = $2 RETURNING *",
    )
    .bind(amount)
    .bind(user_id)
    .fetch_optional(&mut **executor)
    .await
}

// --- Ledger ---

pub async fn insert_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    entry: &NewLedgerEntry,
) -> Result<TransactionRow> {
    sqlx::query_as::<_, TransactionRow>(
        r#"
        INSERT INTO transactions (
            id, user_id, amount, currency, status, type, description, payment_link,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(&entry.id)
    .bind(entry.user_id)
    .bind(&entry.amount)
    .bind(&entry.currency)
    .bind(entry.status.as_str())
    .bind(entry.kind.as_str())
    .bind(&entry.description)
    .bind(&entry.payment_link)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_settleable_transaction(
    pool: &PgPool,
    reference: &str,
) -> Result<Option<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(
        "SELECT * FROM transactions WHERE id = $1 AND status <> 'success'",
    )
    .bind(reference)
    .fetch_optional(pool)
    .await
}

/// Moves a not-yet-successful row to `status`. The `status <> 'success'`
/// guard makes the transition happen at most once per reference.
pub async fn transition_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    reference: &str,
    status: TransactionStatus,
    refs: &ExternalPaymentRefs,
) -> Result<Option<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(
        r#"
        UPDATE transactions
        SET status = $2,
            external_transaction_id = COALESCE($3, external_transaction_id),
            external_reference = COALESCE($4, external_reference),
            updated_at = NOW()
        WHERE id = $1 AND status <> 'success'
        RETURNING *
        "#,
    )
    .bind(reference)
    .bind(status.as_str())
    .bind(&refs.transaction_id)
    .bind(&refs.reference)
    .fetch_optional(&mut **executor)
    .await
}

pub async fn list_user_transactions(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT * FROM transactions
        WHERE user_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_user_transactions(pool: &PgPool, user_id: Uuid) -> Result<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM transactions WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
}

pub async fn get_user_transaction(
    pool: &PgPool,
    user_id: Uuid,
    id: &str,
) -> Result<Option<TransactionRow>> {
    sqlx::query_as::<_, TransactionRow>(
        "SELECT * FROM transactions WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}
