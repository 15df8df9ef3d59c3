use chrono::{DateTime, Utc};
use sqlx::types::BigDecimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{
    Attachment, Conversation, Gift, LedgerEntry, Message, MessageKind, TransactionKind,
    TransactionStatus, UserProfile, Wallet,
};
use crate::ports::RepositoryError;

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub fcm_token: Option<String>,
    pub avatar_url: Option<String>,
    pub wallet_id: Uuid,
}

impl UserRow {
    pub fn into_domain(self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            wallet_id: self.wallet_id,
            push_token: self.fcm_token,
            avatar_url: self.avatar_url,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct WalletRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: BigDecimal,
    pub updated_at: DateTime<Utc>,
}

impl WalletRow {
    pub fn into_domain(self) -> Wallet {
        Wallet {
            id: self.id,
            user_id: self.user_id,
            balance: self.balance,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: String,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: String,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub description: String,
    pub payment_link: Option<String>,
    pub external_transaction_id: Option<String>,
    pub external_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRow {
    pub fn into_domain(self) -> Result<LedgerEntry, RepositoryError> {
        let status: TransactionStatus = self
            .status
            .parse()
            .map_err(|_| RepositoryError::Corrupt(format!("transaction status {}", self.status)))?;
        let kind: TransactionKind = self
            .kind
            .parse()
            .map_err(|_| RepositoryError::Corrupt(format!("transaction type {}", self.kind)))?;

        Ok(LedgerEntry {
            id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            currency: self.currency,
            status,
            kind,
            description: self.description,
            payment_link: self.payment_link,
            external_transaction_id: self.external_transaction_id,
            external_reference: self.external_reference,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct ChatRow {
    pub id: Uuid,
    pub pair_key: String,
    pub can_send_messages: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRow {
    pub fn into_domain(self) -> Result<Conversation, RepositoryError> {
        let (a, b) = parse_pair_key(&self.pair_key)
            .ok_or_else(|| RepositoryError::Corrupt(format!("chat pair key {}", self.pair_key)))?;
        Ok(Conversation {
            id: self.id,
            participants: [a, b],
            messaging_enabled: self.can_send_messages,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub user_id: Option<Uuid>,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub content: Option<String>,
    pub file_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    pub fn into_domain(self) -> Result<Message, RepositoryError> {
        let kind: MessageKind = self
            .kind
            .parse()
            .map_err(|_| RepositoryError::Corrupt(format!("message type {}", self.kind)))?;
        Ok(Message {
            id: self.id,
            conversation_id: self.chat_id,
            sender_id: self.user_id,
            kind,
            content: self.content,
            attachment_id: self.file_id,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct FileRow {
    pub id: Uuid,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

impl From<FileRow> for Attachment {
    fn from(row: FileRow) -> Self {
        Attachment {
            id: row.id,
            url: row.url,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct GiftRow {
    pub id: Uuid,
    pub name: String,
    pub points: BigDecimal,
    pub image_url: Option<String>,
}

impl From<GiftRow> for Gift {
    fn from(row: GiftRow) -> Self {
        Gift {
            id: row.id,
            name: row.name,
            points: row.points,
            image_url: row.image_url,
        }
    }
}

/// Canonical key for an unordered pair of users.
pub fn pair_key(a: Uuid, b: Uuid) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{}:{}", low, high)
}

fn parse_pair_key(key: &str) -> Option<(Uuid, Uuid)> {
    let (a, b) = key.split_once(':')?;
    Some((a.parse().ok()?, b.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_ignores_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(pair_key(a, b), pair_key(b, a));
        assert_eq!(parse_pair_key(&pair_key(a, b)).map(|(x, y)| x <= y), Some(true));
    }

    #[test]
    fn test_corrupt_status_is_reported() {
        let row = TransactionRow {
            id: "tx-1".to_string(),
            user_id: Uuid::new_v4(),
            amount: BigDecimal::from(1),
            currency: "USD".to_string(),
            status: "refunded".to_string(),
            kind: "debit".to_string(),
            description: "x".to_string(),
            payment_link: None,
            external_transaction_id: None,
            external_reference: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(row.into_domain(), Err(RepositoryError::Corrupt(_))));
    }
}
