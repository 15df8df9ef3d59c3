//! Wallet and ledger entities.
//! Framework-agnostic representation of balances and the transactions that move them.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One wallet per user. The balance only changes through the ledger primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: BigDecimal,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }

    /// Whether an entry in this state may still be resolved by reconciliation.
    /// Only `success` is final; a failed top-up can be verified again.
    pub fn is_settleable(&self) -> bool {
        !matches!(self, TransactionStatus::Success)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Debit,
    Credit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Debit => "debit",
            TransactionKind::Credit => "credit",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(TransactionKind::Debit),
            "credit" => Ok(TransactionKind::Credit),
            other => Err(format!("unknown transaction kind: {}", other)),
        }
    }
}

/// An immutable ledger row. Only `status`, `updated_at` and the external
/// gateway references change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: TransactionStatus,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub description: String,
    pub payment_link: Option<String>,
    pub external_transaction_id: Option<String>,
    pub external_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Balance effect of the entry: negative for debits.
    pub fn signed_amount(&self) -> BigDecimal {
        match self.kind {
            TransactionKind::Debit => -self.amount.clone(),
            TransactionKind::Credit => self.amount.clone(),
        }
    }
}

/// Input for appending a ledger row.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub id: String,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub kind: TransactionKind,
    pub description: String,
    pub payment_link: Option<String>,
}

impl NewLedgerEntry {
    /// A settled entry that accompanies an immediate balance mutation.
    pub fn settled(
        user_id: Uuid,
        kind: TransactionKind,
        amount: BigDecimal,
        currency: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: new_reference(),
            user_id,
            amount,
            currency: currency.into(),
            status: TransactionStatus::Success,
            kind,
            description: description.into(),
            payment_link: None,
        }
    }

    /// A pending top-up awaiting payment verification.
    pub fn pending_top_up(
        reference: String,
        user_id: Uuid,
        amount: BigDecimal,
        currency: impl Into<String>,
        payment_link: String,
    ) -> Self {
        Self {
            id: reference,
            user_id,
            amount,
            currency: currency.into(),
            status: TransactionStatus::Pending,
            kind: TransactionKind::Credit,
            description: "Purchase of coins".to_string(),
            payment_link: Some(payment_link),
        }
    }

    pub fn into_entry(self, now: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            currency: self.currency,
            status: self.status,
            kind: self.kind,
            description: self.description,
            payment_link: self.payment_link,
            external_transaction_id: None,
            external_reference: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome of a conditional debit.
#[derive(Debug, Clone, PartialEq)]
pub enum DebitOutcome<T> {
    Committed(T),
    InsufficientBalance,
}

/// External identifiers reported by the payment gateway on a callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalPaymentRefs {
    pub status: Option<String>,
    pub transaction_id: Option<String>,
    pub reference: Option<String>,
}

/// Decimal places stored by the ledger's `NUMERIC(20,4)` amount column.
pub const AMOUNT_SCALE: i64 = 4;

/// True when `amount` is representable in the ledger without rounding.
pub fn fits_ledger_scale(amount: &BigDecimal) -> bool {
    amount.with_scale(AMOUNT_SCALE) == *amount
}

/// Ledger ids double as top-up references handed to the payment gateway.
pub fn new_reference() -> String {
    format!("tx-{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Success,
            TransactionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TransactionStatus>().unwrap(), status);
        }
        assert!("settled".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn test_ledger_scale_allows_four_decimals() {
        assert!(fits_ledger_scale(&BigDecimal::from_str("12.3456").unwrap()));
        assert!(fits_ledger_scale(&BigDecimal::from_str("5.00000").unwrap()));
        assert!(!fits_ledger_scale(&BigDecimal::from_str("0.00001").unwrap()));
    }

    #[test]
    fn test_only_success_is_final() {
        assert!(TransactionStatus::Pending.is_settleable());
        assert!(TransactionStatus::Failed.is_settleable());
        assert!(!TransactionStatus::Success.is_settleable());
    }

    #[test]
    fn test_signed_amount_follows_kind() {
        let debit = NewLedgerEntry::settled(
            Uuid::new_v4(),
            TransactionKind::Debit,
            BigDecimal::from(3),
            "USD",
            "Sent Message Fee",
        )
        .into_entry(Utc::now());
        assert_eq!(debit.signed_amount(), BigDecimal::from(-3));

        let credit = NewLedgerEntry::settled(
            Uuid::new_v4(),
            TransactionKind::Credit,
            BigDecimal::from(3),
            "USD",
            "Gift received",
        )
        .into_entry(Utc::now());
        assert_eq!(credit.signed_amount(), BigDecimal::from(3));
    }

    #[test]
    fn test_references_are_prefixed_and_unique() {
        let a = new_reference();
        let b = new_reference();
        assert!(a.starts_with("tx-"));
        assert_ne!(a, b);
    }
}
