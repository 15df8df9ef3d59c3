use bigdecimal::{BigDecimal, Zero};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Pricing;
use crate::domain::{
    fits_ledger_scale, DebitOutcome, Gift, LedgerEntry, NewLedgerEntry, TransactionKind, UserProfile,
    Wallet,
};
use crate::error::AppError;
use crate::ports::{GiftCatalog, UserDirectory, WalletLedger};
use crate::utils::pagination::{Page, Paginated};

pub const DEFAULT_DEDUCT_DESCRIPTION: &str = "Coins deducted";

/// Balance queries, gifts and generic coin spending for an authenticated user.
#[derive(Clone)]
pub struct WalletService {
    users: Arc<dyn UserDirectory>,
    gifts: Arc<dyn GiftCatalog>,
    ledger: Arc<dyn WalletLedger>,
    pricing: Pricing,
}

impl WalletService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        gifts: Arc<dyn GiftCatalog>,
        ledger: Arc<dyn WalletLedger>,
        pricing: Pricing,
    ) -> Self {
        Self {
            users,
            gifts,
            ledger,
            pricing,
        }
    }

    pub async fn wallet(&self, user: &UserProfile) -> Result<Wallet, AppError> {
        Ok(self.ledger.wallet(user.wallet_id).await?)
    }

    pub async fn gifts(&self, page: Page) -> Result<Paginated<Gift>, AppError> {
        let (gifts, total) = self.gifts.gifts(page.limit, page.offset).await?;
        Ok(page.wrap(gifts, total))
    }

    /// Moves `gift.points` from the sender's wallet to the receiver's.
    /// Returns the sender's wallet after the transfer.
    pub async fn send_gift(
        &self,
        sender: &UserProfile,
        gift_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<Wallet, AppError> {
        if receiver_id == sender.id {
            return Err(AppError::Validation("cannot send a gift to yourself".to_string()));
        }
        let gift = self
            .gifts
            .gift(gift_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Gift not found".to_string()))?;
        let receiver = self
            .users
            .find_user(receiver_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Receiver not found".to_string()))?;

        let debit_entry = NewLedgerEntry::settled(
            sender.id,
            TransactionKind::Debit,
            gift.points.clone(),
            self.pricing.currency.clone(),
            format!("Gift sent: {} to {}", gift.name, receiver.display_name()),
        );
        let credit_entry = NewLedgerEntry::settled(
            receiver.id,
            TransactionKind::Credit,
            gift.points.clone(),
            self.pricing.currency.clone(),
            format!("Gift received: {} from {}", gift.name, sender.display_name()),
        );

        match self
            .ledger
            .transfer(
                sender.wallet_id,
                receiver.wallet_id,
                &gift.points,
                debit_entry,
                credit_entry,
            )
            .await?
        {
            DebitOutcome::Committed(wallet) => {
                tracing::info!(
                    sender_id = %sender.id,
                    receiver_id = %receiver.id,
                    gift = %gift.name,
                    "Gift sent"
                );
                Ok(wallet)
            }
            DebitOutcome::InsufficientBalance => Err(AppError::InsufficientBalance),
        }
    }

    pub async fn deduct(
        &self,
        user: &UserProfile,
        amount: BigDecimal,
        description: Option<String>,
    ) -> Result<Wallet, AppError> {
        if amount <= BigDecimal::zero() {
            return Err(AppError::Validation("amount must be positive".to_string()));
        }
        if !fits_ledger_scale(&amount) {
            return Err(AppError::Validation(
                "amount supports at most 4 decimal places".to_string(),
            ));
        }
        let description = description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DEDUCT_DESCRIPTION.to_string());
        let entry = NewLedgerEntry::settled(
            user.id,
            TransactionKind::Debit,
            amount.clone(),
            self.pricing.currency.clone(),
            description,
        );

        match self.ledger.debit(user.wallet_id, &amount, entry).await? {
            DebitOutcome::Committed(wallet) => Ok(wallet),
            DebitOutcome::InsufficientBalance => Err(AppError::InsufficientBalance),
        }
    }

    pub async fn transactions(
        &self,
        user: &UserProfile,
        page: Page,
    ) -> Result<Paginated<LedgerEntry>, AppError> {
        let (entries, total) = self
            .ledger
            .transactions(user.id, page.limit, page.offset)
            .await?;
        Ok(page.wrap(entries, total))
    }

    pub async fn transaction(&self, user: &UserProfile, id: &str) -> Result<LedgerEntry, AppError> {
        self.ledger
            .transaction(user.id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))
    }
}
