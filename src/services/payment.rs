//! Coin top-ups: opening a hosted checkout and reconciling its outcome.

use bigdecimal::{BigDecimal, Zero};
use serde::Serialize;
use std::sync::Arc;

use crate::config::Pricing;
use crate::domain::{
    fits_ledger_scale, new_reference, ExternalPaymentRefs, LedgerEntry, NewLedgerEntry, UserProfile,
    AMOUNT_SCALE,
};
use crate::error::AppError;
use crate::ports::{PaymentGateway, PaymentLinkRequest, WalletLedger};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopUpLink {
    pub reference: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Paid { entry: LedgerEntry, credited: BigDecimal },
    Failed { entry: LedgerEntry },
}

impl ReconcileOutcome {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            ReconcileOutcome::Paid { entry, .. } | ReconcileOutcome::Failed { entry } => entry,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            ReconcileOutcome::Paid { .. } => "success",
            ReconcileOutcome::Failed { .. } => "failed",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ReconcileOutcome::Paid { .. } => "Payment successful",
            ReconcileOutcome::Failed { .. } => "Payment failed",
        }
    }
}

#[derive(Clone)]
pub struct PaymentReconciliation {
    ledger: Arc<dyn WalletLedger>,
    gateway: Arc<dyn PaymentGateway>,
    pricing: Pricing,
    callback_url: String,
}

impl PaymentReconciliation {
    pub fn new(
        ledger: Arc<dyn WalletLedger>,
        gateway: Arc<dyn PaymentGateway>,
        pricing: Pricing,
        base_url: &str,
    ) -> Self {
        Self {
            ledger,
            gateway,
            pricing,
            callback_url: format!("{}/wallet/callback", base_url.trim_end_matches('/')),
        }
    }

    /// Opens a checkout for `amount` and records the pending entry. No row
    /// is written unless the provider hands back a link.
    pub async fn request_top_up(
        &self,
        user: &UserProfile,
        amount: BigDecimal,
    ) -> Result<TopUpLink, AppError> {
        if amount <= BigDecimal::zero() {
            return Err(AppError::Validation("amount must be positive".to_string()));
        }
        if amount > self.pricing.top_up_ceiling {
            return Err(AppError::Validation(format!(
                "amount must not exceed {}",
                self.pricing.top_up_ceiling
            )));
        }
        if !fits_ledger_scale(&amount) {
            return Err(AppError::Validation(format!(
                "amount supports at most {AMOUNT_SCALE} decimal places"
            )));
        }

        let reference = new_reference();
        let request = PaymentLinkRequest {
            reference: reference.clone(),
            amount: amount.clone(),
            currency: self.pricing.currency.clone(),
            redirect_url: self.callback_url.clone(),
            customer_email: user.email.clone(),
            customer_name: user.display_name(),
        };

        let link = match self.gateway.create_payment_link(&request).await {
            Ok(Some(link)) => link,
            Ok(None) => {
                tracing::warn!(reference = %reference, "Payment gateway returned no link");
                return Err(AppError::PaymentLinkUnavailable);
            }
            Err(e) => {
                tracing::error!(reference = %reference, error = %e, "Payment link request failed");
                return Err(AppError::PaymentLinkUnavailable);
            }
        };

        self.ledger
            .record_transaction(NewLedgerEntry::pending_top_up(
                reference.clone(),
                user.id,
                amount,
                self.pricing.currency.clone(),
                link.clone(),
            ))
            .await?;

        tracing::info!(reference = %reference, user_id = %user.id, "Top-up requested");
        Ok(TopUpLink { reference, link })
    }

    /// Resolves a pending or failed top-up against the provider. Safe to call
    /// repeatedly: once an entry has succeeded it is no longer found.
    pub async fn reconcile(
        &self,
        reference: &str,
        refs: &ExternalPaymentRefs,
    ) -> Result<ReconcileOutcome, AppError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(AppError::InvalidOrDuplicateReference);
        }
        let entry = self
            .ledger
            .find_settleable(reference)
            .await?
            .ok_or(AppError::InvalidOrDuplicateReference)?;

        let paid = self.gateway.verify_payment(reference).await.map_err(|e| {
            tracing::warn!(reference = %reference, error = %e, "Payment verification unavailable");
            AppError::ExternalOracleUnavailable(e.to_string())
        })?;

        if paid {
            let credited = &entry.amount * &self.pricing.coin_conversion_rate;
            let entry = self
                .ledger
                .settle_top_up(reference, &credited, refs)
                .await?
                .ok_or(AppError::InvalidOrDuplicateReference)?;
            tracing::info!(
                reference = %reference,
                user_id = %entry.user_id,
                credited = %credited,
                "Top-up settled"
            );
            Ok(ReconcileOutcome::Paid { entry, credited })
        } else {
            let entry = self
                .ledger
                .fail_top_up(reference, refs)
                .await?
                .ok_or(AppError::InvalidOrDuplicateReference)?;
            tracing::info!(reference = %reference, user_id = %entry.user_id, "Top-up failed verification");
            Ok(ReconcileOutcome::Failed { entry })
        }
    }
}
