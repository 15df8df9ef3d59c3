pub mod chat;
pub mod transaction;

pub use chat::{Attachment, Conversation, Gift, Message, MessageKind, NewMessage, UserProfile};
pub use transaction::{
    DebitOutcome, ExternalPaymentRefs, LedgerEntry, NewLedgerEntry, TransactionKind,
    TransactionStatus, Wallet, AMOUNT_SCALE, fits_ledger_scale, new_reference,
};
