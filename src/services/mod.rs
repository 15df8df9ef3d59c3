pub mod chat;
pub mod conversation;
pub mod notification;
pub mod payment;
pub mod presence;
pub mod wallet;

pub use chat::{ChatGateway, GatewayPorts, SendMessageRequest};
pub use conversation::{ConversationService, RelationshipEvent};
pub use notification::{ExpoPushClient, NotificationDispatcher};
pub use payment::{PaymentReconciliation, ReconcileOutcome, TopUpLink};
pub use presence::PresenceRegistry;
pub use wallet::WalletService;
