pub mod client;

pub use client::{PaymentClient, PaymentGatewayError};
