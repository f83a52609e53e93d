//! Seam to the card payment processor.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntentStatus {
    Succeeded,
    Processing,
    RequiresAction,
    Canceled,
    Failed,
}

impl IntentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "succeeded" => IntentStatus::Succeeded,
            "processing" => IntentStatus::Processing,
            "requires_action" | "requires_confirmation" => IntentStatus::RequiresAction,
            "canceled" => IntentStatus::Canceled,
            _ => IntentStatus::Failed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub status: IntentStatus,
}

/// Billing details sent along with the card confirmation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BillingDetails {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentFailure {
    #[error("Payment blocked by browser. Please disable ad blockers and try again.")]
    AdBlockerSuspected(String),
    #[error("{0}")]
    Declined(String),
    #[error("Payment failed. Please try again.")]
    Generic,
}

impl PaymentFailure {
    /// The only distinction drawn: a blocked-request heuristic versus everything else.
    pub fn classify(message: &str) -> Self {
        if message.contains("blocked") || message.contains("fetch") {
            PaymentFailure::AdBlockerSuspected(message.to_string())
        } else if message.trim().is_empty() {
            PaymentFailure::Generic
        } else {
            PaymentFailure::Declined(message.to_string())
        }
    }
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Confirm the card payment behind `client_secret`.
    async fn confirm_card_payment(
        &self,
        client_secret: &str,
        billing: &BillingDetails,
    ) -> Result<PaymentIntent, PaymentFailure>;
}
