use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use booking_cell::models::PaymentStatus;
use shared_models::error::AppError;

// ==============================================================================
// STRIPE PAYLOADS
// ==============================================================================

/// The subset of a Stripe event envelope the webhook reads.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: StripeObject,
}

/// A payment intent, checkout session or charge.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StripeObject {
    pub fn appointment_id(&self) -> Option<Uuid> {
        self.metadata
            .get("appointment_id")
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
    }
}

// ==============================================================================
// DISPATCH
// ==============================================================================

/// Change a Stripe event makes to an appointment's payment columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentUpdate {
    Paid { payment_intent_id: Option<String> },
    Failed { payment_intent_id: Option<String> },
    Refunded,
}

impl PaymentUpdate {
    pub fn from_event(event: &StripeEvent) -> Option<Self> {
        let object = &event.data.object;
        match event.event_type.as_str() {
            "payment_intent.succeeded" => Some(PaymentUpdate::Paid {
                payment_intent_id: object.id.clone(),
            }),
            "checkout.session.completed" => Some(PaymentUpdate::Paid {
                payment_intent_id: object.payment_intent.clone(),
            }),
            "payment_intent.payment_failed" => Some(PaymentUpdate::Failed {
                payment_intent_id: object.id.clone(),
            }),
            "charge.refunded" => Some(PaymentUpdate::Refunded),
            _ => None,
        }
    }

    pub fn payment_status(&self) -> PaymentStatus {
        match self {
            PaymentUpdate::Paid { .. } => PaymentStatus::Paid,
            PaymentUpdate::Failed { .. } => PaymentStatus::Failed,
            PaymentUpdate::Refunded => PaymentStatus::Refunded,
        }
    }

    /// Columns written to the appointment row.
    pub fn to_patch(&self, updated_at: &str) -> Value {
        let mut patch = json!({
            "payment_status": self.payment_status(),
            "updated_at": updated_at,
        });

        match self {
            PaymentUpdate::Paid { payment_intent_id } => {
                patch["status"] = json!("confirmed");
                if let Some(id) = payment_intent_id {
                    patch["payment_intent_id"] = json!(id);
                }
            }
            PaymentUpdate::Failed { payment_intent_id: Some(id) } => {
                patch["payment_intent_id"] = json!(id);
            }
            _ => {}
        }

        patch
    }

    /// PostgREST filters appended to the row selector so a late or
    /// out-of-order event cannot undo a later state. A payment never revives
    /// a cancelled or completed booking, and a failure never overwrites a
    /// settled payment. Refunds apply whatever the row holds.
    pub fn row_guard(&self) -> &'static str {
        match self {
            PaymentUpdate::Paid { .. } => "&status=in.(scheduled,confirmed)&payment_status=neq.refunded",
            PaymentUpdate::Failed { .. } => "&payment_status=in.(pending,failed)",
            PaymentUpdate::Refunded => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Updated,
    Ignored,
    MissingAppointment,
    /// No row matched: the appointment is gone or its state rejects the update.
    NotApplied,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment webhooks are not configured")]
    NotConfigured,

    #[error("Missing Stripe-Signature header")]
    MissingSignature,

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Webhook timestamp {0} is outside the tolerance window")]
    StaleTimestamp(i64),

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Database error: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<PaymentError> for AppError {
    fn from(error: PaymentError) -> Self {
        match error {
            PaymentError::MissingSignature
            | PaymentError::InvalidSignature(_)
            | PaymentError::StaleTimestamp(_)
            | PaymentError::InvalidPayload(_) => AppError::BadRequest(error.to_string()),
            PaymentError::NotConfigured => AppError::Internal(error.to_string()),
            PaymentError::Store(e) => {
                tracing::error!("Payment status update failed: {:#}", e);
                AppError::Database("Unable to record payment".to_string())
            }
        }
    }
}
