use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::PaymentError;
use crate::services::{verify_signature, PaymentService};

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// Stripe needs the exact bytes it signed, so the body is taken raw.
#[axum::debug_handler]
pub async fn stripe_webhook(
    State(state): State<Arc<AppConfig>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, AppError> {
    if !state.is_payments_configured() {
        return Err(PaymentError::NotConfigured.into());
    }

    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(PaymentError::MissingSignature)?;

    verify_signature(signature, &body, &state.stripe_webhook_secret, Utc::now().timestamp())?;

    let event = PaymentService::parse_event(&body)?;
    debug!("Received Stripe event {} ({})", event.id, event.event_type);

    let outcome = PaymentService::new(&state).handle_event(&event).await?;

    Ok(Json(json!({
        "received": true,
        "event_id": event.id,
        "outcome": outcome
    })))
}
