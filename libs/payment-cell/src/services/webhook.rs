// libs/payment-cell/src/services/webhook.rs
use anyhow::Result;
use chrono::Utc;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{PaymentError, PaymentUpdate, StripeEvent, WebhookOutcome};
use crate::services::retry::RetryPolicy;

/// Applies verified Stripe events to appointment payment columns. Runs
/// without a user token, so every write uses the service key.
pub struct PaymentService {
    supabase: SupabaseClient,
    service_token: String,
    retry: RetryPolicy,
}

impl PaymentService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_retry_policy(config, RetryPolicy::default())
    }

    pub fn with_retry_policy(config: &AppConfig, retry: RetryPolicy) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            service_token: config.service_key().to_string(),
            retry,
        }
    }

    pub fn parse_event(payload: &str) -> Result<StripeEvent, PaymentError> {
        serde_json::from_str(payload).map_err(|e| PaymentError::InvalidPayload(e.to_string()))
    }

    pub async fn handle_event(&self, event: &StripeEvent) -> Result<WebhookOutcome, PaymentError> {
        let Some(update) = PaymentUpdate::from_event(event) else {
            debug!("Ignoring Stripe event {} of type {}", event.id, event.event_type);
            return Ok(WebhookOutcome::Ignored);
        };

        // Acknowledged so Stripe does not keep redelivering an event we can never apply
        let Some(appointment_id) = event.data.object.appointment_id() else {
            warn!("Stripe event {} ({}) carries no appointment_id metadata", event.id, event.event_type);
            return Ok(WebhookOutcome::MissingAppointment);
        };

        info!("Stripe event {} sets appointment {} to {}",
              event.id, appointment_id, update.payment_status());

        self.update_payment_status_with_retry(appointment_id, &update).await
    }

    pub async fn update_payment_status_with_retry(
        &self,
        appointment_id: Uuid,
        update: &PaymentUpdate,
    ) -> Result<WebhookOutcome, PaymentError> {
        let label = format!("Payment update for appointment {}", appointment_id);
        let patch = update.to_patch(&Utc::now().to_rfc3339());
        let patch = &patch;
        let guard = update.row_guard();

        let matched = self.retry
            .run(&label, move || self.update_payment_status(appointment_id, guard, patch))
            .await?;

        if matched {
            Ok(WebhookOutcome::Updated)
        } else {
            warn!("Appointment {} is missing or does not accept payment status {}, left unchanged",
                  appointment_id, update.payment_status());
            Ok(WebhookOutcome::NotApplied)
        }
    }

    /// Returns whether a row was updated.
    async fn update_payment_status(&self, appointment_id: Uuid, guard: &str, patch: &Value) -> Result<bool> {
        let path = format!("/rest/v1/appointments?id=eq.{}{}", appointment_id, guard);
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(&self.service_token),
            Some(patch.clone()),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        Ok(!rows.is_empty())
    }
}
