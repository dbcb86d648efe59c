use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use thiserror::Error;

use availability_cell::models::{AppointmentStatus, AvailabilityError};
use shared_models::error::AppError;

// ==============================================================================
// CATALOGUE
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub price_cents: i64,
    pub is_active: bool,
}

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        };
        write!(f, "{}", value)
    }
}

/// A full row of the `appointments` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub client_id: String,
    pub service_id: Uuid,
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.appointment_date.and_time(self.start_time)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.appointment_date.and_time(self.end_time)
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.client_id == user_id
    }

    /// Creation order used to settle two bookings racing for the same window.
    pub fn precedes(&self, other: &Appointment) -> bool {
        (self.created_at, self.id) < (other.created_at, other.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub service_id: Uuid,
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Service not found or no longer offered")]
    ServiceNotFound,

    #[error("Appointment not found")]
    NotFound,

    #[error("Appointment slot not available: {0}")]
    SlotNotAvailable(String),

    #[error("Appointments can only be cancelled at least {0} hours in advance")]
    CancellationWindowClosed(i64),

    #[error("Appointment cannot be cancelled in status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Not authorized to access this appointment")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Availability(#[from] AvailabilityError),

    #[error("Database error: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<BookingError> for AppError {
    fn from(error: BookingError) -> Self {
        match error {
            BookingError::ServiceNotFound | BookingError::NotFound => AppError::NotFound(error.to_string()),
            BookingError::SlotNotAvailable(_) => AppError::Conflict(error.to_string()),
            BookingError::CancellationWindowClosed(_)
            | BookingError::InvalidStatusTransition(_)
            | BookingError::ValidationError(_) => AppError::BadRequest(error.to_string()),
            BookingError::Unauthorized => AppError::Forbidden(error.to_string()),
            BookingError::Availability(inner) => AppError::from(inner),
            BookingError::Store(e) => {
                tracing::error!("Appointment store failed: {:#}", e);
                AppError::Database("Unable to process appointment".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    fn appointment(created_at: &str, id: Uuid) -> Appointment {
        serde_json::from_value(json!({
            "id": id,
            "client_id": "client-1",
            "service_id": Uuid::new_v4(),
            "appointment_date": "2025-06-16",
            "start_time": "10:00:00",
            "end_time": "11:00:00",
            "status": "scheduled",
            "payment_status": "pending",
            "created_at": created_at,
            "updated_at": created_at
        }))
        .unwrap()
    }

    #[test]
    fn earlier_creation_wins_and_id_breaks_ties() {
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);

        let first = appointment("2025-06-01T10:00:00Z", high);
        let second = appointment("2025-06-01T10:00:01Z", low);
        assert!(first.precedes(&second));
        assert!(!second.precedes(&first));

        let tie_a = appointment("2025-06-01T10:00:00Z", low);
        let tie_b = appointment("2025-06-01T10:00:00Z", high);
        assert!(tie_a.precedes(&tie_b));
        assert!(!tie_b.precedes(&tie_a));
    }

    #[test]
    fn optional_columns_default_to_none() {
        let row = appointment("2025-06-01T10:00:00Z", Uuid::new_v4());
        assert_eq!(row.payment_intent_id, None);
        assert_eq!(row.cancellation_reason, None);
        assert!(row.is_owned_by("client-1"));
    }

    #[test]
    fn errors_map_to_http_statuses() {
        assert_eq!(
            AppError::from(BookingError::SlotNotAvailable("taken".into())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(AppError::from(BookingError::Unauthorized).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::from(BookingError::CancellationWindowClosed(24)).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(BookingError::Availability(AvailabilityError::InvalidDuration(0))).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
