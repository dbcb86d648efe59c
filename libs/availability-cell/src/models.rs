use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use thiserror::Error;

use shared_models::error::AppError;

// ==============================================================================
// SCHEDULE INPUTS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessHours {
    pub id: Uuid,
    pub day_of_week: i32, // 0 = Sunday, 1 = Monday, etc.
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: bool,
}

/// The single global settings row. Passed explicitly into slot generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentSettings {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub buffer_time_minutes: i64,
    pub advance_booking_days: i64,
    pub minimum_notice_hours: i64,
    pub cancellation_cutoff_hours: i64,
    pub timezone: String,
}

pub const MAX_BUFFER_MINUTES: i64 = 240;
pub const MAX_NOTICE_HOURS: i64 = 24 * 365;
pub const MAX_ADVANCE_DAYS: i64 = 3 * 365;
pub const MAX_CANCELLATION_CUTOFF_HOURS: i64 = 24 * 30;

impl AppointmentSettings {
    pub fn buffer(&self) -> Duration {
        Duration::minutes(self.buffer_time_minutes.clamp(0, MAX_BUFFER_MINUTES))
    }

    pub fn minimum_notice(&self) -> Duration {
        Duration::hours(self.minimum_notice_hours.clamp(0, MAX_NOTICE_HOURS))
    }

    pub fn advance_limit(&self) -> Duration {
        Duration::days(self.advance_booking_days.clamp(0, MAX_ADVANCE_DAYS))
    }

    pub fn cancellation_cutoff(&self) -> Duration {
        Duration::hours(self.cancellation_cutoff_hours.clamp(0, MAX_CANCELLATION_CUTOFF_HOURS))
    }

    /// Range checks applied before an admin write reaches the table.
    pub fn validate(&self) -> Result<(), AvailabilityError> {
        let checks = [
            ("buffer_time_minutes", self.buffer_time_minutes, MAX_BUFFER_MINUTES),
            ("advance_booking_days", self.advance_booking_days, MAX_ADVANCE_DAYS),
            ("minimum_notice_hours", self.minimum_notice_hours, MAX_NOTICE_HOURS),
            ("cancellation_cutoff_hours", self.cancellation_cutoff_hours, MAX_CANCELLATION_CUTOFF_HOURS),
        ];
        for (field, value, max) in checks {
            if !(0..=max).contains(&value) {
                return Err(AvailabilityError::ValidationError(format!(
                    "{} must be between 0 and {}, got {}",
                    field, max, value
                )));
            }
        }
        Ok(())
    }
}

impl Default for AppointmentSettings {
    fn default() -> Self {
        Self {
            id: None,
            buffer_time_minutes: 15,
            advance_booking_days: 60,
            minimum_notice_hours: 24,
            cancellation_cutoff_hours: 24,
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Vacation,
    Personal,
    Maintenance,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBlock {
    pub id: Uuid,
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub title: String,
    pub block_type: BlockType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Only these statuses hold on to their time window.
    pub fn blocks_calendar(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        };
        write!(f, "{}", value)
    }
}

/// The columns of an appointment row that constrain availability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingAppointment {
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
}

// ==============================================================================
// SLOT OUTPUT
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub available: bool,
}

/// First rule that made a window unbookable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusion {
    Closed,
    OutsideBusinessHours,
    MinimumNotice,
    BeyondAdvanceLimit,
    AppointmentConflict,
    BlockedTime,
}

impl std::fmt::Display for Exclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Exclusion::Closed => "the business is closed on this day",
            Exclusion::OutsideBusinessHours => "the requested time is outside business hours",
            Exclusion::MinimumNotice => "the requested time does not meet the minimum notice",
            Exclusion::BeyondAdvanceLimit => "the requested time is too far in advance",
            Exclusion::AppointmentConflict => "the requested time overlaps another appointment",
            Exclusion::BlockedTime => "the requested time is blocked",
        };
        write!(f, "{}", value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowCheck {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub exclusion: Option<Exclusion>,
}

impl WindowCheck {
    pub fn is_available(&self) -> bool {
        self.exclusion.is_none()
    }
}

// ==============================================================================
// ADMIN REQUESTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertBusinessHoursRequest {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSettingsRequest {
    pub buffer_time_minutes: Option<i64>,
    pub advance_booking_days: Option<i64>,
    pub minimum_notice_hours: Option<i64>,
    pub cancellation_cutoff_hours: Option<i64>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTimeBlockRequest {
    pub start_datetime: DateTime<Utc>,
    pub end_datetime: DateTime<Utc>,
    pub title: String,
    pub block_type: Option<BlockType>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AvailabilityError {
    #[error("Service duration must be between 1 and 1440 minutes, got {0}")]
    InvalidDuration(i64),

    #[error("Unsupported timezone: {0}")]
    InvalidTimezone(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Data source error: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<AvailabilityError> for AppError {
    fn from(error: AvailabilityError) -> Self {
        match error {
            AvailabilityError::InvalidDuration(_)
            | AvailabilityError::InvalidTimezone(_)
            | AvailabilityError::ValidationError(_) => AppError::ValidationError(error.to_string()),
            AvailabilityError::NotFound(_) => AppError::NotFound(error.to_string()),
            AvailabilityError::Conflict(msg) => AppError::Conflict(msg),
            AvailabilityError::Store(e) => {
                tracing::error!("Availability data source failed: {:#}", e);
                AppError::Database("Unable to load availability".to_string())
            }
        }
    }
}
