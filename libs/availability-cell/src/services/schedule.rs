use anyhow::anyhow;
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AppointmentSettings, AvailabilityError, BlockType, BusinessHours, CreateTimeBlockRequest,
    TimeBlock, UpdateSettingsRequest, UpsertBusinessHoursRequest,
};
use crate::services::slots::BusinessTimezone;
use crate::services::store::time_block_window;

/// Admin-side writes to business hours, settings and time blocks.
pub struct ScheduleService {
    supabase: SupabaseClient,
}

impl ScheduleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    // ==========================================================================
    // BUSINESS HOURS
    // ==========================================================================

    pub async fn list_business_hours(&self, auth_token: &str) -> Result<Vec<BusinessHours>, AvailabilityError> {
        let rows: Vec<BusinessHours> = self.supabase.request(
            Method::GET,
            "/rest/v1/business_hours?order=day_of_week.asc,start_time.asc,id.asc",
            Some(auth_token),
            None,
        ).await?;

        Ok(rows)
    }

    /// Replaces the configuration of one weekday. Refuses to leave two active
    /// rows for the same weekday.
    pub async fn upsert_business_hours(
        &self,
        day_of_week: i32,
        request: UpsertBusinessHoursRequest,
        auth_token: &str,
    ) -> Result<BusinessHours, AvailabilityError> {
        debug!("Upserting business hours for weekday {}", day_of_week);

        if !(0..=6).contains(&day_of_week) {
            return Err(AvailabilityError::ValidationError(
                "Day of week must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }
        if request.is_active && request.start_time >= request.end_time {
            return Err(AvailabilityError::ValidationError(
                "Start time must be before end time".to_string(),
            ));
        }

        let path = format!(
            "/rest/v1/business_hours?day_of_week=eq.{}&order=start_time.asc,id.asc",
            day_of_week
        );
        let existing: Vec<BusinessHours> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        // Edit the row readers see: the active one, else the earliest
        let target = existing
            .iter()
            .find(|row| row.is_active)
            .or_else(|| existing.first())
            .map(|row| row.id);
        if request.is_active {
            let other_active = existing
                .iter()
                .any(|row| row.is_active && Some(row.id) != target);
            if other_active {
                return Err(AvailabilityError::Conflict(format!(
                    "Another active business hours row already exists for weekday {}",
                    day_of_week
                )));
            }
        }

        let data = json!({
            "day_of_week": day_of_week,
            "start_time": request.start_time.format("%H:%M:%S").to_string(),
            "end_time": request.end_time.format("%H:%M:%S").to_string(),
            "is_active": request.is_active,
        });

        let result: Vec<BusinessHours> = match target {
            Some(id) => {
                self.supabase.request_with_headers(
                    Method::PATCH,
                    &format!("/rest/v1/business_hours?id=eq.{}", id),
                    Some(auth_token),
                    Some(data),
                    Some(SupabaseClient::representation_headers()),
                ).await?
            }
            None => {
                self.supabase.request_with_headers(
                    Method::POST,
                    "/rest/v1/business_hours",
                    Some(auth_token),
                    Some(data),
                    Some(SupabaseClient::representation_headers()),
                ).await?
            }
        };

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Failed to save business hours"))?;

        info!("Business hours for weekday {} saved", day_of_week);
        Ok(row)
    }

    // ==========================================================================
    // SETTINGS
    // ==========================================================================

    pub async fn update_settings(
        &self,
        current: AppointmentSettings,
        request: UpdateSettingsRequest,
        auth_token: &str,
    ) -> Result<AppointmentSettings, AvailabilityError> {
        let updated = apply_settings_update(current, request)?;

        let data = json!({
            "buffer_time_minutes": updated.buffer_time_minutes,
            "advance_booking_days": updated.advance_booking_days,
            "minimum_notice_hours": updated.minimum_notice_hours,
            "cancellation_cutoff_hours": updated.cancellation_cutoff_hours,
            "timezone": updated.timezone,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let result: Vec<AppointmentSettings> = match updated.id {
            Some(id) => {
                self.supabase.request_with_headers(
                    Method::PATCH,
                    &format!("/rest/v1/appointment_settings?id=eq.{}", id),
                    Some(auth_token),
                    Some(data),
                    Some(SupabaseClient::representation_headers()),
                ).await?
            }
            None => {
                self.supabase.request_with_headers(
                    Method::POST,
                    "/rest/v1/appointment_settings",
                    Some(auth_token),
                    Some(data),
                    Some(SupabaseClient::representation_headers()),
                ).await?
            }
        };

        let saved = result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Failed to save appointment settings"))?;

        info!("Appointment settings updated");
        Ok(saved)
    }

    // ==========================================================================
    // TIME BLOCKS
    // ==========================================================================

    pub async fn list_time_blocks(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<TimeBlock>, AvailabilityError> {
        if from > to {
            return Err(AvailabilityError::ValidationError("from must not be after to".to_string()));
        }

        let (window_start, window_end) = time_block_window(from, to);
        let path = format!(
            "/rest/v1/time_blocks?start_datetime=lt.{}T00:00:00Z&end_datetime=gt.{}T00:00:00Z&order=start_datetime.asc",
            window_end, window_start
        );
        let rows: Vec<TimeBlock> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        Ok(rows)
    }

    pub async fn create_time_block(
        &self,
        request: CreateTimeBlockRequest,
        auth_token: &str,
    ) -> Result<TimeBlock, AvailabilityError> {
        if request.start_datetime >= request.end_datetime {
            return Err(AvailabilityError::ValidationError(
                "Block start must be before its end".to_string(),
            ));
        }
        if request.title.trim().is_empty() {
            return Err(AvailabilityError::ValidationError("Block title is required".to_string()));
        }

        let data = json!({
            "start_datetime": request.start_datetime.to_rfc3339(),
            "end_datetime": request.end_datetime.to_rfc3339(),
            "title": request.title.trim(),
            "block_type": request.block_type.unwrap_or(BlockType::Other),
        });

        let result: Vec<TimeBlock> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/time_blocks",
            Some(auth_token),
            Some(data),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        let block = result
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Failed to create time block"))?;

        info!("Time block {} created ({} - {})", block.id, block.start_datetime, block.end_datetime);
        Ok(block)
    }

    pub async fn delete_time_block(&self, block_id: Uuid, auth_token: &str) -> Result<(), AvailabilityError> {
        let path = format!("/rest/v1/time_blocks?id=eq.{}", block_id);
        let deleted: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
            Some(SupabaseClient::representation_headers()),
        ).await?;

        if deleted.is_empty() {
            return Err(AvailabilityError::NotFound("Time block".to_string()));
        }

        info!("Time block {} deleted", block_id);
        Ok(())
    }
}

/// Merges a partial update into the current settings and validates the result.
pub fn apply_settings_update(
    current: AppointmentSettings,
    request: UpdateSettingsRequest,
) -> Result<AppointmentSettings, AvailabilityError> {
    let updated = AppointmentSettings {
        id: current.id,
        buffer_time_minutes: request.buffer_time_minutes.unwrap_or(current.buffer_time_minutes),
        advance_booking_days: request.advance_booking_days.unwrap_or(current.advance_booking_days),
        minimum_notice_hours: request.minimum_notice_hours.unwrap_or(current.minimum_notice_hours),
        cancellation_cutoff_hours: request
            .cancellation_cutoff_hours
            .unwrap_or(current.cancellation_cutoff_hours),
        timezone: request.timezone.unwrap_or(current.timezone),
    };

    updated.validate()?;
    BusinessTimezone::parse(&updated.timezone)?;

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn partial_update_keeps_other_fields() {
        let current = AppointmentSettings::default();
        let updated = apply_settings_update(
            current.clone(),
            UpdateSettingsRequest {
                buffer_time_minutes: Some(0),
                timezone: Some("+01:00".to_string()),
                ..UpdateSettingsRequest::default()
            },
        )
        .unwrap();

        assert_eq!(updated.buffer_time_minutes, 0);
        assert_eq!(updated.timezone, "+01:00");
        assert_eq!(updated.minimum_notice_hours, current.minimum_notice_hours);
        assert_eq!(updated.advance_booking_days, current.advance_booking_days);
    }

    #[test]
    fn rejects_negative_and_unknown_timezone() {
        assert_matches!(
            apply_settings_update(
                AppointmentSettings::default(),
                UpdateSettingsRequest {
                    minimum_notice_hours: Some(-1),
                    ..UpdateSettingsRequest::default()
                },
            ),
            Err(AvailabilityError::ValidationError(_))
        );
        assert_matches!(
            apply_settings_update(
                AppointmentSettings::default(),
                UpdateSettingsRequest {
                    timezone: Some("Europe/Nowhere".to_string()),
                    ..UpdateSettingsRequest::default()
                },
            ),
            Err(AvailabilityError::InvalidTimezone(_))
        );
    }
}
