use anyhow::Result;
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use reqwest::Method;
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{AppointmentSettings, BusinessHours, ExistingAppointment, TimeBlock};

/// Read side of the schedule tables. Errors are collaborator failures and
/// abort the whole availability computation.
/// UTC dates bounding a query for blocks touching local days `from..=to`.
/// Widened by a day each side so any business offset is covered; callers do
/// the exact overlap test. Saturates at the calendar edges.
pub fn time_block_window(from: NaiveDate, to: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = from.checked_sub_days(Days::new(1)).unwrap_or(NaiveDate::MIN);
    let end = to.checked_add_days(Days::new(2)).unwrap_or(NaiveDate::MAX);
    (start, end)
}

#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Active rows only.
    async fn get_business_hours(&self) -> Result<Vec<BusinessHours>>;

    async fn get_appointment_settings(&self) -> Result<AppointmentSettings>;

    /// Scheduled and confirmed appointments with `from <= appointment_date <= to`.
    async fn get_appointments(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<ExistingAppointment>>;

    /// Blocks overlapping the dates `from..=to`.
    async fn get_time_blocks(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<TimeBlock>>;
}

pub struct SupabaseAvailabilityStore {
    supabase: SupabaseClient,
    service_token: String,
}

impl SupabaseAvailabilityStore {
    /// Availability must see every client's appointments, so reads use the
    /// service key rather than the caller's token.
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            service_token: config.service_key().to_string(),
        }
    }
}

#[async_trait]
impl AvailabilityStore for SupabaseAvailabilityStore {
    async fn get_business_hours(&self) -> Result<Vec<BusinessHours>> {
        let rows: Vec<BusinessHours> = self.supabase.request(
            Method::GET,
            "/rest/v1/business_hours?is_active=eq.true&order=day_of_week.asc,start_time.asc,id.asc",
            Some(&self.service_token),
            None,
        ).await?;

        debug!("Loaded {} active business hours rows", rows.len());
        Ok(rows)
    }

    async fn get_appointment_settings(&self) -> Result<AppointmentSettings> {
        let rows: Vec<AppointmentSettings> = self.supabase.request(
            Method::GET,
            "/rest/v1/appointment_settings?limit=1",
            Some(&self.service_token),
            None,
        ).await?;

        match rows.into_iter().next() {
            Some(settings) => Ok(settings),
            None => {
                warn!("appointment_settings is empty, using defaults");
                Ok(AppointmentSettings::default())
            }
        }
    }

    async fn get_appointments(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<ExistingAppointment>> {
        let path = format!(
            "/rest/v1/appointments?select=appointment_date,start_time,end_time,status&appointment_date=gte.{}&appointment_date=lte.{}&status=in.(scheduled,confirmed)&order=start_time.asc",
            from, to
        );

        let rows: Vec<ExistingAppointment> = self.supabase.request(
            Method::GET,
            &path,
            Some(&self.service_token),
            None,
        ).await?;

        debug!("Loaded {} active appointments between {} and {}", rows.len(), from, to);
        Ok(rows)
    }

    async fn get_time_blocks(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<TimeBlock>> {
        let (window_start, window_end) = time_block_window(from, to);
        let path = format!(
            "/rest/v1/time_blocks?start_datetime=lt.{}T00:00:00Z&end_datetime=gt.{}T00:00:00Z&order=start_datetime.asc",
            window_end, window_start
        );

        let rows: Vec<TimeBlock> = self.supabase.request(
            Method::GET,
            &path,
            Some(&self.service_token),
            None,
        ).await?;

        debug!("Loaded {} time blocks around {}..={}", rows.len(), from, to);
        Ok(rows)
    }
}
