use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tracing::debug;

use shared_config::AppConfig;

use crate::models::{AppointmentSettings, AvailabilityError, TimeSlot, WindowCheck};
use crate::services::clock::{Clock, SystemClock};
use crate::services::slots::{
    business_hours_for, check_date_range, service_duration, DaySchedule, SlotGenerator,
};
use crate::services::store::{AvailabilityStore, SupabaseAvailabilityStore};

pub struct AvailabilityService {
    store: Arc<dyn AvailabilityStore>,
    clock: Arc<dyn Clock>,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_store(Arc::new(SupabaseAvailabilityStore::new(config)), Arc::new(SystemClock))
    }

    pub fn with_store(store: Arc<dyn AvailabilityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Bookable and unbookable windows for `date`, recomputed from current data.
    pub async fn compute_slots(
        &self,
        date: NaiveDate,
        service_duration_minutes: i64,
    ) -> Result<Vec<TimeSlot>, AvailabilityError> {
        service_duration(service_duration_minutes)?;
        check_date_range(date, self.clock.now().date_naive())?;
        debug!("Computing {}-minute slots for {}", service_duration_minutes, date);

        let business_hours = self.store.get_business_hours().await?;
        let Some(hours) = business_hours_for(&business_hours, date) else {
            debug!("Closed on {}", date);
            return Ok(Vec::new());
        };

        let (settings, appointments, blocks) = tokio::try_join!(
            self.store.get_appointment_settings(),
            self.store.get_appointments(date, date),
            self.store.get_time_blocks(date, date),
        )?;

        let schedule = DaySchedule {
            hours: Some(hours),
            settings: &settings,
            appointments: &appointments,
            blocks: &blocks,
        };

        SlotGenerator::new(schedule, self.clock.now()).generate(date, service_duration_minutes)
    }

    /// Re-runs the slot rules for one concrete window against fresh data.
    /// Used right before a booking is written.
    pub async fn check_window(
        &self,
        date: NaiveDate,
        start_time: NaiveTime,
        service_duration_minutes: i64,
    ) -> Result<WindowCheck, AvailabilityError> {
        service_duration(service_duration_minutes)?;
        check_date_range(date, self.clock.now().date_naive())?;

        let (business_hours, settings, appointments, blocks) = tokio::try_join!(
            self.store.get_business_hours(),
            self.store.get_appointment_settings(),
            self.store.get_appointments(date, date),
            self.store.get_time_blocks(date, date),
        )?;

        let schedule = DaySchedule {
            hours: business_hours_for(&business_hours, date),
            settings: &settings,
            appointments: &appointments,
            blocks: &blocks,
        };

        let check = SlotGenerator::new(schedule, self.clock.now())
            .check_window(date, start_time, service_duration_minutes)?;

        debug!("Window {} on {} checked: {:?}", start_time, date, check.exclusion);
        Ok(check)
    }

    pub async fn get_settings(&self) -> Result<AppointmentSettings, AvailabilityError> {
        Ok(self.store.get_appointment_settings().await?)
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}
