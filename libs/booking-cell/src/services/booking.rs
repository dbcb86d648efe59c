// libs/booking-cell/src/services/booking.rs
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use availability_cell::models::{AppointmentStatus, Exclusion};
use availability_cell::services::{
    overlaps, AvailabilityService, BusinessTimezone, Clock, SupabaseAvailabilityStore, SystemClock,
};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;

use crate::models::{
    Appointment, BookAppointmentRequest, BookingError, CancelAppointmentRequest, PaymentStatus, Service,
};

/// Attempts at deleting a booking that lost its window. Attempt `n` waits
/// `RELEASE_RETRY_DELAY * n` before the next one.
const RELEASE_ATTEMPTS: u32 = 3;
const RELEASE_RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct BookingService {
    supabase: SupabaseClient,
    availability: AvailabilityService,
    clock: Arc<dyn Clock>,
    service_token: String,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let availability = AvailabilityService::with_store(
            Arc::new(SupabaseAvailabilityStore::new(config)),
            Arc::clone(&clock),
        );

        Self {
            supabase: SupabaseClient::new(config),
            availability,
            clock,
            service_token: config.service_key().to_string(),
        }
    }

    pub async fn get_service(&self, service_id: Uuid) -> Result<Service, BookingError> {
        let path = format!("/rest/v1/services?id=eq.{}&is_active=eq.true", service_id);
        let rows: Vec<Service> = self.supabase.request(
            Method::GET,
            &path,
            Some(&self.service_token),
            None,
        ).await?;

        rows.into_iter().next().ok_or(BookingError::ServiceNotFound)
    }

    /// Books `request` for `client_id`. The window is re-validated against
    /// fresh data first, and after the insert the earliest-created of any
    /// overlapping bookings is the one that stays.
    pub async fn book_appointment(
        &self,
        client_id: &str,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        info!("Booking service {} on {} at {} for client {}",
              request.service_id, request.appointment_date, request.start_time, client_id);

        let service = self.get_service(request.service_id).await?;

        let check = self.availability
            .check_window(request.appointment_date, request.start_time, service.duration_minutes)
            .await?;
        if let Some(exclusion) = check.exclusion {
            warn!("Rejected booking on {} at {}: {}", request.appointment_date, request.start_time, exclusion);
            return Err(BookingError::SlotNotAvailable(exclusion.to_string()));
        }

        let data = json!({
            "client_id": client_id,
            "service_id": service.id,
            "appointment_date": request.appointment_date,
            "start_time": check.start.time().format("%H:%M:%S").to_string(),
            "end_time": check.end.time().format("%H:%M:%S").to_string(),
            "status": AppointmentStatus::Scheduled,
            "payment_status": PaymentStatus::Pending,
            "notes": request.notes,
        });

        let rows: Vec<Appointment> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(data),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        let appointment = rows
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Appointment insert returned no rows"))?;

        self.settle_race(&appointment).await?;

        info!("Appointment {} booked", appointment.id);
        Ok(appointment)
    }

    /// Removes `appointment` again if an earlier booking overlaps it.
    async fn settle_race(&self, appointment: &Appointment) -> Result<(), BookingError> {
        let settings = self.availability.get_settings().await?;
        let buffer = settings.buffer();

        let path = format!(
            "/rest/v1/appointments?appointment_date=eq.{}&status=in.(scheduled,confirmed)&order=created_at.asc,id.asc",
            appointment.appointment_date
        );
        let same_day: Vec<Appointment> = self.supabase.request(
            Method::GET,
            &path,
            Some(&self.service_token),
            None,
        ).await?;

        let earlier = same_day.iter().find(|other| {
            other.id != appointment.id
                && other.status.blocks_calendar()
                && other.precedes(appointment)
                && overlaps(
                    appointment.starts_at(),
                    appointment.ends_at(),
                    other.starts_at() - buffer,
                    other.ends_at() + buffer,
                )
        });

        if let Some(winner) = earlier {
            warn!("Appointment {} lost the window to {}, removing it", appointment.id, winner.id);
            self.release_lost_booking(appointment, winner).await?;
            return Err(BookingError::SlotNotAvailable(Exclusion::AppointmentConflict.to_string()));
        }

        Ok(())
    }

    /// A row left behind keeps blocking the window, so the delete is retried
    /// and a final failure is logged with both ids for manual cleanup.
    async fn release_lost_booking(&self, appointment: &Appointment, winner: &Appointment) -> Result<(), BookingError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment.id);
        let mut attempt = 1;

        loop {
            match self.supabase.execute(Method::DELETE, &path, Some(&self.service_token), None).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < RELEASE_ATTEMPTS => {
                    let delay = RELEASE_RETRY_DELAY * attempt;
                    warn!("Removing appointment {} failed (attempt {}/{}): {:#}. Retrying in {:?}",
                          appointment.id, attempt, RELEASE_ATTEMPTS, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("Appointment {} overlaps {} and could not be removed after {} attempts, needs manual cleanup: {:#}",
                           appointment.id, winner.id, attempt, e);
                    return Err(e.into());
                }
            }
        }
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Appointment> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        rows.into_iter().next().ok_or(BookingError::NotFound)
    }

    /// Fetches the appointment and checks that `user` owns it or is an admin.
    pub async fn get_appointment_for(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        authorize(user, &appointment)?;
        Ok(appointment)
    }

    pub async fn cancel_appointment(
        &self,
        user: &User,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        debug!("Cancelling appointment: {}", appointment_id);

        let appointment = self.get_appointment_for(user, appointment_id, auth_token).await?;

        if !appointment.status.blocks_calendar() {
            return Err(BookingError::InvalidStatusTransition(appointment.status));
        }

        // Admins may cancel at any time
        if !user.is_admin() {
            let settings = self.availability.get_settings().await?;
            let cutoff = settings.cancellation_cutoff();
            let deadline = BusinessTimezone::from_settings(&settings)
                .at(appointment.appointment_date, appointment.start_time)
                .and_then(|starts_at| starts_at.checked_sub_signed(cutoff));

            if deadline.map_or(true, |deadline| deadline < self.clock.now()) {
                return Err(BookingError::CancellationWindowClosed(cutoff.num_hours()));
            }
        }

        let data = json!({
            "status": AppointmentStatus::Cancelled,
            "cancellation_reason": request.reason,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let rows: Vec<Appointment> = self.supabase.request_with_headers(
            Method::PATCH,
            &format!("/rest/v1/appointments?id=eq.{}", appointment_id),
            Some(auth_token),
            Some(data),
            Some(SupabaseClient::representation_headers()),
        ).await?;

        let cancelled = rows.into_iter().next().ok_or(BookingError::NotFound)?;

        info!("Appointment {} cancelled", appointment_id);
        Ok(cancelled)
    }
}

fn authorize(user: &User, appointment: &Appointment) -> Result<(), BookingError> {
    if appointment.is_owned_by(&user.id) || user.is_admin() {
        Ok(())
    } else {
        Err(BookingError::Unauthorized)
    }
}
