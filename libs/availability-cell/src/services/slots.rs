use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use tracing::{debug, warn};

use crate::models::{
    AppointmentSettings, AvailabilityError, BusinessHours, Exclusion, ExistingAppointment,
    TimeBlock, TimeSlot, WindowCheck, MAX_ADVANCE_DAYS,
};

/// Candidate start times advance by this much whatever the service length,
/// keeping the grids of different services aligned.
pub const SLOT_STRIDE_MINUTES: i64 = 30;

pub const MAX_SERVICE_DURATION_MINUTES: i64 = 24 * 60;

/// How far from today a requested date may lie in either direction. One day
/// past the largest advance limit so the last bookable day still resolves.
pub const MAX_DATE_DISTANCE_DAYS: i64 = MAX_ADVANCE_DAYS + 1;

/// Fixed UTC offset the business's wall-clock times are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessTimezone(FixedOffset);

impl BusinessTimezone {
    pub fn utc() -> Self {
        Self(Utc.fix())
    }

    /// Accepts `UTC`, `Etc/UTC`, `GMT`, `Z` or an offset such as `+02:00` / `-0500`.
    pub fn parse(name: &str) -> Result<Self, AvailabilityError> {
        let trimmed = name.trim();
        if matches!(trimmed.to_ascii_uppercase().as_str(), "UTC" | "ETC/UTC" | "GMT" | "Z") {
            return Ok(Self::utc());
        }

        parse_fixed_offset(trimmed)
            .map(Self)
            .ok_or_else(|| AvailabilityError::InvalidTimezone(name.to_string()))
    }

    /// Reads never fail on a bad stored value; writes go through [`BusinessTimezone::parse`].
    pub fn from_settings(settings: &AppointmentSettings) -> Self {
        Self::parse(&settings.timezone).unwrap_or_else(|_| {
            warn!("Unsupported timezone '{}' in appointment settings, using UTC", settings.timezone);
            Self::utc()
        })
    }

    pub fn offset(&self) -> FixedOffset {
        self.0
    }

    /// Wall-clock `time` on `date` in the business timezone, or `None` when
    /// the instant falls outside the representable range.
    pub fn at(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<FixedOffset>> {
        let utc = date
            .and_time(time)
            .checked_sub_signed(Duration::seconds(i64::from(self.0.local_minus_utc())))?;
        Some(DateTime::from_naive_utc_and_offset(utc, self.0))
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.0).date_naive()
    }
}

fn parse_fixed_offset(value: &str) -> Option<FixedOffset> {
    let (sign, rest) = match value.strip_prefix('+') {
        Some(rest) => (1, rest),
        None => (-1, value.strip_prefix('-')?),
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some(parts) => parts,
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "00"),
    };

    let is_number = |part: &str| !part.is_empty() && part.len() <= 2 && part.bytes().all(|b| b.is_ascii_digit());
    if !is_number(hours) || !is_number(minutes) {
        return None;
    }

    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes >= 60 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// 0 = Sunday, matching `business_hours.day_of_week`.
pub fn weekday_index(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

/// Active row for the weekday of `date`.
///
/// Writes keep at most one active row per weekday. If the table holds more
/// anyway, the earliest by `(start_time, id)` wins so the result is stable.
pub fn business_hours_for(rows: &[BusinessHours], date: NaiveDate) -> Option<&BusinessHours> {
    let day = weekday_index(date);
    let mut active: Vec<&BusinessHours> = rows
        .iter()
        .filter(|row| row.day_of_week == day && row.is_active)
        .collect();

    if active.len() > 1 {
        warn!("{} active business hours rows for weekday {}, using the earliest", active.len(), day);
    }

    active.sort_by_key(|row| (row.start_time, row.id));
    active.first().copied()
}

/// `[start, end)` meets `[other_start, other_end)` when its start falls inside,
/// its end falls inside, or it swallows the other interval whole.
pub fn overlaps<T: PartialOrd>(start: T, end: T, other_start: T, other_end: T) -> bool {
    let start_inside = start >= other_start && start < other_end;
    let end_inside = end > other_start && end <= other_end;
    let contains = start <= other_start && end >= other_end;

    start_inside || end_inside || contains
}

/// Rejects dates further than [`MAX_DATE_DISTANCE_DAYS`] from `today`.
pub fn check_date_range(date: NaiveDate, today: NaiveDate) -> Result<(), AvailabilityError> {
    let distance = date.signed_duration_since(today).num_days();
    if distance.abs() > MAX_DATE_DISTANCE_DAYS {
        return Err(AvailabilityError::ValidationError(format!(
            "date {} is more than {} days from today",
            date, MAX_DATE_DISTANCE_DAYS
        )));
    }
    Ok(())
}

pub fn service_duration(minutes: i64) -> Result<Duration, AvailabilityError> {
    if minutes <= 0 || minutes > MAX_SERVICE_DURATION_MINUTES {
        return Err(AvailabilityError::InvalidDuration(minutes));
    }
    Ok(Duration::minutes(minutes))
}

/// Everything slot generation reads for one day, fetched up front.
#[derive(Debug, Clone, Copy)]
pub struct DaySchedule<'a> {
    pub hours: Option<&'a BusinessHours>,
    pub settings: &'a AppointmentSettings,
    pub appointments: &'a [ExistingAppointment],
    pub blocks: &'a [TimeBlock],
}

pub struct SlotGenerator<'a> {
    schedule: DaySchedule<'a>,
    timezone: BusinessTimezone,
    now: DateTime<FixedOffset>,
}

impl<'a> SlotGenerator<'a> {
    pub fn new(schedule: DaySchedule<'a>, now: DateTime<Utc>) -> Self {
        let timezone = BusinessTimezone::from_settings(schedule.settings);
        Self {
            schedule,
            timezone,
            now: now.with_timezone(&timezone.offset()),
        }
    }

    pub fn timezone(&self) -> BusinessTimezone {
        self.timezone
    }

    /// Every candidate window of the day, bookable or not, in start order.
    pub fn generate(&self, date: NaiveDate, duration_minutes: i64) -> Result<Vec<TimeSlot>, AvailabilityError> {
        let duration = service_duration(duration_minutes)?;
        check_date_range(date, self.now.date_naive())?;

        let Some((day_start, day_end)) = self.work_day(date) else {
            debug!("No business hours for {}, closed", date);
            return Ok(Vec::new());
        };

        let stride = Duration::minutes(SLOT_STRIDE_MINUTES);
        let mut slots = Vec::new();
        let mut next = Some(day_start);

        while let Some(start) = next {
            let Some(end) = start.checked_add_signed(duration).filter(|end| *end <= day_end) else {
                break;
            };
            slots.push(TimeSlot {
                start,
                end,
                available: self.exclusion(date, start, end).is_none(),
            });
            next = start.checked_add_signed(stride);
        }

        debug!(
            "Generated {} slots for {} ({} available)",
            slots.len(),
            date,
            slots.iter().filter(|slot| slot.available).count()
        );
        Ok(slots)
    }

    /// Applies the slot rules to an arbitrary window. The window need not sit
    /// on the 30-minute grid but must fit inside business hours.
    pub fn check_window(
        &self,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: i64,
    ) -> Result<WindowCheck, AvailabilityError> {
        let duration = service_duration(duration_minutes)?;
        check_date_range(date, self.now.date_naive())?;

        let start = self.timezone.at(date, start_time).ok_or_else(|| unrepresentable(date))?;
        let end = start.checked_add_signed(duration).ok_or_else(|| unrepresentable(date))?;

        let exclusion = match self.work_day(date) {
            None => Some(Exclusion::Closed),
            Some((day_start, day_end)) if start < day_start || end > day_end => {
                Some(Exclusion::OutsideBusinessHours)
            }
            Some(_) => self.exclusion(date, start, end),
        };

        Ok(WindowCheck { start, end, exclusion })
    }

    fn work_day(&self, date: NaiveDate) -> Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        let hours = self
            .schedule
            .hours
            .filter(|hours| hours.is_active && hours.day_of_week == weekday_index(date))?;

        Some((
            self.timezone.at(date, hours.start_time)?,
            self.timezone.at(date, hours.end_time)?,
        ))
    }

    fn exclusion(
        &self,
        date: NaiveDate,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Option<Exclusion> {
        let settings = self.schedule.settings;

        if start < self.now + settings.minimum_notice() {
            return Some(Exclusion::MinimumNotice);
        }
        if start > self.now + settings.advance_limit() {
            return Some(Exclusion::BeyondAdvanceLimit);
        }

        let buffer = settings.buffer();
        let booked = self
            .schedule
            .appointments
            .iter()
            .filter(|appointment| appointment.status.blocks_calendar() && appointment.appointment_date == date)
            .any(|appointment| {
                let busy_start = self
                    .timezone
                    .at(date, appointment.start_time)
                    .and_then(|at| at.checked_sub_signed(buffer));
                let busy_end = self
                    .timezone
                    .at(date, appointment.end_time)
                    .and_then(|at| at.checked_add_signed(buffer));
                match (busy_start, busy_end) {
                    (Some(busy_start), Some(busy_end)) => overlaps(start, end, busy_start, busy_end),
                    // An appointment we cannot place still holds the day
                    _ => true,
                }
            });
        if booked {
            return Some(Exclusion::AppointmentConflict);
        }

        let offset = self.timezone.offset();
        let blocked = self.schedule.blocks.iter().any(|block| {
            overlaps(
                start,
                end,
                block.start_datetime.with_timezone(&offset),
                block.end_datetime.with_timezone(&offset),
            )
        });
        if blocked {
            return Some(Exclusion::BlockedTime);
        }

        None
    }
}

fn unrepresentable(date: NaiveDate) -> AvailabilityError {
    AvailabilityError::ValidationError(format!("date {} is out of range", date))
}
