pub mod availability;
pub mod clock;
pub mod schedule;
pub mod slots;
pub mod store;

pub use availability::AvailabilityService;
pub use clock::{Clock, FixedClock, SystemClock};
pub use schedule::ScheduleService;
pub use slots::{overlaps, BusinessTimezone, DaySchedule, SlotGenerator, SLOT_STRIDE_MINUTES};
pub use store::{AvailabilityStore, SupabaseAvailabilityStore};
