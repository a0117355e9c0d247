//! Weekly US economic calendar.

mod model;
mod service;

#[cfg(test)]
mod service_tests;

pub use model::{star_rating, CalendarDay, CalendarEntry, CalendarSnapshot, WEEKDAYS};
pub use service::{duration_until_next_boundary, week_range, CalendarService};
