use chrono::{NaiveDate, NaiveDateTime, Timelike};

use crate::{
    model::attendance::AttendanceRecord,
    settings::Settings,
    store::{AttendanceStore, StoreError},
};

/// Maps wall-clock time onto the attendance day it belongs to.
///
/// Before the boundary hour an action still counts for the previous day, so a
/// night-shift employee clocking in at 01:00 lands on the shift that started
/// the evening before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalDayResolver {
    boundary_hour: u32,
}

impl LogicalDayResolver {
    pub fn new(boundary_hour: u32) -> Self {
        Self {
            boundary_hour: boundary_hour.min(23),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.shift_boundary_hour)
    }

    pub fn resolve(&self, now: NaiveDateTime) -> NaiveDate {
        let today = now.date();
        if now.hour() < self.boundary_hour {
            today.pred_opt().unwrap_or(today)
        } else {
            today
        }
    }

    /// Whole days from the current logical day to `date` (negative = past).
    pub fn offset_days(&self, date: NaiveDate, now: NaiveDateTime) -> i64 {
        (date - self.resolve(now)).num_days()
    }
}

/// One way of finding "the" record for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLookup {
    /// Any open record, newest check-in first. Keeps a mid-shift employee
    /// attached to their record across midnight and the day boundary.
    OpenRecord,
    /// Latest record filed under the given logical day.
    LogicalDay(NaiveDate),
}

impl RecordLookup {
    pub async fn find<S: AttendanceStore>(
        self,
        store: &S,
        user_id: u64,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        match self {
            RecordLookup::OpenRecord => store.find_open_record(user_id).await,
            RecordLookup::LogicalDay(date) => store.find_record_on(user_id, date).await,
        }
    }
}

/// Tries each lookup in priority order and returns the first hit.
pub async fn current_record<S: AttendanceStore>(
    store: &S,
    user_id: u64,
    logical_day: NaiveDate,
) -> Result<Option<AttendanceRecord>, StoreError> {
    for lookup in [RecordLookup::OpenRecord, RecordLookup::LogicalDay(logical_day)] {
        if let Some(record) = lookup.find(store, user_id).await? {
            return Ok(Some(record));
        }
    }
    Ok(None)
}
