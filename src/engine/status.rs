use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use utoipa::ToSchema;

use super::{
    AttendanceEngine,
    breaks::BreakStatus,
    logical_day::{LogicalDayResolver, current_record},
};
use crate::{
    error::AttendanceResult,
    events::EventSink,
    model::{attendance::AttendanceRecord, session::ShiftSession},
    store::{AttendanceStore, SettingsStore},
};

/// Everything a client needs to render the attendance screen.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TodayStatus {
    #[schema(value_type = String, format = "date")]
    pub logical_date: NaiveDate,
    pub record: Option<AttendanceRecord>,
    pub checked_in: bool,
    pub checked_out: bool,
    pub breaks: BreakStatus,
    /// Sessions of the logical day plus any whose check-in window is open now.
    pub sessions: Vec<ShiftSession>,
}

impl<S, K, E> AttendanceEngine<S, K, E>
where
    S: AttendanceStore,
    K: SettingsStore,
    E: EventSink,
{
    pub async fn today_status(&self, user_id: u64, now: NaiveDateTime) -> AttendanceResult<TodayStatus> {
        self.sync_sessions(now).await?;
        let detected = self.detect_sessions(now).await?;

        // Break status first: it may auto-end a break and touch the record.
        let breaks = self.break_status(user_id, now).await?;

        let settings = self.settings().await?;
        let logical_date = LogicalDayResolver::from_settings(&settings).resolve(now);
        let record = current_record(&self.store, user_id, logical_date).await?;

        let mut sessions = self.store.sessions_on(logical_date).await?;
        for session in detected {
            if !sessions.iter().any(|s| s.id == session.id) {
                sessions.push(session);
            }
        }
        sessions.sort_by_key(|s| (s.date, s.id));

        Ok(TodayStatus {
            logical_date,
            checked_in: record.as_ref().is_some_and(AttendanceRecord::is_open),
            checked_out: record.as_ref().is_some_and(AttendanceRecord::is_closed),
            record,
            breaks,
            sessions,
        })
    }
}
