use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Active,
    /// Set by an administrator; automatic transitions skip it until unlocked.
    Locked,
    Completed,
}

/// One occurrence of a schedule on one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 41,
    "schedule_id": 3,
    "date": "2026-03-02",
    "status": "active",
    "opened_at": "2026-03-02T22:00:00",
    "locked_at": null
}))]
pub struct ShiftSession {
    pub id: u64,
    /// `None` once the schedule has been removed.
    pub schedule_id: Option<u64>,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    #[sqlx(try_from = "String")]
    pub status: SessionStatus,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub opened_at: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub locked_at: Option<NaiveDateTime>,
}

impl ShiftSession {
    pub fn new(schedule_id: u64, date: NaiveDate) -> Self {
        Self {
            id: 0,
            schedule_id: Some(schedule_id),
            date,
            status: SessionStatus::Pending,
            opened_at: None,
            locked_at: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.status == SessionStatus::Locked
    }
}
