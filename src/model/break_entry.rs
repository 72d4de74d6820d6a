use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One break segment owned by an attendance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct BreakEntry {
    pub id: u64,
    pub attendance_id: u64,
    #[schema(example = "coffee")]
    pub break_type: String,
    #[schema(value_type = String, format = "date-time")]
    pub break_start: NaiveDateTime,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub break_end: Option<NaiveDateTime>,
    pub duration_minutes: i64,
    /// Segment cap in minutes.
    pub duration_limit: i64,
    pub penalty_minutes: i64,
}

impl BreakEntry {
    pub fn start(attendance_id: u64, break_type: &str, at: NaiveDateTime, limit: i64) -> Self {
        Self {
            id: 0,
            attendance_id,
            break_type: break_type.to_string(),
            break_start: at,
            break_end: None,
            duration_minutes: 0,
            duration_limit: limit,
            penalty_minutes: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.break_end.is_none()
    }

    /// Latest instant this segment is entitled to run until.
    pub fn entitled_end(&self) -> NaiveDateTime {
        self.break_start + TimeDelta::minutes(self.duration_limit)
    }
}

/// Minutes consumed by finished segments.
pub fn used_minutes(entries: &[BreakEntry]) -> i64 {
    entries
        .iter()
        .filter(|entry| !entry.is_open())
        .map(|entry| entry.duration_minutes)
        .sum()
}
