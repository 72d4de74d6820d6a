use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceStatus {
    Pending,
    Present,
    Late,
    Absent,
    Excused,
    LeftEarly,
}

impl AttendanceStatus {
    /// Pending and absent rows are pre-created placeholders that a check-in
    /// fills in rather than duplicates.
    pub fn is_placeholder(self) -> bool {
        matches!(self, AttendanceStatus::Pending | AttendanceStatus::Absent)
    }
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OvertimeStatus {
    None,
    Pending,
    Approved,
}

/// One employee's attendance for one logical day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1201,
    "user_id": 17,
    "session_id": 41,
    "attendance_date": "2026-03-02",
    "time_in": "2026-03-02T21:50:00",
    "time_out": "2026-03-03T06:10:00",
    "break_start": null,
    "break_end": null,
    "status": "present",
    "minutes_late": 0,
    "hours_worked": 8.33,
    "overtime_minutes": 0,
    "overtime_status": "none",
    "device_info": "Android 14",
    "ip_address": "10.0.0.12",
    "location": null,
    "notes": null
}))]
pub struct AttendanceRecord {
    pub id: u64,
    pub user_id: u64,
    pub session_id: Option<u64>,
    /// Logical day the record belongs to. Written once at creation.
    #[schema(value_type = String, format = "date")]
    pub attendance_date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub time_in: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub time_out: Option<NaiveDateTime>,
    /// Mirror of the latest break segment, kept for older clients.
    #[schema(value_type = Option<String>, format = "date-time")]
    pub break_start: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub break_end: Option<NaiveDateTime>,
    #[sqlx(try_from = "String")]
    pub status: AttendanceStatus,
    pub minutes_late: i64,
    pub hours_worked: f64,
    pub overtime_minutes: i64,
    #[sqlx(try_from = "String")]
    pub overtime_status: OvertimeStatus,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

impl AttendanceRecord {
    pub fn placeholder(user_id: u64, session_id: Option<u64>, attendance_date: NaiveDate) -> Self {
        Self {
            id: 0,
            user_id,
            session_id,
            attendance_date,
            time_in: None,
            time_out: None,
            break_start: None,
            break_end: None,
            status: AttendanceStatus::Pending,
            minutes_late: 0,
            hours_worked: 0.0,
            overtime_minutes: 0,
            overtime_status: OvertimeStatus::None,
            device_info: None,
            ip_address: None,
            location: None,
            notes: None,
        }
    }

    /// Checked in, not yet checked out, and not a placeholder or excusal.
    pub fn is_open(&self) -> bool {
        self.time_in.is_some()
            && self.time_out.is_none()
            && !self.status.is_placeholder()
            && self.status != AttendanceStatus::Excused
    }

    pub fn is_closed(&self) -> bool {
        self.time_in.is_some() && self.time_out.is_some()
    }

    pub fn append_note(&mut self, note: &str) {
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{note}"),
            _ => note.to_string(),
        });
    }
}
