use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A named shift template. Sessions reference it by id; edits never touch
/// sessions that already happened because every derived timestamp is
/// recomputed from the session date at the time of use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 3,
    "name": "Night",
    "time_in": "22:00:00",
    "time_out": "06:00:00",
    "is_overnight": true,
    "grace_period_minutes": null,
    "is_active": true
}))]
pub struct Schedule {
    pub id: u64,
    pub name: String,
    #[schema(value_type = String, format = "time")]
    pub time_in: NaiveTime,
    #[schema(value_type = String, format = "time")]
    pub time_out: NaiveTime,
    pub is_overnight: bool,
    /// Overrides the global `grace_period` setting when present.
    pub grace_period_minutes: Option<i64>,
    pub is_active: bool,
}

impl Schedule {
    pub fn crosses_midnight(&self) -> bool {
        self.is_overnight || self.time_out < self.time_in
    }

    pub fn shift_start(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.time_in)
    }

    /// End of the shift that starts on `date`; rolls into the next day when
    /// the clock-out time is not after the clock-in time.
    pub fn shift_end(&self, date: NaiveDate) -> NaiveDateTime {
        let end = date.and_time(self.time_out);
        if self.time_out < self.time_in || (self.is_overnight && self.time_out == self.time_in) {
            end + TimeDelta::days(1)
        } else {
            end
        }
    }

    pub fn grace_minutes(&self, fallback: i64) -> i64 {
        self.grace_period_minutes.unwrap_or(fallback).max(0)
    }
}

#[cfg(test)]
pub(crate) fn schedule(id: u64, time_in: &str, time_out: &str) -> Schedule {
    let time_in = NaiveTime::parse_from_str(time_in, "%H:%M").expect("time_in");
    let time_out = NaiveTime::parse_from_str(time_out, "%H:%M").expect("time_out");
    Schedule {
        id,
        name: format!("shift-{id}"),
        time_in,
        time_out,
        is_overnight: time_out < time_in,
        grace_period_minutes: None,
        is_active: true,
    }
}
