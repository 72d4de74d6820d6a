//! Fixtures shared by the engine tests.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};

use super::AttendanceEngine;
use crate::{
    events::recording::RecordingSink,
    model::{schedule::Schedule, session::ShiftSession},
    settings::SettingsProvider,
    store::memory::{MemorySettings, MemoryStore},
    utils::user_lock::UserLocks,
};

pub type TestEngine = AttendanceEngine<MemoryStore, MemorySettings, RecordingSink>;

pub fn at(stamp: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S"))
        .unwrap_or_else(|_| panic!("bad timestamp {stamp}"))
}

pub fn day(date: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap_or_else(|_| panic!("bad date {date}"))
}

pub fn engine(settings: &[(&str, &str)]) -> TestEngine {
    AttendanceEngine::new(
        MemoryStore::new(),
        SettingsProvider::new(MemorySettings::with(settings), Duration::from_secs(60)),
        UserLocks::default(),
        RecordingSink::default(),
    )
}

/// Registers the schedule and opens a session for it on `date`.
pub async fn session(engine: &TestEngine, schedule: Schedule, date: &str) -> ShiftSession {
    let schedule = engine.store().add_schedule(schedule).await;
    engine
        .store()
        .add_session(ShiftSession::new(schedule.id, day(date)))
        .await
}
