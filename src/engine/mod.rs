//! Shift-scoped attendance state engine.
//!
//! Every operation takes the caller's wall-clock `now` so that logical-day
//! resolution, windows and lazy status derivation are deterministic.

pub mod breaks;
pub mod check_in;
pub mod check_out;
pub mod logical_day;
pub mod sessions;
pub mod status;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::{
    error::AttendanceResult,
    events::EventSink,
    model::{schedule::Schedule, session::ShiftSession},
    settings::{Settings, SettingsProvider},
    store::{AttendanceStore, SettingsStore},
    utils::user_lock::UserLocks,
};

pub struct AttendanceEngine<S, K, E> {
    store: S,
    settings: SettingsProvider<K>,
    locks: UserLocks,
    events: E,
}

impl<S, K, E> AttendanceEngine<S, K, E>
where
    S: AttendanceStore,
    K: SettingsStore,
    E: EventSink,
{
    pub fn new(store: S, settings: SettingsProvider<K>, locks: UserLocks, events: E) -> Self {
        Self {
            store,
            settings,
            locks,
            events,
        }
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn events(&self) -> &E {
        &self.events
    }

    pub(crate) async fn settings(&self) -> AttendanceResult<Arc<Settings>> {
        Ok(self.settings.snapshot().await?)
    }

    /// Forces the next operation to reload settings from the store.
    pub async fn refresh_settings(&self) {
        self.settings.invalidate().await;
    }

    pub(crate) async fn schedule_of(
        &self,
        session: &ShiftSession,
    ) -> AttendanceResult<Option<Schedule>> {
        match session.schedule_id {
            Some(id) => Ok(self.store.find_schedule(id).await?),
            None => Ok(None),
        }
    }
}
