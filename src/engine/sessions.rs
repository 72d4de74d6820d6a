use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use tracing::{debug, info};

use super::{AttendanceEngine, logical_day::LogicalDayResolver, window::CheckInWindow};
use crate::{
    error::{AttendanceError, AttendanceResult, ErrorCode},
    events::EventSink,
    model::{
        schedule::Schedule,
        session::{SessionStatus, ShiftSession},
    },
    store::{AttendanceStore, AttendanceTx, SettingsStore, StoreError},
};

/// Status a session should have at `now`. Locked sessions never move, and
/// sessions whose schedule is gone are closed once they are over a day old.
pub fn derive_status(
    session: &ShiftSession,
    schedule: Option<&Schedule>,
    now: NaiveDateTime,
    logical_today: NaiveDate,
) -> SessionStatus {
    if session.is_locked() {
        return SessionStatus::Locked;
    }

    match schedule {
        Some(schedule) => {
            if now < schedule.shift_start(session.date) {
                SessionStatus::Pending
            } else if now <= schedule.shift_end(session.date) {
                SessionStatus::Active
            } else {
                SessionStatus::Completed
            }
        }
        None if (logical_today - session.date).num_days() > 1 => SessionStatus::Completed,
        None => session.status,
    }
}

/// Applies a derived status; returns whether anything changed.
fn apply_status(session: &mut ShiftSession, status: SessionStatus, now: NaiveDateTime) -> bool {
    if session.status == status {
        return false;
    }
    session.status = status;
    if status == SessionStatus::Active && session.opened_at.is_none() {
        session.opened_at = Some(now);
    }
    true
}

fn session_not_found(id: u64) -> AttendanceError {
    AttendanceError::reject(ErrorCode::SessionNotFound, format!("Session {id} not found"))
}

impl<S, K, E> AttendanceEngine<S, K, E>
where
    S: AttendanceStore,
    K: SettingsStore,
    E: EventSink,
{
    /// Re-derives every unsettled session up to the current logical day and
    /// persists the ones whose status moved. Returns how many changed.
    pub async fn sync_sessions(&self, now: NaiveDateTime) -> AttendanceResult<usize> {
        let settings = self.settings().await?;
        let today = LogicalDayResolver::from_settings(&settings).resolve(now);

        let mut schedules: HashMap<u64, Option<Schedule>> = HashMap::new();
        let mut changed = 0;

        for mut session in self.store.unsettled_sessions(today).await? {
            if let Some(id) = session.schedule_id {
                if !schedules.contains_key(&id) {
                    let schedule = self.store.find_schedule(id).await?;
                    schedules.insert(id, schedule);
                }
            }
            let schedule = session
                .schedule_id
                .and_then(|id| schedules.get(&id).cloned().flatten());

            let previous = session.status;
            let status = derive_status(&session, schedule.as_ref(), now, today);
            if !apply_status(&mut session, status, now) {
                continue;
            }
            // An admin lock that landed since the read wins.
            if self.store.advance_session(&session, previous).await? {
                debug!(session_id = session.id, status = %status, "Session status advanced");
                changed += 1;
            } else {
                debug!(session_id = session.id, "Session changed underneath sync, skipped");
            }
        }

        Ok(changed)
    }

    /// Sessions filed under `date` (the current logical day by default),
    /// synchronized first.
    pub async fn sessions_for_day(
        &self,
        now: NaiveDateTime,
        date: Option<NaiveDate>,
    ) -> AttendanceResult<Vec<ShiftSession>> {
        self.sync_sessions(now).await?;
        let settings = self.settings().await?;
        let date = date.unwrap_or_else(|| LogicalDayResolver::from_settings(&settings).resolve(now));
        Ok(self.store.sessions_on(date).await?)
    }

    /// Finds, creating where missing, the sessions whose check-in window
    /// contains `now`.
    pub async fn detect_sessions(&self, now: NaiveDateTime) -> AttendanceResult<Vec<ShiftSession>> {
        let settings = self.settings().await?;
        let today = LogicalDayResolver::from_settings(&settings).resolve(now);
        let mut found = Vec::new();

        for schedule in self.store.active_schedules().await? {
            for offset in -1..=1 {
                let date = today + TimeDelta::days(offset);
                let window =
                    CheckInWindow::new(&schedule, date, schedule.grace_minutes(settings.grace_period));
                if !window.contains(now) {
                    continue;
                }

                let session = match self.store.find_session_for(schedule.id, date).await? {
                    Some(session) => session,
                    None => self.open_session(&schedule, date, now, today).await?,
                };
                found.push(session);
            }
        }

        Ok(found)
    }

    async fn open_session(
        &self,
        schedule: &Schedule,
        date: NaiveDate,
        now: NaiveDateTime,
        today: NaiveDate,
    ) -> AttendanceResult<ShiftSession> {
        let mut session = ShiftSession::new(schedule.id, date);
        let status = derive_status(&session, Some(schedule), now, today);
        apply_status(&mut session, status, now);

        match self.store.insert_session(&session).await {
            Ok(id) => {
                session.id = id;
                info!(session_id = id, schedule_id = schedule.id, %date, "Session auto-detected");
                Ok(session)
            }
            // Lost the race against another request creating the same session.
            Err(StoreError::Conflict(_)) => self
                .store
                .find_session_for(schedule.id, date)
                .await?
                .ok_or_else(|| AttendanceError::reject(ErrorCode::SessionNotFound, "Session vanished")),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn create_session(
        &self,
        schedule_id: u64,
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> AttendanceResult<ShiftSession> {
        let schedule = self.store.find_schedule(schedule_id).await?.ok_or_else(|| {
            AttendanceError::reject(ErrorCode::NoSchedule, format!("Schedule {schedule_id} not found"))
        })?;

        let exists = || {
            AttendanceError::reject(
                ErrorCode::SessionExists,
                format!("A session for schedule {schedule_id} on {date} already exists"),
            )
        };
        if self.store.find_session_for(schedule_id, date).await?.is_some() {
            return Err(exists());
        }

        let settings = self.settings().await?;
        let today = LogicalDayResolver::from_settings(&settings).resolve(now);
        let mut session = ShiftSession::new(schedule_id, date);
        let status = derive_status(&session, Some(&schedule), now, today);
        apply_status(&mut session, status, now);

        session.id = match self.store.insert_session(&session).await {
            Ok(id) => id,
            Err(StoreError::Conflict(_)) => return Err(exists()),
            Err(e) => return Err(e.into()),
        };
        info!(session_id = session.id, schedule_id, %date, "Session created");
        Ok(session)
    }

    pub async fn lock_session(&self, id: u64, now: NaiveDateTime) -> AttendanceResult<ShiftSession> {
        let mut session = self
            .store
            .find_session(id)
            .await?
            .ok_or_else(|| session_not_found(id))?;

        if !session.is_locked() {
            session.status = SessionStatus::Locked;
            session.locked_at = Some(now);
            self.store.update_session(&session).await?;
            info!(session_id = id, "Session locked");
        }
        Ok(session)
    }

    /// Releases an administrative lock and puts the session back under
    /// automatic status derivation.
    pub async fn unlock_session(&self, id: u64, now: NaiveDateTime) -> AttendanceResult<ShiftSession> {
        let mut session = self
            .store
            .find_session(id)
            .await?
            .ok_or_else(|| session_not_found(id))?;

        if session.is_locked() {
            let settings = self.settings().await?;
            let today = LogicalDayResolver::from_settings(&settings).resolve(now);
            let schedule = self.schedule_of(&session).await?;

            session.status = SessionStatus::Pending;
            session.locked_at = None;
            let status = derive_status(&session, schedule.as_ref(), now, today);
            apply_status(&mut session, status, now);
            self.store.update_session(&session).await?;
            info!(session_id = id, status = %session.status, "Session unlocked");
        }
        Ok(session)
    }

    /// Deletes the session with its attendance records and their breaks in
    /// one transaction. Returns the number of records removed.
    pub async fn delete_session(&self, id: u64) -> AttendanceResult<u64> {
        if self.store.find_session(id).await?.is_none() {
            return Err(session_not_found(id));
        }

        let mut tx = self.store.begin().await?;
        let removed = tx.delete_session(id).await?;
        tx.commit().await?;

        info!(session_id = id, records = removed, "Session deleted");
        Ok(removed)
    }
}
