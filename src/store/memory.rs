//! In-memory store for engine tests.
//!
//! A transaction holds the whole state behind one async mutex and works on a
//! copy that replaces the shared state on commit, so every transaction is
//! serialized and a dropped transaction leaves nothing behind.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{AttendanceStore, AttendanceTx, SettingsStore, StoreError};
use crate::model::{
    attendance::AttendanceRecord,
    break_entry::BreakEntry,
    schedule::Schedule,
    session::{SessionStatus, ShiftSession},
};

#[derive(Debug, Default, Clone)]
pub struct MemoryState {
    pub schedules: Vec<Schedule>,
    pub sessions: Vec<ShiftSession>,
    pub records: Vec<AttendanceRecord>,
    pub breaks: Vec<BreakEntry>,
    next_id: u64,
}

impl MemoryState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&self, id: u64) -> Option<AttendanceRecord> {
        self.records.iter().find(|r| r.id == id).cloned()
    }

    fn open_record(&self, user_id: u64) -> Option<AttendanceRecord> {
        self.records
            .iter()
            .filter(|r| r.user_id == user_id && r.is_open())
            .max_by_key(|r| r.time_in)
            .cloned()
    }

    fn record_on(&self, user_id: u64, date: NaiveDate) -> Option<AttendanceRecord> {
        self.records
            .iter()
            .filter(|r| r.user_id == user_id && r.attendance_date == date)
            .max_by_key(|r| r.id)
            .cloned()
    }

    fn record_for_session(&self, user_id: u64, session_id: u64) -> Option<AttendanceRecord> {
        self.records
            .iter()
            .filter(|r| r.user_id == user_id && r.session_id == Some(session_id))
            .max_by_key(|r| r.id)
            .cloned()
    }

    fn breaks_for(&self, attendance_id: u64) -> Vec<BreakEntry> {
        let mut entries: Vec<_> = self
            .breaks
            .iter()
            .filter(|b| b.attendance_id == attendance_id)
            .cloned()
            .collect();
        entries.sort_by_key(|b| b.break_start);
        entries
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_schedule(&self, schedule: Schedule) -> Schedule {
        let mut state = self.state.lock().await;
        state.next_id = state.next_id.max(schedule.id);
        state.schedules.push(schedule.clone());
        schedule
    }

    pub async fn add_session(&self, mut session: ShiftSession) -> ShiftSession {
        let mut state = self.state.lock().await;
        session.id = state.next_id();
        state.sessions.push(session.clone());
        session
    }

    pub async fn add_record(&self, mut record: AttendanceRecord) -> AttendanceRecord {
        let mut state = self.state.lock().await;
        record.id = state.next_id();
        state.records.push(record.clone());
        record
    }

    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Makes every transactional write fail until switched off again.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryTx {
    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

impl AttendanceStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx {
            guard,
            working,
            fail_writes: self.fail_writes.clone(),
        })
    }

    async fn find_schedule(&self, id: u64) -> Result<Option<Schedule>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.schedules.iter().find(|s| s.id == id).cloned())
    }

    async fn active_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.schedules.iter().filter(|s| s.is_active).cloned().collect())
    }

    async fn find_session(&self, id: u64) -> Result<Option<ShiftSession>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn find_session_for(
        &self,
        schedule_id: u64,
        date: NaiveDate,
    ) -> Result<Option<ShiftSession>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .iter()
            .find(|s| s.schedule_id == Some(schedule_id) && s.date == date)
            .cloned())
    }

    async fn sessions_on(&self, date: NaiveDate) -> Result<Vec<ShiftSession>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.sessions.iter().filter(|s| s.date == date).cloned().collect())
    }

    async fn unsettled_sessions(&self, up_to: NaiveDate) -> Result<Vec<ShiftSession>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .iter()
            .filter(|s| {
                s.date <= up_to
                    && !matches!(s.status, SessionStatus::Locked | SessionStatus::Completed)
            })
            .cloned()
            .collect())
    }

    async fn insert_session(&self, session: &ShiftSession) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        if state
            .sessions
            .iter()
            .any(|s| s.schedule_id.is_some() && s.schedule_id == session.schedule_id && s.date == session.date)
        {
            return Err(StoreError::Conflict("duplicate (schedule_id, date)".into()));
        }
        let id = state.next_id();
        let mut session = session.clone();
        session.id = id;
        state.sessions.push(session);
        Ok(id)
    }

    async fn update_session(&self, session: &ShiftSession) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.sessions.iter_mut().find(|s| s.id == session.id) {
            *existing = session.clone();
        }
        Ok(())
    }

    async fn advance_session(
        &self,
        session: &ShiftSession,
        from: SessionStatus,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.sessions.iter_mut().find(|s| s.id == session.id && s.status == from) {
            Some(existing) => {
                existing.status = session.status;
                existing.opened_at = session.opened_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_record(&self, id: u64) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self.state.lock().await.record(id))
    }

    async fn find_open_record(&self, user_id: u64) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self.state.lock().await.open_record(user_id))
    }

    async fn find_record_on(
        &self,
        user_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self.state.lock().await.record_on(user_id, date))
    }

    async fn find_record_for_session(
        &self,
        user_id: u64,
        session_id: u64,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self.state.lock().await.record_for_session(user_id, session_id))
    }

    async fn breaks_for(&self, attendance_id: u64) -> Result<Vec<BreakEntry>, StoreError> {
        Ok(self.state.lock().await.breaks_for(attendance_id))
    }
}

impl AttendanceTx for MemoryTx {
    async fn lock_record(&mut self, id: u64) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self.working.record(id))
    }

    async fn lock_open_record(
        &mut self,
        user_id: u64,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self.working.open_record(user_id))
    }

    async fn lock_record_on(
        &mut self,
        user_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self.working.record_on(user_id, date))
    }

    async fn lock_record_for_session(
        &mut self,
        user_id: u64,
        session_id: u64,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self.working.record_for_session(user_id, session_id))
    }

    async fn insert_record(&mut self, record: &AttendanceRecord) -> Result<u64, StoreError> {
        self.check_writable()?;
        let id = self.working.next_id();
        let mut record = record.clone();
        record.id = id;
        self.working.records.push(record);
        Ok(id)
    }

    async fn update_record(&mut self, record: &AttendanceRecord) -> Result<(), StoreError> {
        self.check_writable()?;
        if let Some(existing) = self.working.records.iter_mut().find(|r| r.id == record.id) {
            *existing = record.clone();
        }
        Ok(())
    }

    async fn breaks_for(&mut self, attendance_id: u64) -> Result<Vec<BreakEntry>, StoreError> {
        Ok(self.working.breaks_for(attendance_id))
    }

    async fn insert_break(&mut self, entry: &BreakEntry) -> Result<u64, StoreError> {
        self.check_writable()?;
        let id = self.working.next_id();
        let mut entry = entry.clone();
        entry.id = id;
        self.working.breaks.push(entry);
        Ok(id)
    }

    async fn update_break(&mut self, entry: &BreakEntry) -> Result<(), StoreError> {
        self.check_writable()?;
        if let Some(existing) = self.working.breaks.iter_mut().find(|b| b.id == entry.id) {
            *existing = entry.clone();
        }
        Ok(())
    }

    async fn delete_session(&mut self, session_id: u64) -> Result<u64, StoreError> {
        self.check_writable()?;
        let record_ids: Vec<u64> = self
            .working
            .records
            .iter()
            .filter(|r| r.session_id == Some(session_id))
            .map(|r| r.id)
            .collect();
        self.working
            .breaks
            .retain(|b| !record_ids.contains(&b.attendance_id));
        self.working
            .records
            .retain(|r| r.session_id != Some(session_id));
        self.working.sessions.retain(|s| s.id != session_id);
        Ok(record_ids.len() as u64)
    }

    async fn commit(self) -> Result<(), StoreError> {
        let MemoryTx {
            mut guard, working, ..
        } = self;
        *guard = working;
        Ok(())
    }
}

/// Fixed key/value pairs standing in for the `settings` table.
#[derive(Clone, Default)]
pub struct MemorySettings {
    pairs: Arc<std::sync::Mutex<Vec<(String, String)>>>,
}

impl MemorySettings {
    pub fn with(pairs: &[(&str, &str)]) -> Self {
        let settings = Self::default();
        for (key, value) in pairs {
            settings.set(key, value);
        }
        settings
    }

    pub fn set(&self, key: &str, value: &str) {
        let mut pairs = self.pairs.lock().expect("settings poisoned");
        pairs.retain(|(k, _)| k != key);
        pairs.push((key.to_string(), value.to_string()));
    }
}

impl SettingsStore for MemorySettings {
    async fn load_settings(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self.pairs.lock().expect("settings poisoned").clone())
    }
}
