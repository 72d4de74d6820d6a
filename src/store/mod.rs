//! Persistence seams used by the attendance engine.
//!
//! Reads outside a transaction never lock. Everything that mutates an
//! attendance record or its breaks goes through [`AttendanceTx`], whose
//! `lock_*` methods take pessimistic row locks that are held until the
//! transaction is committed or dropped. Dropping a transaction without
//! calling [`AttendanceTx::commit`] rolls it back.

#[cfg(test)]
pub mod memory;
pub mod mysql;

use chrono::NaiveDate;

use crate::model::{
    attendance::AttendanceRecord, break_entry::BreakEntry, schedule::Schedule,
    session::{SessionStatus, ShiftSession},
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// A unique constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored value could not be decoded into the domain model.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::ColumnDecode { index, source } => {
                StoreError::Corrupt(format!("column {index}: {source}"))
            }
            sqlx::Error::Decode(source) => StoreError::Corrupt(source.to_string()),
            other => StoreError::Database(other),
        }
    }
}

pub trait AttendanceStore {
    type Tx: AttendanceTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn find_schedule(&self, id: u64) -> Result<Option<Schedule>, StoreError>;
    async fn active_schedules(&self) -> Result<Vec<Schedule>, StoreError>;

    async fn find_session(&self, id: u64) -> Result<Option<ShiftSession>, StoreError>;
    async fn find_session_for(
        &self,
        schedule_id: u64,
        date: NaiveDate,
    ) -> Result<Option<ShiftSession>, StoreError>;
    async fn sessions_on(&self, date: NaiveDate) -> Result<Vec<ShiftSession>, StoreError>;
    /// Sessions that are neither locked nor completed, dated on or before `up_to`.
    async fn unsettled_sessions(&self, up_to: NaiveDate) -> Result<Vec<ShiftSession>, StoreError>;
    async fn insert_session(&self, session: &ShiftSession) -> Result<u64, StoreError>;
    async fn update_session(&self, session: &ShiftSession) -> Result<(), StoreError>;
    /// Writes an automatic status transition only if the stored status is
    /// still `from`. Leaves `locked_at` alone. Returns whether a row moved.
    async fn advance_session(
        &self,
        session: &ShiftSession,
        from: SessionStatus,
    ) -> Result<bool, StoreError>;

    async fn find_record(&self, id: u64) -> Result<Option<AttendanceRecord>, StoreError>;
    /// Most recent open record (by `time_in`) for the user.
    async fn find_open_record(&self, user_id: u64) -> Result<Option<AttendanceRecord>, StoreError>;
    async fn find_record_on(
        &self,
        user_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError>;
    async fn find_record_for_session(
        &self,
        user_id: u64,
        session_id: u64,
    ) -> Result<Option<AttendanceRecord>, StoreError>;
    async fn breaks_for(&self, attendance_id: u64) -> Result<Vec<BreakEntry>, StoreError>;
}

pub trait AttendanceTx {
    async fn lock_record(&mut self, id: u64) -> Result<Option<AttendanceRecord>, StoreError>;
    async fn lock_open_record(
        &mut self,
        user_id: u64,
    ) -> Result<Option<AttendanceRecord>, StoreError>;
    async fn lock_record_on(
        &mut self,
        user_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError>;
    async fn lock_record_for_session(
        &mut self,
        user_id: u64,
        session_id: u64,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    async fn insert_record(&mut self, record: &AttendanceRecord) -> Result<u64, StoreError>;
    async fn update_record(&mut self, record: &AttendanceRecord) -> Result<(), StoreError>;

    async fn breaks_for(&mut self, attendance_id: u64) -> Result<Vec<BreakEntry>, StoreError>;
    async fn insert_break(&mut self, entry: &BreakEntry) -> Result<u64, StoreError>;
    async fn update_break(&mut self, entry: &BreakEntry) -> Result<(), StoreError>;

    /// Removes a session together with its records and their breaks.
    /// Returns the number of attendance records removed.
    async fn delete_session(&mut self, session_id: u64) -> Result<u64, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}

/// Key/value source for engine settings.
pub trait SettingsStore {
    async fn load_settings(&self) -> Result<Vec<(String, String)>, StoreError>;
}
