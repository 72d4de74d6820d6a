use chrono::NaiveDate;
use sqlx::{MySql, MySqlPool, Transaction};

use super::{AttendanceStore, AttendanceTx, SettingsStore, StoreError};
use crate::model::{
    attendance::AttendanceRecord, break_entry::BreakEntry, schedule::Schedule,
    session::{SessionStatus, ShiftSession},
};

const RECORD_COLUMNS: &str = r#"
    id, user_id, session_id, attendance_date, time_in, time_out,
    break_start, break_end, status, minutes_late, hours_worked,
    overtime_minutes, overtime_status, device_info, ip_address, location, notes
"#;

const SESSION_COLUMNS: &str = "id, schedule_id, date, status, opened_at, locked_at";

const SCHEDULE_COLUMNS: &str =
    "id, name, time_in, time_out, is_overnight, grace_period_minutes, is_active";

const BREAK_COLUMNS: &str = r#"
    id, attendance_id, break_type, break_start, break_end,
    duration_minutes, duration_limit, penalty_minutes
"#;

/// Statuses that never count as an open record.
const NOT_WORKING: &str = "('pending', 'absent', 'excused')";

/// Maps MySQL duplicate-key violations (SQLSTATE 23000) to [`StoreError::Conflict`].
fn classify(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some("23000") {
            return StoreError::Conflict(db_err.message().to_string());
        }
    }
    StoreError::from(e)
}

#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

pub struct MySqlTx {
    tx: Transaction<'static, MySql>,
}

impl AttendanceStore for MySqlStore {
    type Tx = MySqlTx;

    async fn begin(&self) -> Result<MySqlTx, StoreError> {
        Ok(MySqlTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn find_schedule(&self, id: u64) -> Result<Option<Schedule>, StoreError> {
        let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?");
        Ok(sqlx::query_as::<_, Schedule>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn active_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE is_active = 1");
        Ok(sqlx::query_as::<_, Schedule>(&sql).fetch_all(&self.pool).await?)
    }

    async fn find_session(&self, id: u64) -> Result<Option<ShiftSession>, StoreError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM shift_sessions WHERE id = ?");
        Ok(sqlx::query_as::<_, ShiftSession>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_session_for(
        &self,
        schedule_id: u64,
        date: NaiveDate,
    ) -> Result<Option<ShiftSession>, StoreError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM shift_sessions WHERE schedule_id = ? AND date = ?"
        );
        Ok(sqlx::query_as::<_, ShiftSession>(&sql)
            .bind(schedule_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn sessions_on(&self, date: NaiveDate) -> Result<Vec<ShiftSession>, StoreError> {
        let sql =
            format!("SELECT {SESSION_COLUMNS} FROM shift_sessions WHERE date = ? ORDER BY id");
        Ok(sqlx::query_as::<_, ShiftSession>(&sql)
            .bind(date)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn unsettled_sessions(&self, up_to: NaiveDate) -> Result<Vec<ShiftSession>, StoreError> {
        let sql = format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM shift_sessions
            WHERE date <= ?
            AND status NOT IN ('locked', 'completed')
            "#
        );
        Ok(sqlx::query_as::<_, ShiftSession>(&sql)
            .bind(up_to)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert_session(&self, session: &ShiftSession) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO shift_sessions (schedule_id, date, status, opened_at, locked_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.schedule_id)
        .bind(session.date)
        .bind(session.status.as_ref())
        .bind(session.opened_at)
        .bind(session.locked_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(result.last_insert_id())
    }

    async fn update_session(&self, session: &ShiftSession) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE shift_sessions
            SET status = ?, opened_at = ?, locked_at = ?
            WHERE id = ?
            "#,
        )
        .bind(session.status.as_ref())
        .bind(session.opened_at)
        .bind(session.locked_at)
        .bind(session.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn advance_session(
        &self,
        session: &ShiftSession,
        from: SessionStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE shift_sessions
            SET status = ?, opened_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(session.status.as_ref())
        .bind(session.opened_at)
        .bind(session.id)
        .bind(from.as_ref())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_record(&self, id: u64) -> Result<Option<AttendanceRecord>, StoreError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM attendance_records WHERE id = ?");
        Ok(sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_open_record(&self, user_id: u64) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(sqlx::query_as::<_, AttendanceRecord>(&open_record_sql(false))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_record_on(
        &self,
        user_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(sqlx::query_as::<_, AttendanceRecord>(&record_on_sql(false))
            .bind(user_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_record_for_session(
        &self,
        user_id: u64,
        session_id: u64,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(sqlx::query_as::<_, AttendanceRecord>(&record_for_session_sql(false))
            .bind(user_id)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn breaks_for(&self, attendance_id: u64) -> Result<Vec<BreakEntry>, StoreError> {
        Ok(sqlx::query_as::<_, BreakEntry>(&breaks_sql())
            .bind(attendance_id)
            .fetch_all(&self.pool)
            .await?)
    }
}

fn lock_clause(lock: bool) -> &'static str {
    if lock { "FOR UPDATE" } else { "" }
}

fn open_record_sql(lock: bool) -> String {
    format!(
        r#"
        SELECT {RECORD_COLUMNS}
        FROM attendance_records
        WHERE user_id = ?
        AND time_in IS NOT NULL
        AND time_out IS NULL
        AND status NOT IN {NOT_WORKING}
        ORDER BY time_in DESC
        LIMIT 1
        {}
        "#,
        lock_clause(lock)
    )
}

fn record_on_sql(lock: bool) -> String {
    format!(
        r#"
        SELECT {RECORD_COLUMNS}
        FROM attendance_records
        WHERE user_id = ?
        AND attendance_date = ?
        ORDER BY id DESC
        LIMIT 1
        {}
        "#,
        lock_clause(lock)
    )
}

fn record_for_session_sql(lock: bool) -> String {
    format!(
        r#"
        SELECT {RECORD_COLUMNS}
        FROM attendance_records
        WHERE user_id = ?
        AND session_id = ?
        ORDER BY id DESC
        LIMIT 1
        {}
        "#,
        lock_clause(lock)
    )
}

fn breaks_sql() -> String {
    format!("SELECT {BREAK_COLUMNS} FROM attendance_breaks WHERE attendance_id = ? ORDER BY break_start")
}

impl AttendanceTx for MySqlTx {
    async fn lock_record(&mut self, id: u64) -> Result<Option<AttendanceRecord>, StoreError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM attendance_records WHERE id = ? FOR UPDATE");
        Ok(sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn lock_open_record(
        &mut self,
        user_id: u64,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(sqlx::query_as::<_, AttendanceRecord>(&open_record_sql(true))
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn lock_record_on(
        &mut self,
        user_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(sqlx::query_as::<_, AttendanceRecord>(&record_on_sql(true))
            .bind(user_id)
            .bind(date)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn lock_record_for_session(
        &mut self,
        user_id: u64,
        session_id: u64,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(sqlx::query_as::<_, AttendanceRecord>(&record_for_session_sql(true))
            .bind(user_id)
            .bind(session_id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn insert_record(&mut self, record: &AttendanceRecord) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_records
                (user_id, session_id, attendance_date, time_in, time_out,
                 break_start, break_end, status, minutes_late, hours_worked,
                 overtime_minutes, overtime_status, device_info, ip_address, location, notes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.user_id)
        .bind(record.session_id)
        .bind(record.attendance_date)
        .bind(record.time_in)
        .bind(record.time_out)
        .bind(record.break_start)
        .bind(record.break_end)
        .bind(record.status.as_ref())
        .bind(record.minutes_late)
        .bind(record.hours_worked)
        .bind(record.overtime_minutes)
        .bind(record.overtime_status.as_ref())
        .bind(record.device_info.as_deref())
        .bind(record.ip_address.as_deref())
        .bind(record.location.as_deref())
        .bind(record.notes.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;

        Ok(result.last_insert_id())
    }

    async fn update_record(&mut self, record: &AttendanceRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE attendance_records
            SET session_id = ?, time_in = ?, time_out = ?, break_start = ?, break_end = ?,
                status = ?, minutes_late = ?, hours_worked = ?, overtime_minutes = ?,
                overtime_status = ?, device_info = ?, ip_address = ?, location = ?, notes = ?
            WHERE id = ?
            "#,
        )
        .bind(record.session_id)
        .bind(record.time_in)
        .bind(record.time_out)
        .bind(record.break_start)
        .bind(record.break_end)
        .bind(record.status.as_ref())
        .bind(record.minutes_late)
        .bind(record.hours_worked)
        .bind(record.overtime_minutes)
        .bind(record.overtime_status.as_ref())
        .bind(record.device_info.as_deref())
        .bind(record.ip_address.as_deref())
        .bind(record.location.as_deref())
        .bind(record.notes.as_deref())
        .bind(record.id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn breaks_for(&mut self, attendance_id: u64) -> Result<Vec<BreakEntry>, StoreError> {
        Ok(sqlx::query_as::<_, BreakEntry>(&format!("{} FOR UPDATE", breaks_sql()))
            .bind(attendance_id)
            .fetch_all(&mut *self.tx)
            .await?)
    }

    async fn insert_break(&mut self, entry: &BreakEntry) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_breaks
                (attendance_id, break_type, break_start, break_end,
                 duration_minutes, duration_limit, penalty_minutes)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.attendance_id)
        .bind(&entry.break_type)
        .bind(entry.break_start)
        .bind(entry.break_end)
        .bind(entry.duration_minutes)
        .bind(entry.duration_limit)
        .bind(entry.penalty_minutes)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.last_insert_id())
    }

    async fn update_break(&mut self, entry: &BreakEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE attendance_breaks
            SET break_end = ?, duration_minutes = ?, penalty_minutes = ?
            WHERE id = ?
            "#,
        )
        .bind(entry.break_end)
        .bind(entry.duration_minutes)
        .bind(entry.penalty_minutes)
        .bind(entry.id)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_session(&mut self, session_id: u64) -> Result<u64, StoreError> {
        sqlx::query(
            r#"
            DELETE b FROM attendance_breaks b
            JOIN attendance_records r ON r.id = b.attendance_id
            WHERE r.session_id = ?
            "#,
        )
        .bind(session_id)
        .execute(&mut *self.tx)
        .await?;

        let records = sqlx::query("DELETE FROM attendance_records WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM shift_sessions WHERE id = ?")
            .bind(session_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(records)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// Reads the `settings` key/value table.
#[derive(Clone)]
pub struct MySqlSettingsStore {
    pool: MySqlPool,
}

impl MySqlSettingsStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

impl SettingsStore for MySqlSettingsStore {
    async fn load_settings(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(
            sqlx::query_as::<_, (String, String)>("SELECT `key`, `value` FROM settings")
                .fetch_all(&self.pool)
                .await?,
        )
    }
}
