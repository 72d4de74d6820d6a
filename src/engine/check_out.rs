use chrono::{NaiveDateTime, TimeDelta};
use tracing::{error, info};

use super::{
    AttendanceEngine,
    breaks::{ClosedBreak, finish_break},
    logical_day::LogicalDayResolver,
    window::EARLY_LEAVE_TOLERANCE_MINUTES,
};
use crate::{
    error::{AttendanceError, AttendanceResult, ErrorCode},
    events::{AttendanceEvent, EventSink, RecordAction},
    model::{
        attendance::{AttendanceRecord, AttendanceStatus, OvertimeStatus},
        break_entry::{BreakEntry, used_minutes},
        schedule::Schedule,
    },
    settings::Settings,
    store::{AttendanceStore, AttendanceTx, SettingsStore},
};

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Days around the logical today within which a record may still be closed.
const CHECKOUT_DAYS_BACK: i64 = 1;
const CHECKOUT_DAYS_AHEAD: i64 = 2;

/// Gross minutes between check-in and check-out folded onto one day, so a
/// shift that crosses midnight never comes out negative.
pub fn worked_minutes(time_in: NaiveDateTime, time_out: NaiveDateTime) -> i64 {
    (time_out - time_in).num_minutes().rem_euclid(MINUTES_PER_DAY)
}

pub fn hours_from_minutes(minutes: i64) -> f64 {
    (minutes.max(0) as f64 / 60.0 * 100.0).round() / 100.0
}

/// Overtime past the scheduled end, after rounding. Zero when below the
/// configured minimum.
pub fn overtime_minutes(shift_end: NaiveDateTime, now: NaiveDateTime, settings: &Settings) -> i64 {
    if now <= shift_end {
        return 0;
    }
    let raw = (now - shift_end).num_minutes();
    if raw < settings.min_overtime_minutes {
        return 0;
    }
    settings.ot_rounding.apply(raw)
}

fn close_record(
    record: &mut AttendanceRecord,
    entries: &[BreakEntry],
    shift_end: Option<NaiveDateTime>,
    now: NaiveDateTime,
    settings: &Settings,
) {
    let gross = record.time_in.map_or(0, |time_in| worked_minutes(time_in, now));
    record.time_out = Some(now);
    record.hours_worked = hours_from_minutes(gross - used_minutes(entries));

    let Some(shift_end) = shift_end else {
        return;
    };

    if settings.allow_overtime {
        let overtime = overtime_minutes(shift_end, now, settings);
        if overtime > 0 {
            record.overtime_minutes = overtime;
            record.overtime_status = if settings.require_ot_approval {
                OvertimeStatus::Pending
            } else {
                OvertimeStatus::Approved
            };
        }
    }

    if now < shift_end - TimeDelta::minutes(EARLY_LEAVE_TOLERANCE_MINUTES)
        && record.status != AttendanceStatus::Excused
    {
        record.status = AttendanceStatus::LeftEarly;
    }
}

impl<S, K, E> AttendanceEngine<S, K, E>
where
    S: AttendanceStore,
    K: SettingsStore,
    E: EventSink,
{
    /// Closes the user's record, ending any running break at `now`.
    pub async fn check_out(
        &self,
        user_id: u64,
        record_id: u64,
        now: NaiveDateTime,
    ) -> AttendanceResult<AttendanceRecord> {
        let settings = self.settings().await?;
        let (record, closed) = self
            .check_out_inner(user_id, record_id, now, &settings)
            .await
            .inspect_err(|e| {
                if let AttendanceError::System(err) = e {
                    error!(user_id, record_id, error = %err, "Check-out rolled back");
                }
            })?;

        if let Some(closed) = &closed {
            self.announce_break_end(&record, closed, &settings).await;
        }
        self.events
            .publish(AttendanceEvent::AttendanceUpdated {
                action: RecordAction::CheckedOut,
                record: record.clone(),
            })
            .await;

        Ok(record)
    }

    async fn check_out_inner(
        &self,
        user_id: u64,
        record_id: u64,
        now: NaiveDateTime,
        settings: &Settings,
    ) -> AttendanceResult<(AttendanceRecord, Option<ClosedBreak>)> {
        let record = self
            .store
            .find_record(record_id)
            .await?
            .filter(|r| r.user_id == user_id)
            .ok_or_else(|| {
                AttendanceError::reject(ErrorCode::RecordNotFound, format!("Attendance record {record_id} not found"))
            })?;

        let offset = LogicalDayResolver::from_settings(settings).offset_days(record.attendance_date, now);
        if !(-CHECKOUT_DAYS_BACK..=CHECKOUT_DAYS_AHEAD).contains(&offset) {
            return Err(AttendanceError::reject(
                ErrorCode::RecordTooOld,
                format!("The record for {} can no longer be checked out", record.attendance_date),
            ));
        }

        let session = match record.session_id {
            Some(id) => self.store.find_session(id).await?,
            None => None,
        };
        let schedule: Option<Schedule> = match &session {
            Some(session) => self.schedule_of(session).await?,
            None => None,
        };
        let shift_end = session
            .as_ref()
            .zip(schedule.as_ref())
            .map(|(session, schedule)| schedule.shift_end(session.date));

        let mut tx = self.store.begin().await?;
        let mut record = tx.lock_record(record_id).await?.ok_or_else(|| {
            AttendanceError::reject(ErrorCode::RecordNotFound, format!("Attendance record {record_id} not found"))
        })?;
        if record.time_out.is_some() {
            return Err(AttendanceError::reject(
                ErrorCode::AlreadyCheckedOut,
                "You have already checked out",
            ));
        }
        if record.time_in.is_none() {
            return Err(AttendanceError::reject(ErrorCode::NotCheckedIn, "You are not checked in"));
        }

        let mut entries = tx.breaks_for(record.id).await?;
        let mut closed = None;
        if let Some(pos) = entries.iter().position(BreakEntry::is_open) {
            let ended = finish_break(&mut record, entries.remove(pos), now, settings);
            tx.update_break(&ended.entry).await?;
            entries.insert(pos, ended.entry.clone());
            closed = Some(ended);
        }

        close_record(&mut record, &entries, shift_end, now, settings);
        tx.update_record(&record).await?;
        tx.commit().await?;

        info!(
            user_id,
            record_id,
            hours_worked = record.hours_worked,
            overtime = record.overtime_minutes,
            status = %record.status,
            "Checked out"
        );
        Ok((record, closed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::check_in::DeviceContext;
    use crate::engine::testing::{TestEngine, at, day, engine, session};
    use crate::model::schedule::schedule;
    use crate::settings::OvertimeRounding;

    async fn checked_in(engine: &TestEngine, hours: (&str, &str), date: &str, time_in: &str) -> AttendanceRecord {
        let s = session(engine, schedule(1, hours.0, hours.1), date).await;
        engine
            .confirm(7, s.id, at(time_in), DeviceContext::default())
            .await
            .unwrap()
    }

    #[test]
    fn worked_minutes_folds_midnight() {
        assert_eq!(worked_minutes(at("2026-03-02 21:50"), at("2026-03-03 06:10")), 500);
        assert_eq!(worked_minutes(at("2026-03-02 09:00"), at("2026-03-02 17:30")), 510);
        assert_eq!(worked_minutes(at("2026-03-02 09:00"), at("2026-03-02 08:00")), 1380);
        assert_eq!(hours_from_minutes(500), 8.33);
        assert_eq!(hours_from_minutes(-10), 0.0);
    }

    #[test]
    fn overtime_respects_minimum_and_rounding() {
        let end = at("2026-03-02 17:00");
        let settings = Settings::default();
        assert_eq!(overtime_minutes(end, at("2026-03-02 16:00"), &settings), 0);
        assert_eq!(overtime_minutes(end, at("2026-03-02 17:59"), &settings), 0);
        assert_eq!(overtime_minutes(end, at("2026-03-02 18:20"), &settings), 75);

        let up = Settings {
            ot_rounding: OvertimeRounding::Up(30),
            ..Settings::default()
        };
        assert_eq!(overtime_minutes(end, at("2026-03-02 18:20"), &up), 90);
    }

    #[tokio::test]
    async fn overnight_shift_hours() {
        let engine = engine(&[]);
        let record = checked_in(&engine, ("22:00", "06:00"), "2026-03-02", "2026-03-02 21:50").await;

        let closed = engine.check_out(7, record.id, at("2026-03-03 06:10")).await.unwrap();
        assert_eq!(closed.hours_worked, 8.33);
        assert_eq!(closed.status, AttendanceStatus::Present);
        assert_eq!(closed.overtime_minutes, 0);
        assert_eq!(closed.overtime_status, OvertimeStatus::None);
        assert_eq!(engine.events().names(), vec!["attendance_updated", "attendance_updated"]);

        let engine = super::super::testing::engine(&[]);
        let record = checked_in(&engine, ("22:00", "06:00"), "2026-03-02", "2026-03-02 21:50").await;
        engine.start_break(7, "", at("2026-03-03 01:30")).await.unwrap();
        engine.end_break(7, at("2026-03-03 02:00")).await.unwrap();

        let closed = engine.check_out(7, record.id, at("2026-03-03 06:10")).await.unwrap();
        assert_eq!(closed.attendance_date, day("2026-03-02"));
        assert_eq!(closed.hours_worked, 7.83);
    }

    #[tokio::test]
    async fn double_check_out_is_rejected() {
        let engine = engine(&[]);
        let record = checked_in(&engine, ("09:00", "17:00"), "2026-03-02", "2026-03-02 09:00").await;

        let first = engine.check_out(7, record.id, at("2026-03-02 17:00")).await.unwrap();
        let err = engine.check_out(7, record.id, at("2026-03-02 17:05")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyCheckedOut);

        let stored = engine.store().find_record(record.id).await.unwrap().unwrap();
        assert_eq!(stored.time_out, first.time_out);
    }

    #[tokio::test]
    async fn overtime_pending_or_approved() {
        let engine = engine(&[("allow_overtime", "true")]);
        let record = checked_in(&engine, ("09:00", "17:00"), "2026-03-02", "2026-03-02 09:00").await;
        let closed = engine.check_out(7, record.id, at("2026-03-02 18:20")).await.unwrap();
        assert_eq!(closed.overtime_minutes, 75);
        assert_eq!(closed.overtime_status, OvertimeStatus::Pending);

        let engine = super::super::testing::engine(&[
            ("allow_overtime", "true"),
            ("require_ot_approval", "false"),
            ("ot_rounding", "none"),
        ]);
        let record = checked_in(&engine, ("09:00", "17:00"), "2026-03-02", "2026-03-02 09:00").await;
        let closed = engine.check_out(7, record.id, at("2026-03-02 18:07")).await.unwrap();
        assert_eq!(closed.overtime_minutes, 67);
        assert_eq!(closed.overtime_status, OvertimeStatus::Approved);
    }

    #[tokio::test]
    async fn overtime_disabled_by_default() {
        let engine = engine(&[]);
        let record = checked_in(&engine, ("09:00", "17:00"), "2026-03-02", "2026-03-02 09:00").await;
        let closed = engine.check_out(7, record.id, at("2026-03-02 20:00")).await.unwrap();
        assert_eq!(closed.overtime_minutes, 0);
        assert_eq!(closed.hours_worked, 11.0);
    }

    #[tokio::test]
    async fn leaving_before_tolerance_is_left_early() {
        let engine = engine(&[]);
        let record = checked_in(&engine, ("09:00", "17:00"), "2026-03-02", "2026-03-02 09:00").await;
        let closed = engine.check_out(7, record.id, at("2026-03-02 16:50")).await.unwrap();
        assert_eq!(closed.status, AttendanceStatus::LeftEarly);

        let engine = super::super::testing::engine(&[]);
        let record = checked_in(&engine, ("09:00", "17:00"), "2026-03-02", "2026-03-02 09:00").await;
        let closed = engine.check_out(7, record.id, at("2026-03-02 16:56")).await.unwrap();
        assert_eq!(closed.status, AttendanceStatus::Present);
    }

    #[tokio::test]
    async fn running_break_is_closed_and_deducted() {
        let engine = engine(&[]);
        let record = checked_in(&engine, ("09:00", "17:00"), "2026-03-02", "2026-03-02 09:00").await;
        engine.start_break(7, "", at("2026-03-02 12:00")).await.unwrap();

        let closed = engine.check_out(7, record.id, at("2026-03-02 12:40")).await.unwrap();
        assert_eq!(closed.hours_worked, 3.0);
        assert_eq!(closed.break_end, Some(at("2026-03-02 12:40")));

        let breaks = engine.store().breaks_for(record.id).await.unwrap();
        assert_eq!(breaks.len(), 1);
        assert_eq!(breaks[0].duration_minutes, 40);
        assert_eq!(
            engine.events().names(),
            vec!["attendance_updated", "break_updated", "break_updated", "attendance_updated"]
        );
    }

    #[tokio::test]
    async fn foreign_missing_and_stale_records() {
        let engine = engine(&[]);
        let record = checked_in(&engine, ("09:00", "17:00"), "2026-03-02", "2026-03-02 09:00").await;

        let err = engine.check_out(8, record.id, at("2026-03-02 17:00")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RecordNotFound);
        let err = engine.check_out(7, 999, at("2026-03-02 17:00")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RecordNotFound);

        let mut stale = AttendanceRecord::placeholder(7, None, day("2026-02-20"));
        stale.time_in = Some(at("2026-02-20 09:00"));
        stale.status = AttendanceStatus::Present;
        let stale = engine.store().add_record(stale).await;
        let err = engine.check_out(7, stale.id, at("2026-03-02 17:00")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RecordTooOld);
    }

    #[tokio::test]
    async fn placeholder_cannot_be_checked_out() {
        let engine = engine(&[]);
        let absent = engine
            .store()
            .add_record(AttendanceRecord::placeholder(7, None, day("2026-03-02")))
            .await;
        let err = engine.check_out(7, absent.id, at("2026-03-02 17:00")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotCheckedIn);
    }

    #[tokio::test]
    async fn excused_record_never_becomes_left_early() {
        let engine = engine(&[]);
        let s = session(&engine, schedule(1, "09:00", "17:00"), "2026-03-02").await;
        let mut excused = AttendanceRecord::placeholder(7, Some(s.id), s.date);
        excused.time_in = Some(at("2026-03-02 09:00"));
        excused.status = AttendanceStatus::Excused;
        let excused = engine.store().add_record(excused).await;

        let closed = engine.check_out(7, excused.id, at("2026-03-02 12:00")).await.unwrap();
        assert_eq!(closed.status, AttendanceStatus::Excused);
    }
}
