use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;

use super::{AttendanceEngine, window::CheckInWindow};
use crate::{
    error::{AttendanceError, AttendanceResult, ErrorCode},
    events::{AttendanceEvent, EventSink, RecordAction},
    model::{
        attendance::{AttendanceRecord, AttendanceStatus},
        schedule::Schedule,
        session::ShiftSession,
    },
    settings::Settings,
    store::{AttendanceStore, AttendanceTx, SettingsStore},
};

/// Where and from what a check-in was made.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct DeviceContext {
    #[schema(example = "Android 14 / Chrome 128")]
    pub device_info: Option<String>,
    #[schema(example = "10.0.0.12")]
    pub ip_address: Option<String>,
    #[schema(example = "23.8103,90.4125")]
    pub location: Option<String>,
}

/// Answer to "would `confirm` succeed right now?".
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConfirmCheck {
    pub allowed: bool,
    pub code: Option<ErrorCode>,
    pub message: String,
    pub window: Option<CheckInWindow>,
    /// Status the record would get if confirmed now.
    pub expected_status: Option<AttendanceStatus>,
}

#[derive(Debug)]
enum CheckInPlan {
    Create,
    /// Fill a pending/absent placeholder instead of adding a row.
    Fill(AttendanceRecord),
}

/// Decides what a check-in does given the record already filed for this
/// session/day and the user's open record, if any.
fn plan_check_in(
    existing: Option<AttendanceRecord>,
    open: Option<&AttendanceRecord>,
    settings: &Settings,
) -> AttendanceResult<CheckInPlan> {
    if let Some(open) = open {
        return Err(AttendanceError::reject(
            ErrorCode::CurrentlyCheckedIn,
            format!("Already checked in since {}", checked_in_at(open)),
        ));
    }

    match existing {
        None => Ok(CheckInPlan::Create),
        Some(record) if record.status.is_placeholder() && record.time_out.is_none() => {
            Ok(CheckInPlan::Fill(record))
        }
        // Anything without a check-out is still running, excused rows included.
        Some(record) if record.time_out.is_none() => Err(AttendanceError::reject(
            ErrorCode::CurrentlyCheckedIn,
            format!("Already checked in since {}", checked_in_at(&record)),
        )),
        // Multi check-in never overwrites a finished record.
        Some(record) if settings.allow_multi_checkin && record.is_closed() => Ok(CheckInPlan::Create),
        Some(_) => Err(AttendanceError::reject(
            ErrorCode::AlreadyCheckedInToday,
            "Attendance for this day has already been recorded",
        )),
    }
}

fn checked_in_at(record: &AttendanceRecord) -> String {
    record
        .time_in
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "an earlier check-in".to_string())
}

fn stamp_check_in(
    record: &mut AttendanceRecord,
    session: &ShiftSession,
    now: NaiveDateTime,
    (status, minutes_late): (AttendanceStatus, i64),
    device: DeviceContext,
) {
    record.session_id = Some(session.id);
    record.time_in = Some(now);
    record.time_out = None;
    record.status = status;
    record.minutes_late = minutes_late;
    record.device_info = device.device_info;
    record.ip_address = device.ip_address;
    record.location = device.location;
}

impl<S, K, E> AttendanceEngine<S, K, E>
where
    S: AttendanceStore,
    K: SettingsStore,
    E: EventSink,
{
    /// Resolves a session that accepts check-ins, together with its schedule.
    async fn confirmable_session(&self, session_id: u64) -> AttendanceResult<(ShiftSession, Schedule)> {
        let session = self.store.find_session(session_id).await?.ok_or_else(|| {
            AttendanceError::reject(ErrorCode::SessionNotFound, format!("Session {session_id} not found"))
        })?;

        if session.is_locked() {
            return Err(AttendanceError::reject(
                ErrorCode::SessionLocked,
                "This session has been locked by an administrator",
            ));
        }

        let schedule = self.schedule_of(&session).await?.ok_or_else(|| {
            AttendanceError::reject(ErrorCode::NoSchedule, "This session has no schedule attached")
        })?;

        Ok((session, schedule))
    }

    /// Checks the user into a session.
    ///
    /// Serialized per user by a named lock; the record itself is read and
    /// written under row locks in a single transaction.
    pub async fn confirm(
        &self,
        user_id: u64,
        session_id: u64,
        now: NaiveDateTime,
        device: DeviceContext,
    ) -> AttendanceResult<AttendanceRecord> {
        let Some(_guard) = self.locks.try_acquire(user_id) else {
            warn!(user_id, session_id, "Check-in already in progress");
            return Err(AttendanceError::reject(
                ErrorCode::Processing,
                "A check-in for this user is already being processed",
            ));
        };

        let record = self
            .confirm_locked(user_id, session_id, now, device)
            .await
            .inspect_err(|e| {
                if let AttendanceError::System(err) = e {
                    error!(user_id, session_id, error = %err, "Check-in rolled back");
                }
            })?;

        self.events
            .publish(AttendanceEvent::AttendanceUpdated {
                action: RecordAction::Confirmed,
                record: record.clone(),
            })
            .await;

        Ok(record)
    }

    async fn confirm_locked(
        &self,
        user_id: u64,
        session_id: u64,
        now: NaiveDateTime,
        device: DeviceContext,
    ) -> AttendanceResult<AttendanceRecord> {
        let settings = self.settings().await?;
        let (session, schedule) = self.confirmable_session(session_id).await?;

        // Anchored to the session date so a 04:00 check-in for last night's
        // session is filed under last night.
        let window = CheckInWindow::new(&schedule, session.date, schedule.grace_minutes(settings.grace_period));
        window.check(now)?;

        let mut tx = self.store.begin().await?;

        let existing = match tx.lock_record_for_session(user_id, session.id).await? {
            Some(record) => Some(record),
            None if settings.prevent_duplicate_checkin => {
                tx.lock_record_on(user_id, session.date).await?
            }
            None => None,
        };
        let open = tx.lock_open_record(user_id).await?;
        let plan = plan_check_in(existing, open.as_ref(), &settings)?;

        let verdict = window.classify(now);
        let record = match plan {
            CheckInPlan::Create => {
                let mut record = AttendanceRecord::placeholder(user_id, Some(session.id), session.date);
                stamp_check_in(&mut record, &session, now, verdict, device);
                record.id = tx.insert_record(&record).await?;
                record
            }
            CheckInPlan::Fill(mut record) => {
                stamp_check_in(&mut record, &session, now, verdict, device);
                tx.update_record(&record).await?;
                record
            }
        };

        tx.commit().await?;

        info!(
            user_id,
            session_id,
            record_id = record.id,
            status = %record.status,
            minutes_late = record.minutes_late,
            "Checked in"
        );
        Ok(record)
    }

    /// Read-only dry run of [`confirm`](Self::confirm): no lock, no
    /// transaction, nothing written.
    pub async fn can_confirm(
        &self,
        user_id: u64,
        session_id: u64,
        now: NaiveDateTime,
    ) -> AttendanceResult<ConfirmCheck> {
        let settings = self.settings().await?;
        let (window, verdict) = self.evaluate_confirm(&settings, user_id, session_id, now).await;

        match verdict {
            Ok(status) => Ok(ConfirmCheck {
                allowed: true,
                code: None,
                message: "Check-in is open".to_string(),
                window,
                expected_status: Some(status),
            }),
            Err(AttendanceError::Rejected { code, message }) => Ok(ConfirmCheck {
                allowed: false,
                code: Some(code),
                message,
                window,
                expected_status: None,
            }),
            Err(e) => Err(e),
        }
    }

    async fn evaluate_confirm(
        &self,
        settings: &Settings,
        user_id: u64,
        session_id: u64,
        now: NaiveDateTime,
    ) -> (Option<CheckInWindow>, AttendanceResult<AttendanceStatus>) {
        let (session, schedule) = match self.confirmable_session(session_id).await {
            Ok(found) => found,
            Err(e) => return (None, Err(e)),
        };
        let window = CheckInWindow::new(&schedule, session.date, schedule.grace_minutes(settings.grace_period));

        let verdict = async {
            window.check(now)?;
            let existing = match self.store.find_record_for_session(user_id, session.id).await? {
                Some(record) => Some(record),
                None if settings.prevent_duplicate_checkin => {
                    self.store.find_record_on(user_id, session.date).await?
                }
                None => None,
            };
            let open = self.store.find_open_record(user_id).await?;
            plan_check_in(existing, open.as_ref(), settings)?;
            Ok::<_, AttendanceError>(window.classify(now).0)
        }
        .await;

        (Some(window), verdict)
    }
}
