use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use super::{
    AttendanceEngine,
    logical_day::{LogicalDayResolver, current_record},
    window::BreakWindow,
};
use crate::{
    error::{AttendanceError, AttendanceResult, ErrorCode},
    events::{AttendanceEvent, BreakAction, EventSink},
    model::{
        attendance::AttendanceRecord,
        break_entry::{BreakEntry, used_minutes},
    },
    settings::Settings,
    store::{AttendanceStore, AttendanceTx, SettingsStore},
};

const UNTYPED_BREAK: &str = "break";

/// Where a running break stands at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakState {
    Running { remaining_seconds: i64 },
    /// The segment cap has been used up; the break ends at `ends_at`.
    Expired { ends_at: NaiveDateTime },
}

pub fn derive_break(entry: &BreakEntry, now: NaiveDateTime) -> BreakState {
    let ends_at = entry.entitled_end();
    let remaining_seconds = (ends_at - now).num_seconds();
    if remaining_seconds <= 0 {
        BreakState::Expired { ends_at }
    } else {
        BreakState::Running { remaining_seconds }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BreakStatus {
    pub attendance_id: Option<u64>,
    pub on_break: bool,
    pub current: Option<BreakEntry>,
    /// Seconds left in the running segment.
    pub remaining_seconds: Option<i64>,
    pub used_minutes: i64,
    /// Minutes left under the daily cap.
    pub remaining_minutes: i64,
    /// True when this read closed an expired break.
    pub auto_ended: bool,
    pub breaks: Vec<BreakEntry>,
}

impl BreakStatus {
    fn idle(settings: &Settings) -> Self {
        Self {
            attendance_id: None,
            on_break: false,
            current: None,
            remaining_seconds: None,
            used_minutes: 0,
            remaining_minutes: settings.break_duration,
            auto_ended: false,
            breaks: Vec::new(),
        }
    }
}

pub(crate) struct ClosedBreak {
    pub entry: BreakEntry,
    pub excess_minutes: i64,
}

/// Closes `entry` at `ended_at`, applying the overrun penalty when enabled.
pub(crate) fn finish_break(
    record: &mut AttendanceRecord,
    mut entry: BreakEntry,
    ended_at: NaiveDateTime,
    settings: &Settings,
) -> ClosedBreak {
    // Absolute so a segment straddling a rollover never goes negative.
    let duration = (ended_at - entry.break_start).num_minutes().abs();
    let excess_minutes = (duration - entry.duration_limit).max(0);

    entry.break_end = Some(ended_at);
    entry.duration_minutes = duration;
    if excess_minutes > 0 && settings.break_penalty {
        entry.penalty_minutes = excess_minutes;
        record.append_note(&format!(
            "Break penalty: {} break exceeded its {} min allowance by {} min",
            entry.break_type, entry.duration_limit, excess_minutes
        ));
    }
    record.break_end = Some(ended_at);

    ClosedBreak {
        entry,
        excess_minutes,
    }
}

/// Checks the allowance rules for a new break and returns its stored type
/// name and segment cap.
fn allowance(settings: &Settings, entries: &[BreakEntry], break_type: &str) -> AttendanceResult<(String, i64)> {
    if entries.iter().any(BreakEntry::is_open) {
        return Err(AttendanceError::reject(ErrorCode::AlreadyOnBreak, "You are already on a break"));
    }

    if settings.max_breaks > 0 && entries.len() >= settings.max_breaks as usize {
        return Err(AttendanceError::reject(
            ErrorCode::BreakLimitReached,
            format!("Only {} breaks are allowed per shift", settings.max_breaks),
        ));
    }

    let used = used_minutes(entries);

    if settings.has_typed_breaks() {
        let allowance = settings.allowance_for(break_type).ok_or_else(|| {
            AttendanceError::reject(ErrorCode::InvalidBreakType, format!("Unknown break type `{break_type}`"))
        })?;
        if entries.iter().any(|e| e.break_type == allowance.name) {
            return Err(AttendanceError::reject(
                ErrorCode::BreakTypeUsed,
                format!("The {} break has already been taken", allowance.name),
            ));
        }
        if used + allowance.limit_minutes > settings.break_duration {
            return Err(AttendanceError::reject(
                ErrorCode::BreakLimitReached,
                format!("Daily break allowance of {} min would be exceeded", settings.break_duration),
            ));
        }
        return Ok((allowance.name.clone(), allowance.limit_minutes));
    }

    let remaining = settings.break_duration - used;
    if remaining <= 0 {
        return Err(AttendanceError::reject(
            ErrorCode::BreakLimitReached,
            format!("Daily break allowance of {} min has been used", settings.break_duration),
        ));
    }
    let name = match break_type.trim() {
        "" => UNTYPED_BREAK.to_string(),
        other => other.to_ascii_lowercase(),
    };
    Ok((name, remaining))
}

fn log_failure(op: &'static str, user_id: u64) -> impl Fn(&AttendanceError) {
    move |e| {
        if let AttendanceError::System(err) = e {
            error!(user_id, error = %err, "{op} rolled back");
        }
    }
}

impl<S, K, E> AttendanceEngine<S, K, E>
where
    S: AttendanceStore,
    K: SettingsStore,
    E: EventSink,
{
    /// The record a break or check-out acts on: the caller's open record.
    async fn working_record(&self, user_id: u64, now: NaiveDateTime, settings: &Settings) -> AttendanceResult<AttendanceRecord> {
        let today = LogicalDayResolver::from_settings(settings).resolve(now);
        match current_record(&self.store, user_id, today).await? {
            Some(record) if record.is_open() => Ok(record),
            Some(record) if record.is_closed() => Err(AttendanceError::reject(
                ErrorCode::AlreadyCheckedOut,
                "You have already checked out",
            )),
            _ => Err(AttendanceError::reject(ErrorCode::NotCheckedIn, "You are not checked in")),
        }
    }

    pub async fn start_break(
        &self,
        user_id: u64,
        break_type: &str,
        now: NaiveDateTime,
    ) -> AttendanceResult<BreakEntry> {
        let (record, entry) = self
            .start_break_inner(user_id, break_type, now)
            .await
            .inspect_err(log_failure("Break start", user_id))?;

        self.events
            .publish(AttendanceEvent::BreakUpdated {
                action: BreakAction::Started,
                record,
                entry: entry.clone(),
            })
            .await;
        Ok(entry)
    }

    async fn start_break_inner(
        &self,
        user_id: u64,
        break_type: &str,
        now: NaiveDateTime,
    ) -> AttendanceResult<(AttendanceRecord, BreakEntry)> {
        let settings = self.settings().await?;
        let record = self.working_record(user_id, now, &settings).await?;

        let session = match record.session_id {
            Some(id) => self.store.find_session(id).await?,
            None => None,
        };
        let schedule = match &session {
            Some(session) => self.schedule_of(session).await?,
            None => None,
        };
        let anchor = session.as_ref().map_or(record.attendance_date, |s| s.date);
        if let Some(window) = BreakWindow::resolve(&settings, anchor, schedule.as_ref()) {
            window.check(now)?;
        }

        let mut tx = self.store.begin().await?;
        let mut record = tx
            .lock_record(record.id)
            .await?
            .ok_or_else(|| AttendanceError::reject(ErrorCode::NotCheckedIn, "You are not checked in"))?;
        if record.time_out.is_some() {
            return Err(AttendanceError::reject(
                ErrorCode::AlreadyCheckedOut,
                "You have already checked out",
            ));
        }

        let entries = tx.breaks_for(record.id).await?;
        let (name, limit) = allowance(&settings, &entries, break_type)?;

        let mut entry = BreakEntry::start(record.id, &name, now, limit);
        entry.id = tx.insert_break(&entry).await?;
        record.break_start = Some(now);
        record.break_end = None;
        tx.update_record(&record).await?;
        tx.commit().await?;

        info!(user_id, record_id = record.id, break_type = %name, limit, "Break started");
        Ok((record, entry))
    }

    pub async fn end_break(&self, user_id: u64, now: NaiveDateTime) -> AttendanceResult<BreakEntry> {
        let settings = self.settings().await?;
        let (record, closed) = self
            .end_break_inner(user_id, now, &settings)
            .await
            .inspect_err(log_failure("Break end", user_id))?;

        self.announce_break_end(&record, &closed, &settings).await;
        Ok(closed.entry)
    }

    async fn end_break_inner(
        &self,
        user_id: u64,
        now: NaiveDateTime,
        settings: &Settings,
    ) -> AttendanceResult<(AttendanceRecord, ClosedBreak)> {
        let record = self.working_record(user_id, now, settings).await?;

        let mut tx = self.store.begin().await?;
        let mut record = tx
            .lock_record(record.id)
            .await?
            .ok_or_else(|| AttendanceError::reject(ErrorCode::NotCheckedIn, "You are not checked in"))?;
        if record.time_out.is_some() {
            return Err(AttendanceError::reject(
                ErrorCode::AlreadyCheckedOut,
                "You have already checked out",
            ));
        }

        let open = tx
            .breaks_for(record.id)
            .await?
            .into_iter()
            .find(BreakEntry::is_open)
            .ok_or_else(|| AttendanceError::reject(ErrorCode::NotOnBreak, "You are not on a break"))?;

        let closed = finish_break(&mut record, open, now, settings);
        tx.update_break(&closed.entry).await?;
        tx.update_record(&record).await?;
        tx.commit().await?;

        info!(
            user_id,
            record_id = record.id,
            duration = closed.entry.duration_minutes,
            excess = closed.excess_minutes,
            "Break ended"
        );
        Ok((record, closed))
    }

    /// Emits break-ended and, on overrun with alerts on, break-exceeded.
    pub(crate) async fn announce_break_end(
        &self,
        record: &AttendanceRecord,
        closed: &ClosedBreak,
        settings: &Settings,
    ) {
        self.events
            .publish(AttendanceEvent::BreakUpdated {
                action: BreakAction::Ended,
                record: record.clone(),
                entry: closed.entry.clone(),
            })
            .await;

        if closed.excess_minutes > 0 && settings.break_alerts {
            warn!(
                user_id = record.user_id,
                record_id = record.id,
                excess = closed.excess_minutes,
                "Break allowance exceeded"
            );
            self.events
                .publish(AttendanceEvent::BreakExceeded {
                    user_id: record.user_id,
                    record_id: record.id,
                    break_type: closed.entry.break_type.clone(),
                    excess_minutes: closed.excess_minutes,
                })
                .await;
        }
    }

    /// Current break state for the user. An open break whose segment cap has
    /// run out is closed at its entitled end before the status is built.
    pub async fn break_status(&self, user_id: u64, now: NaiveDateTime) -> AttendanceResult<BreakStatus> {
        let settings = self.settings().await?;
        let today = LogicalDayResolver::from_settings(&settings).resolve(now);

        let Some(record) = current_record(&self.store, user_id, today).await? else {
            return Ok(BreakStatus::idle(&settings));
        };

        let mut entries = self.store.breaks_for(record.id).await?;
        let mut auto_ended = false;

        let expired = entries
            .iter()
            .find(|e| e.is_open())
            .and_then(|open| match derive_break(open, now) {
                BreakState::Expired { ends_at } => Some((open.id, ends_at)),
                BreakState::Running { .. } => None,
            });
        if let (true, Some((entry_id, ends_at))) = (settings.auto_resume, expired) {
            auto_ended = self
                .auto_end_break(record.id, entry_id, ends_at, &settings)
                .await
                .inspect_err(log_failure("Break auto-end", user_id))?;
            if auto_ended {
                entries = self.store.breaks_for(record.id).await?;
            }
        }

        let current = entries.iter().find(|e| e.is_open()).cloned();
        let remaining_seconds = current.as_ref().map(|entry| match derive_break(entry, now) {
            BreakState::Running { remaining_seconds } => remaining_seconds,
            BreakState::Expired { .. } => 0,
        });
        let used = used_minutes(&entries);

        Ok(BreakStatus {
            attendance_id: Some(record.id),
            on_break: current.is_some(),
            current,
            remaining_seconds,
            used_minutes: used,
            remaining_minutes: (settings.break_duration - used).max(0),
            auto_ended,
            breaks: entries,
        })
    }

    /// Closes the break at `ends_at` if it is still open. Returns whether a
    /// break was closed.
    async fn auto_end_break(
        &self,
        record_id: u64,
        entry_id: u64,
        ends_at: NaiveDateTime,
        settings: &Settings,
    ) -> AttendanceResult<bool> {
        let mut tx = self.store.begin().await?;
        let Some(mut record) = tx.lock_record(record_id).await? else {
            return Ok(false);
        };
        let Some(entry) = tx
            .breaks_for(record_id)
            .await?
            .into_iter()
            .find(|e| e.id == entry_id && e.is_open())
        else {
            return Ok(false);
        };

        let closed = finish_break(&mut record, entry, ends_at, settings);
        tx.update_break(&closed.entry).await?;
        tx.update_record(&record).await?;
        tx.commit().await?;

        info!(
            user_id = record.user_id,
            record_id,
            ended_at = %ends_at,
            "Break auto-ended at its allowance"
        );
        self.announce_break_end(&record, &closed, settings).await;
        Ok(true)
    }
}
