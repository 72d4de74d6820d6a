use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use utoipa::ToSchema;

use crate::store::StoreError;

/// Machine-readable reason attached to every rejected attendance action.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Display, AsRefStr, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TooEarly,
    TooLate,
    CurrentlyCheckedIn,
    AlreadyCheckedInToday,
    AlreadyCheckedOut,
    AlreadyOnBreak,
    NotOnBreak,
    NotCheckedIn,
    BreakLimitReached,
    BreakTypeUsed,
    InvalidBreakType,
    Processing,
    SessionNotFound,
    SessionLocked,
    SessionExists,
    NoSchedule,
    RecordNotFound,
    RecordTooOld,
    SystemError,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::TooEarly
            | ErrorCode::TooLate
            | ErrorCode::BreakLimitReached
            | ErrorCode::BreakTypeUsed
            | ErrorCode::InvalidBreakType
            | ErrorCode::RecordTooOld
            | ErrorCode::NoSchedule => StatusCode::BAD_REQUEST,
            ErrorCode::SessionNotFound | ErrorCode::RecordNotFound => StatusCode::NOT_FOUND,
            ErrorCode::CurrentlyCheckedIn
            | ErrorCode::AlreadyCheckedInToday
            | ErrorCode::AlreadyCheckedOut
            | ErrorCode::AlreadyOnBreak
            | ErrorCode::NotOnBreak
            | ErrorCode::NotCheckedIn
            | ErrorCode::SessionExists => StatusCode::CONFLICT,
            ErrorCode::SessionLocked => StatusCode::LOCKED,
            ErrorCode::Processing => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::SystemError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    /// The action was refused by a window, allowance or state rule.
    #[error("{message}")]
    Rejected { code: ErrorCode, message: String },

    /// The store failed; any open transaction has been rolled back.
    #[error("attendance store failure: {0}")]
    System(#[from] StoreError),
}

pub type AttendanceResult<T> = Result<T, AttendanceError>;

impl AttendanceError {
    pub fn reject(code: ErrorCode, message: impl Into<String>) -> Self {
        AttendanceError::Rejected {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AttendanceError::Rejected { code, .. } => *code,
            AttendanceError::System(_) => ErrorCode::SystemError,
        }
    }
}

impl ResponseError for AttendanceError {
    fn status_code(&self) -> StatusCode {
        self.code().status()
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AttendanceError::Rejected { message, .. } => message.clone(),
            AttendanceError::System(e) => {
                tracing::error!(error = %e, "Attendance operation failed");
                "Internal Server Error".to_string()
            }
        };

        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "success": false,
            "code": self.code(),
            "message": message,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_render_screaming_snake_case() {
        assert_eq!(ErrorCode::AlreadyCheckedInToday.as_ref(), "ALREADY_CHECKED_IN_TODAY");
        assert_eq!(
            serde_json::to_value(ErrorCode::RecordTooOld).unwrap(),
            serde_json::json!("RECORD_TOO_OLD")
        );
    }

    #[test]
    fn contention_is_retryable_status() {
        let err = AttendanceError::reject(ErrorCode::Processing, "busy");
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.to_string(), "busy");
    }

    #[test]
    fn store_failures_surface_as_system_error() {
        let decode = StoreError::from(sqlx::Error::Decode("bad status".into()));
        assert!(matches!(decode, StoreError::Corrupt(_)));
        let err = AttendanceError::from(decode);
        assert_eq!(err.code(), ErrorCode::SystemError);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
