use crate::api::attendance::{CheckOutRequest, ConfirmRequest, StartBreakRequest};
use crate::api::sessions::CreateSessionRequest;
use crate::engine::{breaks::BreakStatus, check_in::ConfirmCheck, status::TodayStatus, window::CheckInWindow};
use crate::error::ErrorCode;
use crate::model::{
    attendance::{AttendanceRecord, AttendanceStatus, OvertimeStatus},
    break_entry::BreakEntry,
    schedule::Schedule,
    session::{SessionStatus, ShiftSession},
};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shift Attendance API",
        version = "1.0.0",
        description = r#"
## Shift Attendance

Check-in, break and check-out tracking for shift-based work, including
overnight shifts.

### Key Features
- **Shift sessions**
  - One session per schedule and date, advanced pending → active → completed
  - Administrators can create, lock, unlock and delete sessions
- **Check-in**
  - Window from 5 h before to 2.5 h after shift start, grace period for lateness
  - One open record per employee, serialized per user
- **Breaks**
  - Daily cap, optional typed allowances, automatic end when an allowance runs out
- **Check-out**
  - Hours worked net of breaks, overtime with rounding, early-leave detection

### Errors
Every rejection carries a machine-readable `code` such as `TOO_LATE` or
`CURRENTLY_CHECKED_IN` next to a human-readable `message`.

### Security
All endpoints require a **JWT Bearer** access token. Session administration
is limited to Admin and HR.
"#,
    ),
    paths(
        crate::api::attendance::confirm,
        crate::api::attendance::check_out,
        crate::api::attendance::start_break,
        crate::api::attendance::end_break,
        crate::api::attendance::break_status,
        crate::api::attendance::can_confirm,
        crate::api::attendance::today,

        crate::api::sessions::list_sessions,
        crate::api::sessions::create_session,
        crate::api::sessions::lock_session,
        crate::api::sessions::unlock_session,
        crate::api::sessions::delete_session,
        crate::api::sessions::sync_sessions,
        crate::api::sessions::refresh_settings
    ),
    components(
        schemas(
            ConfirmRequest,
            CheckOutRequest,
            StartBreakRequest,
            CreateSessionRequest,
            AttendanceRecord,
            AttendanceStatus,
            OvertimeStatus,
            BreakEntry,
            BreakStatus,
            ConfirmCheck,
            CheckInWindow,
            TodayStatus,
            Schedule,
            ShiftSession,
            SessionStatus,
            ErrorCode
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Check-in, breaks and check-out"),
        (name = "Sessions", description = "Shift session administration"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_bodies_point_at_registered_schemas() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let schema_ref = |path: &str, method: &str| {
            doc["paths"][path][method]["responses"]["200"]["content"]["application/json"]["schema"].clone()
        };

        assert_eq!(schema_ref("/api/attendance/today", "get")["$ref"], "#/components/schemas/TodayStatus");
        assert_eq!(
            schema_ref("/api/attendance/break/status", "get")["$ref"],
            "#/components/schemas/BreakStatus"
        );
        assert_eq!(
            schema_ref("/api/sessions", "get")["items"]["$ref"],
            "#/components/schemas/ShiftSession"
        );
        for name in ["TodayStatus", "BreakStatus", "ConfirmCheck", "ShiftSession"] {
            assert!(doc["components"]["schemas"][name].is_object(), "{name} registered");
        }
    }
}
