use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use super::{AppEngine, local_now};
use crate::{
    auth::auth::AuthUser,
    engine::{breaks::BreakStatus, check_in::{ConfirmCheck, DeviceContext}, status::TodayStatus},
};

#[derive(Deserialize, ToSchema)]
pub struct ConfirmRequest {
    #[schema(example = 41)]
    pub session_id: u64,

    #[schema(example = "Android 14 / Chrome 128")]
    pub device_info: Option<String>,

    #[schema(example = "23.8103,90.4125")]
    pub location: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CheckOutRequest {
    #[schema(example = 1207)]
    pub record_id: u64,
}

#[derive(Deserialize, ToSchema)]
pub struct StartBreakRequest {
    /// Required when typed break allowances are configured.
    #[schema(example = "coffee")]
    pub break_type: Option<String>,
}

/// Check in to a shift session
#[utoipa::path(
    post,
    path = "/api/attendance/confirm",
    request_body = ConfirmRequest,
    responses(
        (status = 200, description = "Checked in", body = Object, example = json!({
            "success": true,
            "message": "Checked in successfully",
            "data": { "id": 1207, "status": "present", "minutes_late": 0 }
        })),
        (status = 400, description = "Outside the check-in window", body = Object, example = json!({
            "success": false,
            "code": "TOO_LATE",
            "message": "Check-in closed at 2026-03-02 11:30"
        })),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Already checked in"),
        (status = 423, description = "Session locked"),
        (status = 429, description = "Another check-in is being processed"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn confirm(
    auth: AuthUser,
    req: HttpRequest,
    engine: web::Data<AppEngine>,
    body: web::Json<ConfirmRequest>,
) -> actix_web::Result<impl Responder> {
    let body = body.into_inner();
    let device = DeviceContext {
        device_info: body.device_info,
        ip_address: req.connection_info().realip_remote_addr().map(str::to_string),
        location: body.location,
    };

    let record = engine.confirm(auth.user_id, body.session_id, local_now(), device).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Checked in successfully",
        "data": record
    })))
}

/// Check out of an attendance record
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    request_body = CheckOutRequest,
    responses(
        (status = 200, description = "Checked out", body = Object, example = json!({
            "success": true,
            "message": "Checked out successfully",
            "data": { "id": 1207, "hours_worked": 8.33, "overtime_minutes": 0 }
        })),
        (status = 400, description = "Record is too old"),
        (status = 404, description = "Record not found"),
        (status = 409, description = "Already checked out or never checked in"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    engine: web::Data<AppEngine>,
    body: web::Json<CheckOutRequest>,
) -> actix_web::Result<impl Responder> {
    let record = engine.check_out(auth.user_id, body.record_id, local_now()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Checked out successfully",
        "data": record
    })))
}

/// Start a break on the current open record
#[utoipa::path(
    post,
    path = "/api/attendance/break/start",
    request_body = StartBreakRequest,
    responses(
        (status = 200, description = "Break started"),
        (status = 400, description = "Outside the break window, unknown type or allowance used up"),
        (status = 409, description = "Not checked in or already on a break"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn start_break(
    auth: AuthUser,
    engine: web::Data<AppEngine>,
    body: web::Json<StartBreakRequest>,
) -> actix_web::Result<impl Responder> {
    let break_type = body.break_type.as_deref().unwrap_or_default();
    let entry = engine.start_break(auth.user_id, break_type, local_now()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Break started",
        "data": entry
    })))
}

/// End the running break
#[utoipa::path(
    post,
    path = "/api/attendance/break/end",
    responses(
        (status = 200, description = "Break ended"),
        (status = 409, description = "Not on a break"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn end_break(auth: AuthUser, engine: web::Data<AppEngine>) -> actix_web::Result<impl Responder> {
    let entry = engine.end_break(auth.user_id, local_now()).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Break ended",
        "data": entry
    })))
}

/// Current break state; closes a break whose allowance has run out
#[utoipa::path(
    get,
    path = "/api/attendance/break/status",
    responses(
        (status = 200, description = "Break status", body = BreakStatus),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn break_status(auth: AuthUser, engine: web::Data<AppEngine>) -> actix_web::Result<impl Responder> {
    let status = engine.break_status(auth.user_id, local_now()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": status })))
}

/// Whether checking in to a session would succeed right now
#[utoipa::path(
    get,
    path = "/api/attendance/can-confirm/{session_id}",
    params(
        ("session_id" = u64, Path, description = "Session to check in to")
    ),
    responses(
        (status = 200, description = "Dry-run result", body = ConfirmCheck),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn can_confirm(
    auth: AuthUser,
    engine: web::Data<AppEngine>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let check = engine.can_confirm(auth.user_id, path.into_inner(), local_now()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": check })))
}

/// Today's record, break state and sessions
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Attendance for the current logical day", body = TodayStatus),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn today(auth: AuthUser, engine: web::Data<AppEngine>) -> actix_web::Result<impl Responder> {
    let status = engine.today_status(auth.user_id, local_now()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": status })))
}
