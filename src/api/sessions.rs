use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use super::{AppEngine, local_now};
use crate::auth::auth::AuthUser;
use crate::model::session::ShiftSession;

#[derive(Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    #[schema(example = 3)]
    pub schedule_id: u64,

    #[schema(example = "2026-03-02", value_type = String, format = "date")]
    pub date: NaiveDate,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SessionQuery {
    /// Defaults to the current logical day.
    #[param(value_type = Option<String>, example = "2026-03-02")]
    pub date: Option<NaiveDate>,
}

/* =========================
List sessions (Admin/HR)
========================= */
#[utoipa::path(
    get,
    path = "/api/sessions",
    params(SessionQuery),
    responses(
        (status = 200, description = "Sessions of the day, statuses synchronized", body = [ShiftSession]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Sessions"
)]
pub async fn list_sessions(
    auth: AuthUser,
    engine: web::Data<AppEngine>,
    query: web::Query<SessionQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let sessions = engine.sessions_for_day(local_now(), query.date).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": sessions })))
}

/* =========================
Create session (Admin/HR)
========================= */
#[utoipa::path(
    post,
    path = "/api/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = ShiftSession),
        (status = 400, description = "Schedule not found"),
        (status = 409, description = "A session already exists for this schedule and date"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Sessions"
)]
pub async fn create_session(
    auth: AuthUser,
    engine: web::Data<AppEngine>,
    body: web::Json<CreateSessionRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let session = engine.create_session(body.schedule_id, body.date, local_now()).await?;
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Session created",
        "data": session
    })))
}

/* =========================
Lock / unlock (Admin/HR)
========================= */
#[utoipa::path(
    put,
    path = "/api/sessions/{session_id}/lock",
    params(
        ("session_id" = u64, Path, description = "Session to lock")
    ),
    responses(
        (status = 200, description = "Session locked", body = ShiftSession),
        (status = 404, description = "Session not found"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Sessions"
)]
pub async fn lock_session(
    auth: AuthUser,
    engine: web::Data<AppEngine>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let session = engine.lock_session(path.into_inner(), local_now()).await?;
    info!(session_id = session.id, by = %auth.username, "Lock requested");
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Session locked",
        "data": session
    })))
}

#[utoipa::path(
    put,
    path = "/api/sessions/{session_id}/unlock",
    params(
        ("session_id" = u64, Path, description = "Session to unlock")
    ),
    responses(
        (status = 200, description = "Session unlocked and its status re-derived", body = ShiftSession),
        (status = 404, description = "Session not found"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Sessions"
)]
pub async fn unlock_session(
    auth: AuthUser,
    engine: web::Data<AppEngine>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let session = engine.unlock_session(path.into_inner(), local_now()).await?;
    info!(session_id = session.id, by = %auth.username, "Unlock requested");
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Session unlocked",
        "data": session
    })))
}

/* =========================
Delete session (Admin/HR)
========================= */
#[utoipa::path(
    delete,
    path = "/api/sessions/{session_id}",
    params(
        ("session_id" = u64, Path, description = "Session to delete with its records")
    ),
    responses(
        (status = 200, description = "Session deleted", body = Object, example = json!({
            "success": true,
            "message": "Session deleted",
            "data": { "records_removed": 12 }
        })),
        (status = 404, description = "Session not found"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Sessions"
)]
pub async fn delete_session(
    auth: AuthUser,
    engine: web::Data<AppEngine>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let session_id = path.into_inner();
    let removed = engine.delete_session(session_id).await?;
    info!(session_id, by = %auth.username, removed, "Delete requested");
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Session deleted",
        "data": { "records_removed": removed }
    })))
}

/// Re-derive the status of every unsettled session
#[utoipa::path(
    post,
    path = "/api/sessions/sync",
    responses(
        (status = 200, description = "Number of sessions whose status moved", body = Object, example = json!({
            "success": true,
            "data": { "updated": 3 }
        })),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Sessions"
)]
pub async fn sync_sessions(auth: AuthUser, engine: web::Data<AppEngine>) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let updated = engine.sync_sessions(local_now()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": { "updated": updated } })))
}

/// Drop the cached settings so the next request reloads them
#[utoipa::path(
    post,
    path = "/api/sessions/settings/refresh",
    responses(
        (status = 200, description = "Settings cache cleared"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Sessions"
)]
pub async fn refresh_settings(auth: AuthUser, engine: web::Data<AppEngine>) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    engine.refresh_settings().await;
    info!(by = %auth.username, "Settings cache cleared");
    Ok(HttpResponse::Ok().json(json!({ "success": true, "message": "Settings will be reloaded" })))
}
