use crate::auth::auth::AuthUser;
use crate::engine::Engine;
use crate::model::attendance::AttendanceRecord;
use crate::model::zone::LatLng;
use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CheckInRequest {
    #[schema(example = 10.0003)]
    pub latitude: f64,
    #[schema(example = 20.0)]
    pub longitude: f64,
    #[schema(example = "handset-0142")]
    pub device_id: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CheckOutRequest {
    #[schema(example = 10.0010)]
    pub latitude: f64,
    #[schema(example = 20.0)]
    pub longitude: f64,
}

#[derive(Deserialize, ToSchema)]
pub struct InvalidateRequest {
    #[schema(example = "GPS spoofing confirmed by site security")]
    pub reason: String,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceStatus {
    #[schema(example = 7)]
    pub user_id: u64,
    pub present: bool,
    pub session: Option<AttendanceRecord>,
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body = CheckInRequest,
    responses(
        (status = 200, description = "Checked in successfully", body = AttendanceRecord),
        (status = 400, description = "Malformed coordinates", body = Object, example = json!({
            "error": "VALIDATION_ERROR",
            "message": "validation failed: latitude 91 is outside [-90, 90]"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Already checked in", body = Object, example = json!({
            "error": "ALREADY_CHECKED_IN",
            "message": "Already checked in"
        })),
        (status = 422, description = "Not inside any active zone", body = Object, example = json!({
            "error": "OUTSIDE_ANY_ZONE",
            "message": "You are not inside a registered zone"
        })),
        (status = 503, description = "Storage unavailable")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    engine: web::Data<Engine>,
    payload: web::Json<CheckInRequest>,
) -> actix_web::Result<impl Responder> {
    let payload = payload.into_inner();
    let point = LatLng::new(payload.latitude, payload.longitude);

    let record = engine
        .ledger
        .check_in(auth.user_id, point, payload.device_id)
        .await?;

    Ok(HttpResponse::Ok().json(record))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    request_body = CheckOutRequest,
    responses(
        (status = 200, description = "Checked out successfully", body = AttendanceRecord),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "No open check-in", body = Object, example = json!({
            "error": "NOT_CHECKED_IN",
            "message": "No open check-in found"
        })),
        (status = 503, description = "Storage unavailable")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    engine: web::Data<Engine>,
    payload: web::Json<CheckOutRequest>,
) -> actix_web::Result<impl Responder> {
    let point = LatLng::new(payload.latitude, payload.longitude);
    let record = engine.ledger.check_out(auth.user_id, point).await?;

    Ok(HttpResponse::Ok().json(record))
}

/// Current attendance status of the caller
#[utoipa::path(
    get,
    path = "/api/attendance/me",
    responses(
        (status = 200, description = "Presence of the authenticated worker", body = AttendanceStatus),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn my_status(
    auth: AuthUser,
    engine: web::Data<Engine>,
) -> actix_web::Result<impl Responder> {
    let session = engine.presence.current_session(auth.user_id).await?;

    Ok(HttpResponse::Ok().json(AttendanceStatus {
        user_id: auth.user_id,
        present: session.is_some(),
        session,
    }))
}

/// Attendance history of a worker, oldest first
#[utoipa::path(
    get,
    path = "/api/attendance/history/{user_id}",
    params(
        ("user_id" = u64, Path, description = "Worker whose history to list")
    ),
    responses(
        (status = 200, description = "All records of the worker", body = [AttendanceRecord]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn history(
    auth: AuthUser,
    engine: web::Data<Engine>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let user_id = path.into_inner();
    auth.require_self_or_manager(user_id)?;

    let records = engine.ledger.history(user_id).await?;
    Ok(HttpResponse::Ok().json(records))
}

/// Void an attendance record (Admin)
#[utoipa::path(
    put,
    path = "/api/attendance/{record_id}/invalidate",
    params(
        ("record_id" = u64, Path, description = "ID of the attendance record to invalidate")
    ),
    request_body = InvalidateRequest,
    responses(
        (status = 200, description = "Record invalidated", body = AttendanceRecord),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Record not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn invalidate(
    auth: AuthUser,
    engine: web::Data<Engine>,
    path: web::Path<u64>,
    payload: web::Json<InvalidateRequest>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let record_id = path.into_inner();
    let record = engine.ledger.invalidate(record_id, &payload.reason).await?;

    tracing::info!(record_id, admin = auth.user_id, "Record invalidated by admin");
    Ok(HttpResponse::Ok().json(record))
}
