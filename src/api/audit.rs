use crate::auth::auth::AuthUser;
use crate::engine::Engine;
use crate::model::audit::AuditEntry;
use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use utoipa::IntoParams;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Deserialize, IntoParams)]
pub struct AuditQuery {
    /// Number of entries to return, newest first (default 50, max 500)
    pub limit: Option<usize>,
}

/// Recent check-in/check-out attempts, accepted and rejected (Manager/Admin)
#[utoipa::path(
    get,
    path = "/api/audit",
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit entries, newest first", body = [AuditEntry]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Audit"
)]
pub async fn recent(
    auth: AuthUser,
    engine: web::Data<Engine>,
    query: web::Query<AuditQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_manager_or_admin()?;

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let entries = engine.audit.recent(limit).await?;

    Ok(HttpResponse::Ok().json(entries))
}
