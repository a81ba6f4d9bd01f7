use crate::auth::auth::AuthUser;
use crate::engine::Engine;
use crate::engine::presence::ZoneHeadcount;
use crate::model::UserId;
use actix_web::{HttpResponse, Responder, web};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct PresenceResponse {
    #[schema(value_type = u64)]
    pub user_id: UserId,
    pub present: bool,
}

/// Whether a worker currently holds an open session
#[utoipa::path(
    get,
    path = "/api/presence/{user_id}",
    params(
        ("user_id" = u64, Path, description = "Worker to look up")
    ),
    responses(
        (status = 200, description = "Presence flag", body = PresenceResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Presence"
)]
pub async fn is_present(
    _auth: AuthUser,
    engine: web::Data<Engine>,
    path: web::Path<UserId>,
) -> actix_web::Result<impl Responder> {
    let user_id = path.into_inner();
    let present = engine.presence.is_present(user_id).await?;

    Ok(HttpResponse::Ok().json(PresenceResponse { user_id, present }))
}

/// Open sessions per zone (muster count)
#[utoipa::path(
    get,
    path = "/api/presence/headcount",
    responses(
        (status = 200, description = "Headcount for active or occupied zones", body = [ZoneHeadcount]),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Presence"
)]
pub async fn headcount(
    _auth: AuthUser,
    engine: web::Data<Engine>,
) -> actix_web::Result<impl Responder> {
    let counts = engine.presence.headcount().await?;
    Ok(HttpResponse::Ok().json(counts))
}
