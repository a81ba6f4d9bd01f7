use crate::auth::auth::AuthUser;
use crate::engine::Engine;
use crate::engine::geometry::validate_point;
use crate::engine::presence::ZoneRemoval;
use crate::model::ZoneId;
use crate::model::zone::{GeofenceZone, LatLng, NewZone, ZonePatch};
use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct ResolveRequest {
    #[schema(example = 10.0003)]
    pub latitude: f64,
    #[schema(example = 20.0)]
    pub longitude: f64,
}

#[derive(Serialize, ToSchema)]
pub struct ResolveResponse {
    /// Active zones containing the point, ascending by id.
    #[schema(value_type = Vec<u64>)]
    pub zone_ids: Vec<ZoneId>,
    /// The zone a check-in at this point would be assigned to.
    #[schema(value_type = Option<u64>)]
    pub assigned_zone_id: Option<ZoneId>,
}

#[derive(Serialize, ToSchema)]
pub struct ZoneWorkersResponse {
    #[schema(value_type = u64)]
    pub zone_id: ZoneId,
    pub workers: Vec<u64>,
}

/// List every zone, inactive ones included
#[utoipa::path(
    get,
    path = "/api/zones",
    responses(
        (status = 200, description = "All zones ordered by id", body = [GeofenceZone]),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Zones"
)]
pub async fn list_zones(_auth: AuthUser, engine: web::Data<Engine>) -> impl Responder {
    HttpResponse::Ok().json(engine.zones.list())
}

/// Register a zone (Manager/Admin)
#[utoipa::path(
    post,
    path = "/api/zones",
    request_body = NewZone,
    responses(
        (status = 201, description = "Zone created", body = GeofenceZone),
        (status = 400, description = "Invalid shape or name", body = Object, example = json!({
            "error": "VALIDATION_ERROR",
            "message": "validation failed: polygon edges intersect"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Zones"
)]
pub async fn create_zone(
    auth: AuthUser,
    engine: web::Data<Engine>,
    payload: web::Json<NewZone>,
) -> actix_web::Result<impl Responder> {
    auth.require_manager_or_admin()?;

    let mut zone = payload.into_inner();
    zone.created_by = auth.user_id;

    let zone = engine.zones.create(zone).await?;
    Ok(HttpResponse::Created().json(zone))
}

/// Get a zone by id
#[utoipa::path(
    get,
    path = "/api/zones/{id}",
    params(
        ("id" = u64, Path, description = "Zone ID")
    ),
    responses(
        (status = 200, description = "Zone found", body = GeofenceZone),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Zone not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Zones"
)]
pub async fn get_zone(
    _auth: AuthUser,
    engine: web::Data<Engine>,
    path: web::Path<ZoneId>,
) -> actix_web::Result<impl Responder> {
    let zone = engine.zones.get(path.into_inner())?;
    Ok(HttpResponse::Ok().json(zone))
}

/// Update a zone (Manager/Admin)
#[utoipa::path(
    put,
    path = "/api/zones/{id}",
    params(
        ("id" = u64, Path, description = "Zone ID")
    ),
    request_body = ZonePatch,
    responses(
        (status = 200, description = "Zone updated", body = GeofenceZone),
        (status = 400, description = "Invalid shape or name"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Zone not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Zones"
)]
pub async fn update_zone(
    auth: AuthUser,
    engine: web::Data<Engine>,
    path: web::Path<ZoneId>,
    payload: web::Json<ZonePatch>,
) -> actix_web::Result<impl Responder> {
    auth.require_manager_or_admin()?;

    let zone = engine
        .zones
        .update(path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(zone))
}

/// Retire a zone without deleting it (Manager/Admin)
#[utoipa::path(
    put,
    path = "/api/zones/{id}/deactivate",
    params(
        ("id" = u64, Path, description = "Zone ID")
    ),
    responses(
        (status = 200, description = "Zone deactivated", body = GeofenceZone),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Zone not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Zones"
)]
pub async fn deactivate_zone(
    auth: AuthUser,
    engine: web::Data<Engine>,
    path: web::Path<ZoneId>,
) -> actix_web::Result<impl Responder> {
    auth.require_manager_or_admin()?;

    let zone = engine.zones.deactivate(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(zone))
}

/// Delete a zone (Manager/Admin). Zones with attendance history are only
/// deactivated.
#[utoipa::path(
    delete,
    path = "/api/zones/{id}",
    params(
        ("id" = u64, Path, description = "Zone ID")
    ),
    responses(
        (status = 200, description = "Zone purged or tombstoned", body = ZoneRemoval),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Zone not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Zones"
)]
pub async fn delete_zone(
    auth: AuthUser,
    engine: web::Data<Engine>,
    path: web::Path<ZoneId>,
) -> actix_web::Result<impl Responder> {
    auth.require_manager_or_admin()?;

    let removal = engine.presence.delete_zone(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(removal))
}

/// Workers currently checked into a zone
#[utoipa::path(
    get,
    path = "/api/zones/{id}/workers",
    params(
        ("id" = u64, Path, description = "Zone ID")
    ),
    responses(
        (status = 200, description = "User ids with an open session in the zone", body = ZoneWorkersResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Zone not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Zones"
)]
pub async fn zone_workers(
    _auth: AuthUser,
    engine: web::Data<Engine>,
    path: web::Path<ZoneId>,
) -> actix_web::Result<impl Responder> {
    let zone_id = path.into_inner();
    let workers = engine.presence.workers_in_zone(zone_id).await?;

    Ok(HttpResponse::Ok().json(ZoneWorkersResponse {
        zone_id,
        workers: workers.into_iter().collect(),
    }))
}

/// Which active zones contain a point
#[utoipa::path(
    post,
    path = "/api/zones/resolve",
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Containing zones", body = ResolveResponse),
        (status = 400, description = "Malformed coordinates"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Zones"
)]
pub async fn resolve(
    _auth: AuthUser,
    engine: web::Data<Engine>,
    payload: web::Json<ResolveRequest>,
) -> actix_web::Result<impl Responder> {
    let point = LatLng::new(payload.latitude, payload.longitude);
    validate_point(point)?;

    let zone_ids = engine.zones.resolve_zones(point);
    Ok(HttpResponse::Ok().json(ResolveResponse {
        assigned_zone_id: zone_ids.first().copied(),
        zone_ids,
    }))
}
