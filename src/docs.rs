use crate::api::attendance::{AttendanceStatus, CheckInRequest, CheckOutRequest, InvalidateRequest};
use crate::api::presence::PresenceResponse;
use crate::api::zone::{ResolveRequest, ResolveResponse, ZoneWorkersResponse};
use crate::engine::presence::{ZoneHeadcount, ZoneRemoval};
use crate::model::attendance::AttendanceRecord;
use crate::model::audit::{AuditAction, AuditEntry, AuditEvent, AuditOutcome};
use crate::model::zone::{GeofenceZone, LatLng, NewZone, ZonePatch, ZoneShape};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Site Presence API",
        version = "1.0.0",
        description = r#"
## Geofenced attendance for remote sites

Workers check in and out from their handsets. A check-in is accepted only
when the reported position lies inside an active geofence zone.

### Key features
- **Zones**
  - Circles and simple polygons, with activation and tombstoning
- **Attendance**
  - At most one open session per worker, enforced under concurrency
- **Presence**
  - Who is on site, and in which zone, for muster and safety counts
- **Audit**
  - Every attempt is logged, including rejected ones

### Security
All endpoints need a **JWT Bearer** access token. Zone changes need the
**Manager** or **Admin** role; voiding records needs **Admin**.
"#,
    ),
    paths(
        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::my_status,
        crate::api::attendance::history,
        crate::api::attendance::invalidate,

        crate::api::zone::list_zones,
        crate::api::zone::create_zone,
        crate::api::zone::get_zone,
        crate::api::zone::update_zone,
        crate::api::zone::deactivate_zone,
        crate::api::zone::delete_zone,
        crate::api::zone::zone_workers,
        crate::api::zone::resolve,

        crate::api::presence::is_present,
        crate::api::presence::headcount,

        crate::api::audit::recent
    ),
    components(
        schemas(
            LatLng,
            ZoneShape,
            GeofenceZone,
            NewZone,
            ZonePatch,
            ZoneRemoval,
            ZoneHeadcount,
            AttendanceRecord,
            AttendanceStatus,
            CheckInRequest,
            CheckOutRequest,
            InvalidateRequest,
            PresenceResponse,
            ResolveRequest,
            ResolveResponse,
            ZoneWorkersResponse,
            AuditAction,
            AuditOutcome,
            AuditEvent,
            AuditEntry
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Attendance", description = "Check-in, check-out and attendance records"),
        (name = "Zones", description = "Geofence zone management"),
        (name = "Presence", description = "Who is on site right now"),
        (name = "Audit", description = "Attendance attempt log"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
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
