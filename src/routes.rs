use crate::{
    api::{attendance, audit, presence, zone},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::{Result, anyhow};
use std::sync::Arc;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Rate limiters shared by every worker thread so quotas are per process,
/// not per worker.
#[derive(Clone)]
pub struct Limiters {
    attendance: Limiter,
    protected: Limiter,
}

impl Limiters {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            attendance: build_limiter(config.rate_attendance_per_min)?,
            protected: build_limiter(config.rate_protected_per_min)?,
        })
    }
}

fn build_limiter(requests_per_min: u32) -> Result<Limiter> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = 60_000 / requests_per_min as u64;
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms.max(1))
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit: {} per minute", requests_per_min))?;
    Ok(Arc::new(Governor::new(&cfg)))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &Limiters) {
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(limiters.protected.clone())
            .service(
                web::scope("/attendance")
                    // check-in/out are the spoofable, write-heavy calls
                    .service(
                        web::resource("/check-in")
                            .wrap(limiters.attendance.clone())
                            .route(web::post().to(attendance::check_in)),
                    )
                    .service(
                        web::resource("/check-out")
                            .wrap(limiters.attendance.clone())
                            .route(web::post().to(attendance::check_out)),
                    )
                    .service(web::resource("/me").route(web::get().to(attendance::my_status)))
                    .service(
                        web::resource("/history/{user_id}")
                            .route(web::get().to(attendance::history)),
                    )
                    .service(
                        web::resource("/{id}/invalidate")
                            .route(web::put().to(attendance::invalidate)),
                    ),
            )
            .service(
                web::scope("/zones")
                    // /zones
                    .service(
                        web::resource("")
                            .route(web::get().to(zone::list_zones))
                            .route(web::post().to(zone::create_zone)),
                    )
                    // /zones/resolve (before /{id})
                    .service(web::resource("/resolve").route(web::post().to(zone::resolve)))
                    // /zones/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(zone::get_zone))
                            .route(web::put().to(zone::update_zone))
                            .route(web::delete().to(zone::delete_zone)),
                    )
                    .service(
                        web::resource("/{id}/deactivate")
                            .route(web::put().to(zone::deactivate_zone)),
                    )
                    .service(web::resource("/{id}/workers").route(web::get().to(zone::zone_workers))),
            )
            .service(
                web::scope("/presence")
                    .service(web::resource("/headcount").route(web::get().to(presence::headcount)))
                    .service(web::resource("/{user_id}").route(web::get().to(presence::is_present))),
            )
            .service(web::resource("/audit").route(web::get().to(audit::recent))),
    );
}
