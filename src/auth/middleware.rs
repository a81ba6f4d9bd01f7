use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::EngineError;
use crate::model::role::Role;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use tracing::debug;

/// Resolves the bearer token to an `AuthUser` stored in the request
/// extensions. Failures answer 401 with the usual `{error, message}` body.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    match authenticate(&req) {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.call(req).await
        }
        Err(e) => Ok(req.error_response(e)),
    }
}

fn authenticate(req: &ServiceRequest) -> Result<AuthUser, EngineError> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| EngineError::Internal("app config missing".to_string()))?;

    let header = req
        .headers()
        .get("Authorization")
        .ok_or(EngineError::Unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| EngineError::Unauthorized("Invalid Authorization header encoding"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(EngineError::Unauthorized("Authorization header must start with Bearer"))?;

    let claims = verify_token(token, &config.jwt_secret).map_err(|e| {
        debug!(error = %e, "Token rejected");
        EngineError::Unauthorized("Invalid or expired token")
    })?;

    let role = Role::from_id(claims.role).ok_or(EngineError::Unauthorized("Invalid role"))?;

    Ok(AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        role,
    })
}
