use crate::error::EngineError;
use crate::model::UserId;
use crate::model::role::Role;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
    pub username: String,
    pub role: Role,
}

/// Reads the user `auth_middleware` resolved. Routes outside the protected
/// scope get 401.
impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| EngineError::Unauthorized("Missing credentials").into()),
        )
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), EngineError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(EngineError::Forbidden("Admin only"))
        }
    }

    pub fn require_manager_or_admin(&self) -> Result<(), EngineError> {
        if self.role.can_manage_zones() {
            Ok(())
        } else {
            Err(EngineError::Forbidden("Manager/Admin only"))
        }
    }

    /// Workers may read their own attendance; managers anyone's.
    pub fn require_self_or_manager(&self, user_id: UserId) -> Result<(), EngineError> {
        if self.user_id == user_id {
            Ok(())
        } else {
            self.require_manager_or_admin()
        }
    }
}
