use crate::{auth::jwt::verify_access_token, config::Config, model::role::Role};
use actix_web::{
    FromRequest, HttpMessage, HttpRequest,
    dev::Payload,
    error::{ErrorForbidden, ErrorInternalServerError, ErrorUnauthorized},
    web::Data,
};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
}

impl AuthUser {
    fn from_header(req: &HttpRequest) -> actix_web::Result<Self> {
        let token = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or_else(|| ErrorUnauthorized("Missing token"))?;

        let config = req
            .app_data::<Data<Config>>()
            .ok_or_else(|| ErrorInternalServerError("Config missing"))?;

        let claims = verify_access_token(token, &config.jwt_secret).map_err(|_| ErrorUnauthorized("Invalid token"))?;
        let role = Role::from_id(claims.role).ok_or_else(|| ErrorUnauthorized("Invalid role"))?;

        Ok(AuthUser {
            user_id: claims.user_id,
            username: claims.sub,
            role,
        })
    }

    /// Session administration is limited to admin, HR and system callers.
    pub fn require_admin(&self) -> actix_web::Result<()> {
        if self.role.manages_sessions() {
            Ok(())
        } else {
            Err(ErrorForbidden("Admin only"))
        }
    }
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // Set by the auth middleware on protected scopes.
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }
        ready(AuthUser::from_header(req))
    }
}
