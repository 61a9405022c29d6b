//! Role-based authorization layered on top of an authenticated request

use axum::{extract::Request, middleware::Next, response::Response};

use crate::auth::models::{AuthContext, UserRole};
use crate::error::{Error, Result};

/// Roles allowed to modify the inventory
pub const ADMIN_ONLY: &[UserRole] = &[UserRole::Admin];

/// Check an authenticated context against an allow-list of roles
pub fn authorize<'a>(context: Option<&'a AuthContext>, allowed: &[UserRole]) -> Result<&'a AuthContext> {
    let context = context.ok_or(Error::Unauthenticated)?;
    if !allowed.contains(&context.role) {
        tracing::debug!(
            user_id = context.user_id,
            role = %context.role,
            "role not permitted"
        );
        return Err(Error::Forbidden);
    }
    Ok(context)
}

/// Middleware admitting only admins. Must run after `require_auth`.
pub async fn require_admin(req: Request, next: Next) -> std::result::Result<Response, Error> {
    authorize(req.extensions().get::<AuthContext>(), ADMIN_ONLY)?;
    Ok(next.run(req).await)
}
