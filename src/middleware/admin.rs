use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Cookie, HeaderMapExt};

use crate::{AppState, error::AppError, utils::verify_admin_token};

pub const ADMIN_COOKIE: &str = "admin_session";

/// The authenticated admin, available to handlers behind [`admin_auth`].
#[derive(Debug, Clone)]
pub struct AdminIdentity {
    pub username: String,
    pub session_id: String,
}

/// Current admin from the session cookie, if any.
pub fn current_admin(req: &Request<Body>, state: &AppState) -> Option<AdminIdentity> {
    let cookies = req.headers().typed_get::<Cookie>()?;
    let token = cookies.get(ADMIN_COOKIE)?;

    match verify_admin_token(token, &state.config) {
        Ok(claims) if claims.sub == state.config.admin_username => Some(AdminIdentity {
            username: claims.sub,
            session_id: claims.jti,
        }),
        Ok(claims) => {
            tracing::warn!(target: "security", admin = %claims.sub, "session for unknown admin");
            None
        }
        Err(e) => {
            tracing::debug!(error = %e, "admin session rejected");
            None
        }
    }
}

pub async fn admin_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let admin = current_admin(&req, &state).ok_or(AppError::Unauthorized)?;
    req.extensions_mut().insert(admin);
    Ok(next.run(req).await)
}
