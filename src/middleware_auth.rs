use std::sync::Arc;

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};

use crate::{
    AppState,
    errors::AppError,
    models::{AuthUser, Claims, Role},
    utils::decode_jwt,
};

/// Authentication middleware validating JWT access tokens.
///
/// # Errors
/// Returns unauthorized if the token is missing, invalid, or a refresh token;
/// returns `RateLimited` when the caller exceeds its quota.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;
    let claims: Claims = decode_jwt(token, &state.config)?;
    if claims.refresh {
        return Err(AppError::Unauthorized);
    }

    let auth_user = AuthUser {
        id: claims.sub,
        role: claims.role,
    };

    // Rate limit key: user id
    let key = auth_user.id.to_string();
    if state.rate_limiter.check_key(&key).is_err() {
        return Err(AppError::RateLimited);
    }

    req.extensions_mut().insert(auth_user);

    Ok(next.run(req).await)
}

/// Admin gate, layered after [`auth_middleware`].
///
/// # Errors
/// Returns `Forbidden` for non-admin callers.
pub async fn require_admin(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    let auth_user = req
        .extensions()
        .get::<AuthUser>()
        .copied()
        .ok_or(AppError::Unauthorized)?;

    if auth_user.role != Role::Admin {
        return Err(AppError::Forbidden);
    }

    Ok(next.run(req).await)
}
