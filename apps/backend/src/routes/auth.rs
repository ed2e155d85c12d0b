//! Authentication middleware

use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::error::{ApiError, Result};
use crate::AppState;

/// Identity resolved from the bearer token, stored in request extensions
#[derive(Clone, Debug)]
pub struct AuthenticatedIdentity {
    pub identity_id: String,
}

/// Auth middleware - resolves the session token from the Authorization header
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization format".to_string()))?;

    let session = state
        .db
        .get_session(token)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Unknown or expired session".to_string()))?;

    request.extensions_mut().insert(AuthenticatedIdentity {
        identity_id: session.identity_id,
    });

    Ok(next.run(request).await)
}
