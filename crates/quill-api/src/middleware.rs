use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::token;

/// The member resolved from the bearer token, attached to the request for
/// downstream handlers — explicit context, never ambient state.
#[derive(Debug, Clone)]
pub struct CurrentMember {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// Extract and resolve the bearer token from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(ApiError::TokenMissing)?;

    let member = token::resolve_token(&state.db, bearer)?;

    req.extensions_mut().insert(CurrentMember {
        id: member.id,
        name: member.name,
        email: member.email,
    });
    Ok(next.run(req).await)
}
