use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::api::AppState;
use crate::error::AppError;
use crate::services::users::AuthError;

/// Middleware that resolves the bearer token into an `Identity` and
/// stores it as a request extension for the handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
        .ok_or(AppError::Unauthorized)?;

    let identity = state
        .auth
        .identity_for_token(&token)
        .await
        .map_err(|e| match e {
            AuthError::Store(inner) => AppError::Ledger(inner),
            _ => AppError::Unauthorized,
        })?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
