use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::error::Result;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}

/// Verifies the credentials and returns a bearer token for the
/// protected card endpoints.
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let token = state.auth.login(&request.username, &request.password).await?;
    Ok(Json(LoginResponse { token }))
}
