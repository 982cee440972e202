//! Public account endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::AppState;
use crate::aggregate::UserSummary;
use crate::clients::{LoginRequest, LoginResponse, NewUser};
use crate::error::ApiError;

/// POST /api/v1/register
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<NewUser>,
) -> Result<(StatusCode, Json<UserSummary>), ApiError> {
    let user = state
        .users
        .create_user(&state.anonymous_context(), req)
        .await?;
    tracing::info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(UserSummary::from(&user))))
}

/// POST /api/v1/login
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let response = state.auth.login(&state.anonymous_context(), req).await?;
    Ok(Json(response))
}
