use axum::extract::State;
use axum::{Extension, Json};
use common::Identity;

use crate::AppState;
use crate::aggregate::UserProfileView;
use crate::error::ApiError;

/// GET /api/v1/profile: The caller with their most recent orders.
#[tracing::instrument(skip(state), fields(user_id = %identity.user_id))]
pub async fn get(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<UserProfileView>, ApiError> {
    let ctx = state.context(&identity);
    let profile = state.aggregator.user_profile(&ctx, identity.user_id).await?;
    Ok(Json(profile))
}
