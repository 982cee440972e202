//! Public product catalogue.

use axum::Json;
use axum::extract::State;
use order::Product;

use crate::AppState;
use crate::error::ApiError;

/// GET /api/v1/products: An empty list when the product service is down.
#[tracing::instrument(skip(state))]
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    let products = state
        .catalog
        .list_products(&state.anonymous_context())
        .await?;
    Ok(Json(products))
}
