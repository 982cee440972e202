//! Order endpoints. All of them require an authenticated caller.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use common::{Identity, OrderId, UserId};
use order::{CreateOrder, LineRequest, Order, OrderPage, OrderStats, OrderStatus};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::aggregate::OrderDetailView;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: i64,
    pub quantity: i64,
}

impl From<CreateOrderRequest> for CreateOrder {
    fn from(req: CreateOrderRequest) -> Self {
        CreateOrder {
            user_id: req.user_id.map(UserId::new),
            items: req
                .items
                .into_iter()
                .map(|item| LineRequest::new(item.product_id, item.quantity))
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct OrderCreatedResponse {
    pub id: OrderId,
    pub status: OrderStatus,
}

#[derive(Debug, Serialize)]
pub struct CancelledResponse {
    pub status: &'static str,
}

// -- Handlers --

/// POST /api/v1/orders
#[tracing::instrument(skip(state, req), fields(user_id = %identity.user_id))]
pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let ctx = state.context(&identity);
    let order_id = state.orders.create_order(&ctx, req.into()).await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            id: order_id,
            status: OrderStatus::Pending,
        }),
    ))
}

/// GET /api/v1/orders?page=&page_size=
#[tracing::instrument(skip(state), fields(user_id = %identity.user_id))]
pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListQuery>,
) -> Result<Json<OrderPage>, ApiError> {
    let ctx = state.context(&identity);
    let page = state
        .orders
        .get_user_orders(
            &ctx,
            identity.user_id,
            query.page.unwrap_or(1),
            query.page_size.unwrap_or(0),
        )
        .await?;
    Ok(Json(page))
}

/// GET /api/v1/orders/stats
#[tracing::instrument(skip(state), fields(user_id = %identity.user_id))]
pub async fn stats(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<OrderStats>, ApiError> {
    let ctx = state.context(&identity);
    let stats = state.orders.get_order_stats(&ctx, identity.user_id).await?;
    Ok(Json(stats))
}

/// GET /api/v1/orders/{id}: The order joined with its owner and products.
#[tracing::instrument(skip(state), fields(user_id = %identity.user_id))]
pub async fn get(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetailView>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let ctx = state.context(&identity);
    let view = state.aggregator.order_detail(&ctx, order_id).await?;
    Ok(Json(view))
}

/// PATCH /api/v1/orders/{id}
#[tracing::instrument(skip(state, req), fields(user_id = %identity.user_id))]
pub async fn update_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let ctx = state.context(&identity);
    let order = state
        .orders
        .update_order_status(&ctx, order_id, req.status.as_deref())
        .await?;
    Ok(Json(order))
}

/// POST /api/v1/orders/{id}/cancel: The body and its reason are optional.
#[tracing::instrument(skip(state, body), fields(user_id = %identity.user_id))]
pub async fn cancel(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<CancelledResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let req = parse_cancel_body(&body)?;

    let ctx = state.context(&identity);
    state.orders.cancel_order(&ctx, order_id, &req.reason).await?;
    Ok(Json(CancelledResponse {
        status: "cancelled",
    }))
}

/// An empty body cancels without a reason; anything else must be valid JSON.
fn parse_cancel_body(body: &[u8]) -> Result<CancelOrderRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CancelOrderRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse::<i64>()
        .map(OrderId::new)
        .map_err(|_| ApiError::BadRequest("Invalid order ID".to_string()))
}
