use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    services::orders::{CodOrderPlaced, CreateOrderRequest, OrderWithItems, PrepaidCheckout},
    AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cod", post(create_cod_order))
        .route("/prepaid", post(create_prepaid_order))
        .route("/:id", get(get_order))
}

/// Place a Cash-on-Delivery order
#[utoipa::path(
    post,
    path = "/api/v1/orders/cod",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Order placed", body = CodOrderPlaced),
        (status = 400, description = "Invalid order input", body = crate::errors::ErrorResponse),
        (status = 500, description = "Order could not be created", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_cod_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let placed = state.order_service().create_cod_order(request).await?;
    Ok(Json(placed))
}

/// Place a prepaid order and open a payment intent
#[utoipa::path(
    post,
    path = "/api/v1/orders/prepaid",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Order placed, checkout details returned", body = PrepaidCheckout),
        (status = 400, description = "Invalid order input", body = crate::errors::ErrorResponse),
        (status = 500, description = "Order could not be created", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_prepaid_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let checkout = state.order_service().create_prepaid_order(request).await?;
    Ok(Json(checkout))
}

/// Fetch an order with its line items
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order id")
    ),
    responses(
        (status = 200, description = "Order found", body = OrderWithItems),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.order_service().get_order(id).await?;
    Ok(Json(order))
}
