use crate::{
    entities::order::OrderStatus,
    errors::ServiceError,
    handlers::common::{success_response, upsert_response},
    services::{checkout::CreateOrderRequest, orders::OrderDetails},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/:id", get(get_order).put(update_order_status))
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListOrdersQuery {
    pub user_id: Option<Uuid>,
    /// Lists every order when true
    pub is_admin: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    /// PENDING, PROCESSING, COMPLETED or CANCELLED
    pub status: String,
}

/// Places an order for a confirmed payment.
///
/// Replaying a payment reference that already produced an order for the same user
/// returns that order with 200 instead of creating another.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = OrderDetails),
        (status = 200, description = "Order already placed for this payment", body = OrderDetails),
        (status = 400, description = "Invalid order", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment not confirmed", body = crate::errors::ErrorResponse),
        (status = 409, description = "Insufficient stock or payment reference reused", body = crate::errors::ErrorResponse),
        (status = 500, description = "Failed to create order", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Response, ServiceError> {
    let placement = state.services.checkout.place_order(payload).await?;
    Ok(upsert_response(placement.order, placement.created))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(ListOrdersQuery),
    responses(
        (status = 200, description = "Orders, newest first", body = [OrderDetails]),
        (status = 400, description = "User ID required", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Response, ServiceError> {
    let orders = match (query.is_admin, query.user_id) {
        (Some(true), _) => state.services.orders.list_all_orders().await?,
        (_, Some(user_id)) => state.services.orders.list_orders_for_user(user_id).await?,
        _ => {
            return Err(ServiceError::InvalidRequest(
                "User ID required".to_string(),
            ))
        }
    };
    Ok(success_response(orders))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with user and items", body = OrderDetails),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.get_order(id).await?;
    Ok(success_response(order))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order after the transition", body = OrderDetails),
        (status = 400, description = "Unknown status or transition not allowed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<Response, ServiceError> {
    let status = OrderStatus::from_str(payload.status.trim()).map_err(|_| {
        ServiceError::InvalidRequest(format!("Unknown order status: {}", payload.status))
    })?;
    let order = state.services.orders.update_status(id, status).await?;
    Ok(success_response(order))
}
