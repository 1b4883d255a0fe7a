use crate::{
    errors::ServiceError,
    handlers::common::{
        no_content_response, success_response, upsert_response, DeletedCount, UserQuery,
    },
    services::cart::CartView,
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).post(add_to_cart).delete(clear_cart))
        .route("/:id", put(update_cart_item).delete(remove_cart_item))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

#[utoipa::path(
    get,
    path = "/api/v1/cart",
    params(UserQuery),
    responses(
        (status = 200, description = "Cart lines and subtotal", body = CartView),
        (status = 400, description = "User ID required", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Response, ServiceError> {
    let cart = state.services.cart.get_cart(query.require()?).await?;
    Ok(success_response(cart))
}

/// Adds a product, merging into an existing line for the same product.
#[utoipa::path(
    post,
    path = "/api/v1/cart",
    request_body = AddToCartRequest,
    responses(
        (status = 201, description = "New cart line"),
        (status = 200, description = "Quantity merged into an existing line"),
        (status = 400, description = "Invalid quantity or not enough stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "User or product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    Json(payload): Json<AddToCartRequest>,
) -> Result<Response, ServiceError> {
    let mutation = state
        .services
        .cart
        .add_item(payload.user_id, payload.product_id, payload.quantity)
        .await?;
    Ok(upsert_response(mutation.entry, mutation.created))
}

#[utoipa::path(
    put,
    path = "/api/v1/cart/{id}",
    params(("id" = Uuid, Path, description = "Cart entry id")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Quantity updated"),
        (status = 400, description = "Invalid quantity or not enough stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart entry not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> Result<Response, ServiceError> {
    let entry = state
        .services
        .cart
        .update_quantity(id, payload.quantity)
        .await?;
    Ok(success_response(entry))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart/{id}",
    params(("id" = Uuid, Path, description = "Cart entry id")),
    responses((status = 204, description = "Entry removed or already gone")),
    tag = "Cart"
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.cart.remove_item(id).await?;
    Ok(no_content_response())
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    params(UserQuery),
    responses(
        (status = 200, description = "Number of entries removed", body = DeletedCount),
        (status = 400, description = "User ID required", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Response, ServiceError> {
    let removed = state.services.cart.clear_cart(query.require()?).await?;
    Ok(success_response(DeletedCount { removed }))
}
