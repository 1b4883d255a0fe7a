use crate::{
    entities::promotion,
    errors::ServiceError,
    handlers::common::{created_response, no_content_response, success_response, validate_input},
    services::promotions::{AppliedPromotion, CreatePromotionInput, UpdatePromotionInput},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::Response,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

pub fn promotions_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_promotions).post(create_promotion))
        .route("/validate", post(validate_promotion))
        .route(
            "/:id",
            get(get_promotion)
                .put(update_promotion)
                .delete(delete_promotion),
        )
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidatePromotionRequest {
    pub code: String,
}

/// Checks a promo code against the current time without changing anything.
#[utoipa::path(
    post,
    path = "/api/v1/promotions/validate",
    request_body = ValidatePromotionRequest,
    responses(
        (status = 200, description = "Code is usable", body = AppliedPromotion),
        (status = 400, description = "Not started, expired or inactive", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invalid promo code", body = crate::errors::ErrorResponse)
    ),
    tag = "Promotions"
)]
pub async fn validate_promotion(
    State(state): State<AppState>,
    Json(payload): Json<ValidatePromotionRequest>,
) -> Result<Response, ServiceError> {
    let applied = state
        .services
        .promotions
        .validate(&payload.code, Utc::now())
        .await?;
    Ok(success_response(applied))
}

#[utoipa::path(
    get,
    path = "/api/v1/promotions",
    responses((status = 200, description = "All promotions, newest first", body = [promotion::Model])),
    tag = "Promotions"
)]
pub async fn list_promotions(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let promotions = state.services.promotions.list_promotions().await?;
    Ok(success_response(promotions))
}

#[utoipa::path(
    get,
    path = "/api/v1/promotions/{id}",
    params(("id" = Uuid, Path, description = "Promotion id")),
    responses(
        (status = 200, description = "Promotion", body = promotion::Model),
        (status = 404, description = "Promotion not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Promotions"
)]
pub async fn get_promotion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let promotion = state.services.promotions.get_promotion(id).await?;
    Ok(success_response(promotion))
}

#[utoipa::path(
    post,
    path = "/api/v1/promotions",
    request_body = CreatePromotionInput,
    responses(
        (status = 201, description = "Promotion created", body = promotion::Model),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 409, description = "Promotion code already exists", body = crate::errors::ErrorResponse)
    ),
    tag = "Promotions"
)]
pub async fn create_promotion(
    State(state): State<AppState>,
    Json(payload): Json<CreatePromotionInput>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let promotion = state.services.promotions.create_promotion(payload).await?;
    Ok(created_response(promotion))
}

#[utoipa::path(
    put,
    path = "/api/v1/promotions/{id}",
    params(("id" = Uuid, Path, description = "Promotion id")),
    request_body = UpdatePromotionInput,
    responses(
        (status = 200, description = "Promotion updated", body = promotion::Model),
        (status = 404, description = "Promotion not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Promotion code already exists", body = crate::errors::ErrorResponse)
    ),
    tag = "Promotions"
)]
pub async fn update_promotion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePromotionInput>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let promotion = state
        .services
        .promotions
        .update_promotion(id, payload)
        .await?;
    Ok(success_response(promotion))
}

#[utoipa::path(
    delete,
    path = "/api/v1/promotions/{id}",
    params(("id" = Uuid, Path, description = "Promotion id")),
    responses(
        (status = 204, description = "Promotion deleted"),
        (status = 404, description = "Promotion not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Promotions"
)]
pub async fn delete_promotion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.promotions.delete_promotion(id).await?;
    Ok(no_content_response())
}
