use crate::{
    errors::ServiceError,
    handlers::common::success_response,
    services::checkout::{CheckoutQuote, CheckoutRequest, PaymentSession},
    AppState,
};
use axum::{
    extract::{Json, State},
    response::Response,
    routing::post,
    Router,
};

pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/quote", post(quote))
        .route("/payment-intent", post(create_payment_intent))
}

#[utoipa::path(
    post,
    path = "/api/v1/checkout/quote",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Cart priced with the promotion applied", body = CheckoutQuote),
        (status = 400, description = "Empty cart or unusable promo code", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invalid promo code", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn quote(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Response, ServiceError> {
    let quote = state
        .services
        .checkout
        .quote(payload.user_id, payload.promo_code.as_deref())
        .await?;
    Ok(success_response(quote))
}

/// Opens a payment intent for the quoted total. The client confirms it with the
/// returned secret and then submits the order with the payment reference.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/payment-intent",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Quote plus client secret and payment reference", body = PaymentSession),
        (status = 400, description = "Empty cart or unusable promo code", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider error", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Response, ServiceError> {
    let session = state
        .services
        .checkout
        .start_payment(payload.user_id, payload.promo_code.as_deref())
        .await?;
    Ok(success_response(session))
}
