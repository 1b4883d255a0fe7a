use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Spice Storefront API",
        version = "0.1.0",
        description = r#"
# Spice Storefront API

Catalog, cart, promotions, checkout and order management for an online spice shop.

## Checkout flow

1. `POST /api/v1/checkout/quote` prices the stored cart, optionally with a promo code.
2. `POST /api/v1/checkout/payment-intent` opens a payment intent for the quoted total.
3. The client confirms the payment with the returned `clientSecret`.
4. `POST /api/v1/orders` submits the cart lines, total and `paymentReference`. The order is
   only created when the payment has succeeded for exactly that total.

## Error Handling

Failures share one body shape:

```json
{
  "error": "Conflict",
  "message": "Insufficient stock for Saffron Threads: 0 available, 1 requested",
  "request_id": "5f0c...",
  "timestamp": "2024-06-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Products", description = "Catalog endpoints"),
        (name = "Cart", description = "Per-user cart endpoints"),
        (name = "Promotions", description = "Promo code validation and administration"),
        (name = "Checkout", description = "Quotes and payment intents"),
        (name = "Orders", description = "Order placement and status"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Products
        crate::handlers::products::list_products,
        crate::handlers::products::low_stock_products,
        crate::handlers::products::get_product,
        crate::handlers::products::create_product,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,
        // Cart
        crate::handlers::cart::get_cart,
        crate::handlers::cart::add_to_cart,
        crate::handlers::cart::update_cart_item,
        crate::handlers::cart::remove_cart_item,
        crate::handlers::cart::clear_cart,
        // Promotions
        crate::handlers::promotions::validate_promotion,
        crate::handlers::promotions::list_promotions,
        crate::handlers::promotions::get_promotion,
        crate::handlers::promotions::create_promotion,
        crate::handlers::promotions::update_promotion,
        crate::handlers::promotions::delete_promotion,
        // Checkout
        crate::handlers::checkout::quote,
        crate::handlers::checkout::create_payment_intent,
        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        // Health
        crate::health::health_check,
    ),
    components(
        schemas(
            crate::entities::product::Model,
            crate::entities::promotion::Model,
            crate::entities::promotion::PromotionStatus,
            crate::entities::order::OrderStatus,
            crate::services::catalog::CreateProductInput,
            crate::services::catalog::UpdateProductInput,
            crate::services::cart::CartView,
            crate::services::cart::CartLine,
            crate::services::promotions::AppliedPromotion,
            crate::services::promotions::CreatePromotionInput,
            crate::services::promotions::UpdatePromotionInput,
            crate::services::checkout::CheckoutQuote,
            crate::services::checkout::CheckoutRequest,
            crate::services::checkout::PaymentSession,
            crate::services::checkout::CreateOrderRequest,
            crate::services::orders::OrderDetails,
            crate::services::orders::OrderLine,
            crate::services::orders::OrderLineInput,
            crate::services::users::UserSummary,
            crate::services::payments::PaymentIntentStatus,
            crate::handlers::cart::AddToCartRequest,
            crate::handlers::cart::UpdateCartItemRequest,
            crate::handlers::common::DeletedCount,
            crate::handlers::orders::UpdateOrderStatusRequest,
            crate::handlers::promotions::ValidatePromotionRequest,
            crate::health::HealthInfo,
            crate::health::HealthStatus,
            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document as JSON.
pub fn openapi_routes() -> Router {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDocV1::openapi()) }),
    )
}
