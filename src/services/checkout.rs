use crate::{
    errors::ServiceError,
    notifications::{dispatch_order_confirmation, OrderNotifier},
    services::{
        cart::{CartLine, CartService},
        orders::{OrderLineInput, OrderPlacement, OrderService},
        payments::{verify_payment, PaymentGateway},
        promotions::{discounted_total, PromotionService},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Priced cart with an optional promotion applied.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutQuote {
    pub user_id: Uuid,
    pub items: Vec<CartLine>,
    pub subtotal: Decimal,
    pub discount_percent: i32,
    pub discount_amount: Decimal,
    pub total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    #[serde(flatten)]
    pub quote: CheckoutQuote,
    pub client_secret: String,
    pub payment_reference: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    pub promo_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    pub cart_items: Vec<OrderLineInput>,
    pub total_amount: Decimal,
    pub payment_reference: String,
}

/// Ties cart, promotions, payment and the order engine together.
#[derive(Clone)]
pub struct CheckoutService {
    cart: CartService,
    promotions: PromotionService,
    orders: OrderService,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn OrderNotifier>,
}

impl CheckoutService {
    pub fn new(
        cart: CartService,
        promotions: PromotionService,
        orders: OrderService,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Self {
        Self {
            cart,
            promotions,
            orders,
            gateway,
            notifier,
        }
    }

    #[instrument(skip(self))]
    pub async fn quote(
        &self,
        user_id: Uuid,
        promo_code: Option<&str>,
    ) -> Result<CheckoutQuote, ServiceError> {
        let cart = self.cart.get_cart(user_id).await?;
        if cart.items.is_empty() {
            return Err(ServiceError::InvalidRequest("Cart is empty".to_string()));
        }

        let applied = match promo_code.map(str::trim).filter(|code| !code.is_empty()) {
            Some(code) => Some(self.promotions.validate(code, Utc::now()).await?),
            None => None,
        };
        let discount_percent = applied.as_ref().map(|p| p.discount).unwrap_or(0);
        let total = discounted_total(cart.subtotal, discount_percent);

        Ok(CheckoutQuote {
            user_id,
            discount_amount: cart.subtotal - total,
            subtotal: cart.subtotal,
            items: cart.items,
            discount_percent,
            total,
            promo_code: applied.map(|p| p.code),
        })
    }

    /// Quotes the cart and opens a payment intent for the total.
    #[instrument(skip(self))]
    pub async fn start_payment(
        &self,
        user_id: Uuid,
        promo_code: Option<&str>,
    ) -> Result<PaymentSession, ServiceError> {
        let quote = self.quote(user_id, promo_code).await?;
        let intent = self.gateway.create_intent(quote.total, user_id).await?;
        info!(
            payment_reference = %intent.id,
            gateway = self.gateway.name(),
            total = %quote.total,
            "Payment intent created"
        );

        Ok(PaymentSession {
            quote,
            client_secret: intent.client_secret,
            payment_reference: intent.id,
        })
    }

    /// Creates the order once the gateway reports the payment as succeeded for
    /// exactly the submitted total. The confirmation email goes out only for new orders.
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn place_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderPlacement, ServiceError> {
        let reference = request.payment_reference.trim();
        if reference.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "Payment reference is required".to_string(),
            ));
        }
        verify_payment(self.gateway.as_ref(), reference, request.total_amount).await?;

        let placement = self
            .orders
            .create_order(
                request.user_id,
                request.cart_items,
                request.total_amount,
                reference,
            )
            .await?;

        if placement.created {
            dispatch_order_confirmation(self.notifier.clone(), placement.order.clone());
        }
        Ok(placement)
    }
}
