pub mod cart;
pub mod checkout;
pub mod common;
pub mod orders;
pub mod products;
pub mod promotions;

use crate::{
    db::DbPool,
    events::EventSender,
    notifications::OrderNotifier,
    services::{
        cart::CartService, catalog::ProductService, checkout::CheckoutService,
        orders::OrderService, payments::PaymentGateway, promotions::PromotionService,
        users::UserService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub products: Arc<ProductService>,
    pub cart: Arc<CartService>,
    pub promotions: Arc<PromotionService>,
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
    pub users: Arc<UserService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Self {
        let products = ProductService::new(db_pool.clone(), event_sender.clone());
        let cart = CartService::new(db_pool.clone(), event_sender.clone());
        let promotions = PromotionService::new(db_pool.clone(), event_sender.clone());
        let orders = OrderService::new(db_pool.clone(), event_sender);
        let checkout = CheckoutService::new(
            cart.clone(),
            promotions.clone(),
            orders.clone(),
            gateway,
            notifier,
        );
        let users = UserService::new(db_pool);

        Self {
            products: Arc::new(products),
            cart: Arc::new(cart),
            promotions: Arc::new(promotions),
            orders: Arc::new(orders),
            checkout: Arc::new(checkout),
            users: Arc::new(users),
        }
    }
}
