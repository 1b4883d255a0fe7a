use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

/// Domain events published after state changes commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        order_number: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    StockDecremented {
        product_id: Uuid,
        remaining: i32,
    },
    CartCleared {
        user_id: Uuid,
        removed: u64,
    },
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),
    PromotionCreated(Uuid),
    PromotionUpdated(Uuid),
    PromotionDeleted(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes an event; a closed channel is logged and otherwise ignored.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Settings for the event loop
#[derive(Debug, Clone, Copy)]
pub struct EventProcessorConfig {
    pub low_stock_threshold: i32,
}

impl Default for EventProcessorConfig {
    fn default() -> Self {
        Self {
            low_stock_threshold: 20,
        }
    }
}

/// Consumes events until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, config: EventProcessorConfig) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        debug!(?event, "Received event");
        match event {
            Event::OrderCreated {
                order_id,
                user_id,
                order_number,
            } => {
                info!(%order_id, %user_id, %order_number, "Order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "Order status changed");
            }
            Event::StockDecremented {
                product_id,
                remaining,
            } => handle_stock_decremented(product_id, remaining, config.low_stock_threshold),
            Event::CartCleared { user_id, removed } => {
                debug!(%user_id, removed, "Cart cleared");
            }
            other => debug!(event = ?other, "Catalog event"),
        }
    }

    info!("Event processing loop stopped");
}

fn handle_stock_decremented(product_id: Uuid, remaining: i32, threshold: i32) {
    if remaining == 0 {
        warn!(%product_id, "Product sold out");
    } else if remaining <= threshold {
        warn!(%product_id, remaining, threshold, "Low stock alert");
    }
}
