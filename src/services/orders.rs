use crate::{
    entities::{
        cart_entry,
        order::{self, OrderStatus},
        order_item, product, user, CartEntry, Order, OrderItem, Product, User,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::users::UserSummary,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveEnum, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, DbErr, EntityTrait, LoaderTrait, QueryFilter, QueryOrder, Set, SqlErr,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

const MAX_ORDER_NUMBER_ATTEMPTS: usize = 3;
const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// One purchased line as submitted at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price_at_purchase: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub id: Uuid,
    pub product_id: Uuid,
    /// None once the product has been removed from the catalog
    pub product_name: Option<String>,
    pub quantity: i32,
    pub price_at_purchase: Decimal,
    pub line_total: Decimal,
}

/// An order with its owner and line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub payment_reference: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user: Option<UserSummary>,
    pub items: Vec<OrderLine>,
}

/// Outcome of `create_order`. `created` is false when the payment reference
/// already had an order for the same user.
#[derive(Debug, Clone)]
pub struct OrderPlacement {
    pub order: OrderDetails,
    pub created: bool,
}

/// `ORD-<unix millis>-<9 base36 chars>`
pub fn generate_order_number() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("ORD-{}-{}", Utc::now().timestamp_millis(), suffix)
}

fn validate_lines(
    items: &[OrderLineInput],
    total_amount: Decimal,
    payment_reference: &str,
) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::InvalidRequest(
            "Order must contain at least one item".to_string(),
        ));
    }
    if let Some(line) = items.iter().find(|line| line.quantity < 1) {
        return Err(ServiceError::InvalidRequest(format!(
            "Quantity for product {} must be at least 1",
            line.product_id
        )));
    }
    if let Some(line) = items
        .iter()
        .find(|line| line.price_at_purchase.is_sign_negative())
    {
        return Err(ServiceError::InvalidRequest(format!(
            "Price for product {} cannot be negative",
            line.product_id
        )));
    }
    if total_amount.is_sign_negative() {
        return Err(ServiceError::InvalidRequest(
            "Total amount cannot be negative".to_string(),
        ));
    }
    if payment_reference.is_empty() {
        return Err(ServiceError::InvalidRequest(
            "Payment reference is required".to_string(),
        ));
    }
    Ok(())
}

/// Total quantity per product, ordered by product id.
fn quantities_by_product(items: &[OrderLineInput]) -> BTreeMap<Uuid, i32> {
    let mut totals = BTreeMap::new();
    for line in items {
        let total: &mut i32 = totals.entry(line.product_id).or_insert(0);
        *total = total.saturating_add(line.quantity);
    }
    totals
}

/// Why a single attempt at the order unit of work did not commit.
#[derive(Debug)]
enum AttemptError {
    DuplicatePaymentReference,
    DuplicateOrderNumber,
    Failed(ServiceError),
}

impl From<ServiceError> for AttemptError {
    fn from(err: ServiceError) -> Self {
        AttemptError::Failed(err)
    }
}

fn storage_failure(err: DbErr) -> AttemptError {
    if let Some(SqlErr::UniqueConstraintViolation(message)) = err.sql_err() {
        if message.contains("payment_reference") {
            return AttemptError::DuplicatePaymentReference;
        }
        if message.contains("order_number") {
            return AttemptError::DuplicateOrderNumber;
        }
    }
    error!(error = %err, "Order transaction storage failure");
    AttemptError::Failed(ServiceError::TransactionFailure(err.to_string()))
}

/// Stock left for a product after its lines were decremented.
struct StockLevel {
    product_id: Uuid,
    remaining: i32,
}

/// Order transaction engine and order queries.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Places an order for a confirmed payment.
    ///
    /// Inserts the order and its items, decrements stock with a conditional update
    /// and clears the user's cart in one transaction. A line whose product no longer
    /// has enough stock aborts the whole unit with `StockConflict`.
    #[instrument(skip(self, items), fields(lines = items.len()))]
    pub async fn create_order(
        &self,
        user_id: Uuid,
        items: Vec<OrderLineInput>,
        total_amount: Decimal,
        payment_reference: &str,
    ) -> Result<OrderPlacement, ServiceError> {
        let payment_reference = payment_reference.trim();
        validate_lines(&items, total_amount, payment_reference)?;

        User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        if let Some(existing) = self.find_by_payment_reference(payment_reference).await? {
            return self.replay(existing, user_id).await;
        }

        let mut attempt = 0;
        let (order, stock_levels) = loop {
            attempt += 1;
            let order_number = generate_order_number();
            match self
                .write_order(user_id, &items, total_amount, payment_reference, &order_number)
                .await
            {
                Ok(written) => break written,
                Err(AttemptError::DuplicatePaymentReference) => {
                    let existing = self
                        .find_by_payment_reference(payment_reference)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::TransactionFailure(
                                "payment reference conflict without a stored order".to_string(),
                            )
                        })?;
                    return self.replay(existing, user_id).await;
                }
                Err(AttemptError::DuplicateOrderNumber) if attempt < MAX_ORDER_NUMBER_ATTEMPTS => {
                    warn!(%order_number, attempt, "Order number collision, retrying");
                }
                Err(AttemptError::DuplicateOrderNumber) => {
                    return Err(ServiceError::TransactionFailure(
                        "could not allocate a unique order number".to_string(),
                    ));
                }
                Err(AttemptError::Failed(e)) => return Err(e),
            }
        };

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            %total_amount,
            "Order created"
        );
        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: order.id,
                user_id,
                order_number: order.order_number.clone(),
            })
            .await;
        for level in stock_levels {
            self.event_sender
                .send_or_log(Event::StockDecremented {
                    product_id: level.product_id,
                    remaining: level.remaining,
                })
                .await;
        }

        let order = self.details(order).await?;
        Ok(OrderPlacement {
            order,
            created: true,
        })
    }

    /// Runs one attempt of the unit of work in its own transaction.
    async fn write_order(
        &self,
        user_id: Uuid,
        items: &[OrderLineInput],
        total_amount: Decimal,
        payment_reference: &str,
        order_number: &str,
    ) -> Result<(order::Model, Vec<StockLevel>), AttemptError> {
        let txn = self.db.begin().await.map_err(storage_failure)?;

        match Self::write_order_in(
            &txn,
            user_id,
            items,
            total_amount,
            payment_reference,
            order_number,
        )
        .await
        {
            Ok(written) => {
                txn.commit().await.map_err(storage_failure)?;
                Ok(written)
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    error!(error = %rollback, "Failed to roll back order transaction");
                }
                Err(e)
            }
        }
    }

    async fn write_order_in(
        txn: &DatabaseTransaction,
        user_id: Uuid,
        items: &[OrderLineInput],
        total_amount: Decimal,
        payment_reference: &str,
        order_number: &str,
    ) -> Result<(order::Model, Vec<StockLevel>), AttemptError> {
        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            order_number: Set(order_number.to_string()),
            total_amount: Set(total_amount),
            status: Set(OrderStatus::Pending),
            payment_reference: Set(payment_reference.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(txn)
        .await
        .map_err(storage_failure)?;

        // Rows are locked in ascending id order so two orders over the same products
        // cannot deadlock each other.
        let mut stock_levels = Vec::new();
        for (product_id, quantity) in quantities_by_product(items) {
            let remaining = Self::decrement_stock(txn, product_id, quantity).await?;
            stock_levels.push(StockLevel {
                product_id,
                remaining,
            });
        }

        for line in items {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                price_at_purchase: Set(line.price_at_purchase),
                created_at: Set(now),
            }
            .insert(txn)
            .await
            .map_err(storage_failure)?;
        }

        let cleared = CartEntry::delete_many()
            .filter(cart_entry::Column::UserId.eq(user_id))
            .exec(txn)
            .await
            .map_err(storage_failure)?;
        info!(order_id = %order.id, removed = cleared.rows_affected, "Cart cleared for order");

        Ok((order, stock_levels))
    }

    /// Takes `quantity` units only while at least that many remain. Returns the new stock.
    async fn decrement_stock(
        txn: &DatabaseTransaction,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<i32, AttemptError> {
        let result = Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::Stock.gte(quantity))
            .exec(txn)
            .await
            .map_err(storage_failure)?;

        let current = Product::find_by_id(product_id)
            .one(txn)
            .await
            .map_err(storage_failure)?;

        match current {
            None => Err(ServiceError::NotFound(format!("Product {} not found", product_id)).into()),
            Some(product) if result.rows_affected == 0 => {
                warn!(%product_id, available = product.stock, requested = quantity, "Stock conflict");
                Err(ServiceError::StockConflict(format!(
                    "Insufficient stock for {}: {} available, {} requested",
                    product.name, product.stock, quantity
                ))
                .into())
            }
            Some(product) => Ok(product.stock),
        }
    }

    async fn find_by_payment_reference(
        &self,
        payment_reference: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::PaymentReference.eq(payment_reference))
            .one(&*self.db)
            .await?)
    }

    async fn replay(
        &self,
        existing: order::Model,
        user_id: Uuid,
    ) -> Result<OrderPlacement, ServiceError> {
        if existing.user_id != user_id {
            warn!(order_id = %existing.id, "Payment reference already used by another user");
            return Err(ServiceError::Conflict(
                "Payment reference has already been used".to_string(),
            ));
        }
        info!(order_id = %existing.id, "Duplicate order submission, returning existing order");
        Ok(OrderPlacement {
            order: self.details(existing).await?,
            created: false,
        })
    }

    async fn details(&self, order: order::Model) -> Result<OrderDetails, ServiceError> {
        assemble(&*self.db, vec![order])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::InternalError("order vanished while loading".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, id: Uuid) -> Result<OrderDetails, ServiceError> {
        let order = Order::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
        self.details(order).await
    }

    /// Orders of one user, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OrderDetails>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        assemble(&*self.db, orders).await
    }

    /// Every order, newest first.
    #[instrument(skip(self))]
    pub async fn list_all_orders(&self) -> Result<Vec<OrderDetails>, ServiceError> {
        let orders = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        assemble(&*self.db, orders).await
    }

    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: Uuid,
        status: OrderStatus,
    ) -> Result<OrderDetails, ServiceError> {
        let order = Order::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let old_status = order.status;
        if old_status == status {
            return self.details(order).await;
        }
        ensure_transition(old_status, status)?;

        // Only moves the row if nobody changed its status since it was read.
        let result = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(status.into_value()))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(id))
            .filter(order::Column::Status.eq(old_status.into_value()))
            .exec(&*self.db)
            .await?;

        let current = Order::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        if result.rows_affected == 0 {
            warn!(order_id = %id, requested = %status, current = %current.status, "Concurrent status change");
            if current.status == status {
                return self.details(current).await;
            }
            ensure_transition(current.status, status)?;
            return Err(ServiceError::InvalidStatusTransition(format!(
                "Order status changed to {} while updating, retry the request",
                current.status
            )));
        }

        info!(order_id = %id, %old_status, new_status = %status, "Order status updated");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id: id,
                old_status,
                new_status: status,
            })
            .await;
        self.details(current).await
    }
}

fn ensure_transition(from: OrderStatus, to: OrderStatus) -> Result<(), ServiceError> {
    if from.is_terminal() {
        return Err(ServiceError::InvalidStatusTransition(format!(
            "Order is already {} and cannot change to {}",
            from, to
        )));
    }
    if !from.can_transition_to(to) {
        return Err(ServiceError::InvalidStatusTransition(format!(
            "Cannot change order status from {} to {}",
            from, to
        )));
    }
    Ok(())
}

/// Attaches users, items and product names to a batch of orders, keeping their order.
async fn assemble<C>(db: &C, orders: Vec<order::Model>) -> Result<Vec<OrderDetails>, ServiceError>
where
    C: ConnectionTrait,
{
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let users: Vec<Option<user::Model>> = orders.load_one(User, db).await?;
    let items: Vec<Vec<order_item::Model>> = orders.load_many(OrderItem, db).await?;

    let product_ids: Vec<Uuid> = items
        .iter()
        .flatten()
        .map(|item| item.product_id)
        .collect();
    let names: HashMap<Uuid, String> = Product::find()
        .filter(product::Column::Id.is_in(product_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();

    Ok(orders
        .into_iter()
        .zip(users)
        .zip(items)
        .map(|((order, user), mut items)| {
            items.sort_by_key(|item| item.created_at);
            OrderDetails {
                id: order.id,
                order_number: order.order_number,
                user_id: order.user_id,
                total_amount: order.total_amount,
                status: order.status,
                payment_reference: order.payment_reference,
                created_at: order.created_at,
                updated_at: order.updated_at,
                user: user.map(UserSummary::from),
                items: items
                    .into_iter()
                    .map(|item| OrderLine {
                        id: item.id,
                        product_id: item.product_id,
                        product_name: names.get(&item.product_id).cloned(),
                        quantity: item.quantity,
                        price_at_purchase: item.price_at_purchase,
                        line_total: item.price_at_purchase * Decimal::from(item.quantity),
                    })
                    .collect(),
            }
        })
        .collect())
}
