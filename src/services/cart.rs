use crate::{
    entities::{cart_entry, product, CartEntry, Product, User},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// A cart entry joined with the product it points at.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub price: Decimal,
    pub image: String,
    pub quantity: i32,
    pub stock: i32,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub user_id: Uuid,
    pub items: Vec<CartLine>,
    pub subtotal: Decimal,
}

/// Result of an add-to-cart: the entry and whether it was newly created.
#[derive(Debug, Clone)]
pub struct CartMutation {
    pub entry: cart_entry::Model,
    pub created: bool,
}

fn ensure_quantity(quantity: i32) -> Result<(), ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::InvalidQuantity(
            "Quantity must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn ensure_stock(product: &product::Model, requested: i32) -> Result<(), ServiceError> {
    if product.stock < requested {
        return Err(ServiceError::OutOfStock(format!(
            "Only {} of {} available",
            product.stock, product.name
        )));
    }
    Ok(())
}

/// Per-user cart store. Stock checks here are advisory; the order transaction re-checks.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let rows = CartEntry::find()
            .filter(cart_entry::Column::UserId.eq(user_id))
            .find_also_related(Product)
            .order_by_asc(cart_entry::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let items: Vec<CartLine> = rows
            .into_iter()
            .filter_map(|(entry, product)| {
                product.map(|product| CartLine {
                    id: entry.id,
                    product_id: product.id,
                    product_name: product.name,
                    price: product.price,
                    image: product.image,
                    quantity: entry.quantity,
                    stock: product.stock,
                })
            })
            .collect();
        let subtotal = items.iter().map(CartLine::line_total).sum();

        Ok(CartView {
            user_id,
            items,
            subtotal,
        })
    }

    /// Adds `quantity` of a product, merging with an existing entry for the same product.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartMutation, ServiceError> {
        ensure_quantity(quantity)?;

        User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        if let Some(entry) = self.find_entry(user_id, product_id).await? {
            return self.merge_into(entry, &product, quantity).await;
        }

        ensure_stock(&product, quantity)?;
        let now = Utc::now();
        let inserted = cart_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await;

        match inserted {
            Ok(entry) => {
                info!(cart_entry_id = %entry.id, "Added product to cart");
                Ok(CartMutation {
                    entry,
                    created: true,
                })
            }
            // A concurrent add created the line first; fold this quantity into it.
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                let entry = self
                    .find_entry(user_id, product_id)
                    .await?
                    .ok_or(ServiceError::DatabaseError(e))?;
                self.merge_into(entry, &product, quantity).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_entry(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<cart_entry::Model>, ServiceError> {
        Ok(CartEntry::find()
            .filter(cart_entry::Column::UserId.eq(user_id))
            .filter(cart_entry::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?)
    }

    /// Adds `quantity` to an existing line in one statement so concurrent adds all count.
    async fn merge_into(
        &self,
        entry: cart_entry::Model,
        product: &product::Model,
        quantity: i32,
    ) -> Result<CartMutation, ServiceError> {
        ensure_stock(product, entry.quantity.saturating_add(quantity))?;

        CartEntry::update_many()
            .col_expr(
                cart_entry::Column::Quantity,
                Expr::col(cart_entry::Column::Quantity).add(quantity),
            )
            .col_expr(cart_entry::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart_entry::Column::Id.eq(entry.id))
            .exec(&*self.db)
            .await?;

        let entry = CartEntry::find_by_id(entry.id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".to_string()))?;
        Ok(CartMutation {
            entry,
            created: false,
        })
    }

    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        cart_entry_id: Uuid,
        quantity: i32,
    ) -> Result<cart_entry::Model, ServiceError> {
        ensure_quantity(quantity)?;

        let (entry, product) = CartEntry::find_by_id(cart_entry_id)
            .find_also_related(Product)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".to_string()))?;
        let product =
            product.ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;
        ensure_stock(&product, quantity)?;

        let mut entry: cart_entry::ActiveModel = entry.into();
        entry.quantity = Set(quantity);
        entry.updated_at = Set(Utc::now());
        Ok(entry.update(&*self.db).await?)
    }

    /// Removing an entry that is already gone is not an error.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, cart_entry_id: Uuid) -> Result<(), ServiceError> {
        CartEntry::delete_by_id(cart_entry_id)
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Deletes every entry of the user and returns how many were removed.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let result = CartEntry::delete_many()
            .filter(cart_entry::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;

        self.event_sender
            .send_or_log(Event::CartCleared {
                user_id,
                removed: result.rows_affected,
            })
            .await;
        Ok(result.rows_affected)
    }
}
