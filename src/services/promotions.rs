use crate::{
    entities::{
        promotion::{self, PromotionStatus},
        Promotion,
    },
    errors::{PromotionRejection, ServiceError},
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Successful promo code check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPromotion {
    pub valid: bool,
    /// Percent off the subtotal
    pub discount: i32,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePromotionInput {
    #[validate(length(min = 1, max = 255, message = "Promotion name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 50, message = "Promotion code is required"))]
    pub code: String,
    #[validate(range(min = 1, max = 100, message = "Discount must be between 1 and 100"))]
    pub discount: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Overrides the status derived from the dates
    pub status: Option<PromotionStatus>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePromotionInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub code: Option<String>,
    #[validate(range(min = 1, max = 100, message = "Discount must be between 1 and 100"))]
    pub discount: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: Option<PromotionStatus>,
}

/// Canonical form of a promo code: trimmed and uppercased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// `subtotal` minus `discount_percent` percent, rounded half away from zero to cents.
pub fn discounted_total(subtotal: Decimal, discount_percent: i32) -> Decimal {
    let percent = Decimal::from(discount_percent.clamp(0, 100));
    let total = subtotal * (Decimal::ONE_HUNDRED - percent) / Decimal::ONE_HUNDRED;
    total.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Checks a promotion against `now`. The window is checked before the status.
pub fn evaluate(
    promotion: &promotion::Model,
    now: DateTime<Utc>,
) -> Result<AppliedPromotion, PromotionRejection> {
    if now < promotion.start_date {
        return Err(PromotionRejection::NotStarted);
    }
    if now > promotion.end_date {
        return Err(PromotionRejection::Expired);
    }
    let effective = promotion
        .status
        .reconcile(promotion.start_date, promotion.end_date, now);
    if effective != PromotionStatus::Active {
        return Err(PromotionRejection::Inactive);
    }

    Ok(AppliedPromotion {
        valid: true,
        discount: promotion.discount,
        code: promotion.code.clone(),
        name: promotion.name.clone(),
    })
}

fn ensure_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ServiceError> {
    if end < start {
        return Err(ServiceError::InvalidRequest(
            "End date must not be before start date".to_string(),
        ));
    }
    Ok(())
}

fn duplicate_code(err: DbErr) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            ServiceError::Conflict("Promotion code already exists".to_string())
        }
        _ => ServiceError::DatabaseError(err),
    }
}

/// Promo code validation and administration.
#[derive(Clone)]
pub struct PromotionService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl PromotionService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<promotion::Model>, ServiceError> {
        Ok(Promotion::find()
            .filter(promotion::Column::Code.eq(code))
            .one(&*self.db)
            .await?)
    }

    /// Read-only check of `code` at `now`.
    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<AppliedPromotion, ServiceError> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "Promo code is required".to_string(),
            ));
        }

        let promotion = self
            .find_by_code(&code)
            .await?
            .ok_or(ServiceError::PromotionInvalid(PromotionRejection::NotFound))?;

        evaluate(&promotion, now).map_err(ServiceError::PromotionInvalid)
    }

    /// All promotions, newest first.
    #[instrument(skip(self))]
    pub async fn list_promotions(&self) -> Result<Vec<promotion::Model>, ServiceError> {
        Ok(Promotion::find()
            .order_by_desc(promotion::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get_promotion(&self, id: Uuid) -> Result<promotion::Model, ServiceError> {
        Promotion::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Promotion not found".to_string()))
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create_promotion(
        &self,
        input: CreatePromotionInput,
    ) -> Result<promotion::Model, ServiceError> {
        input.validate()?;
        ensure_window(input.start_date, input.end_date)?;

        let code = normalize_code(&input.code);
        if self.find_by_code(&code).await?.is_some() {
            return Err(ServiceError::Conflict(
                "Promotion code already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let status = input
            .status
            .unwrap_or_else(|| PromotionStatus::for_window(input.start_date, input.end_date, now));

        let promotion = promotion::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            code: Set(code),
            discount: Set(input.discount),
            start_date: Set(input.start_date),
            end_date: Set(input.end_date),
            status: Set(status),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(duplicate_code)?;

        self.event_sender
            .send_or_log(Event::PromotionCreated(promotion.id))
            .await;
        info!(promotion_id = %promotion.id, code = %promotion.code, "Created promotion");
        Ok(promotion)
    }

    #[instrument(skip(self, input))]
    pub async fn update_promotion(
        &self,
        id: Uuid,
        input: UpdatePromotionInput,
    ) -> Result<promotion::Model, ServiceError> {
        input.validate()?;
        let existing = self.get_promotion(id).await?;

        let start = input.start_date.unwrap_or(existing.start_date);
        let end = input.end_date.unwrap_or(existing.end_date);
        ensure_window(start, end)?;

        let code = match input.code.as_deref() {
            Some(raw) => {
                let code = normalize_code(raw);
                if let Some(other) = self.find_by_code(&code).await? {
                    if other.id != id {
                        return Err(ServiceError::Conflict(
                            "Promotion code already exists".to_string(),
                        ));
                    }
                }
                Some(code)
            }
            None => None,
        };

        let dates_changed = start != existing.start_date || end != existing.end_date;
        let now = Utc::now();
        let mut promotion: promotion::ActiveModel = existing.into();
        if let Some(name) = input.name {
            promotion.name = Set(name.trim().to_string());
        }
        if let Some(code) = code {
            promotion.code = Set(code);
        }
        if let Some(discount) = input.discount {
            promotion.discount = Set(discount);
        }
        promotion.start_date = Set(start);
        promotion.end_date = Set(end);
        match input.status {
            Some(status) => promotion.status = Set(status),
            None if dates_changed => {
                promotion.status = Set(PromotionStatus::for_window(start, end, now))
            }
            None => {}
        }
        promotion.updated_at = Set(now);

        let updated = promotion.update(&*self.db).await.map_err(duplicate_code)?;
        self.event_sender
            .send_or_log(Event::PromotionUpdated(updated.id))
            .await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete_promotion(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = Promotion::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("Promotion not found".to_string()));
        }
        self.event_sender
            .send_or_log(Event::PromotionDeleted(id))
            .await;
        Ok(())
    }

    /// Persists the reconciled status of every promotion whose stored status drifted from its
    /// window. Returns the number of rows changed.
    #[instrument(skip(self))]
    pub async fn refresh_statuses(&self, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let mut changed = 0;
        for promotion in Promotion::find().all(&*self.db).await? {
            let reconciled =
                promotion
                    .status
                    .reconcile(promotion.start_date, promotion.end_date, now);
            if reconciled == promotion.status {
                continue;
            }
            let id = promotion.id;
            let mut active: promotion::ActiveModel = promotion.into();
            active.status = Set(reconciled);
            active.updated_at = Set(now);
            active.update(&*self.db).await?;
            info!(promotion_id = %id, status = ?reconciled, "Promotion status refreshed");
            changed += 1;
        }
        Ok(changed)
    }
}

/// Runs `refresh_statuses` on a fixed interval until the runtime shuts down.
pub fn spawn_status_refresher(
    service: PromotionService,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match service.refresh_statuses(Utc::now()).await {
                Ok(0) => {}
                Ok(changed) => info!(changed, "Promotion statuses refreshed"),
                Err(e) => warn!(error = %e, "Promotion status refresh failed"),
            }
        }
    })
}
