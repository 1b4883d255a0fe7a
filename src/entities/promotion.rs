use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Percentage discount identified by an uppercase code.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "promotions")]
#[serde(rename_all = "camelCase")]
#[schema(as = Promotion)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub code: String,
    /// Percent off the subtotal, 1..=100
    pub discount: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: PromotionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionStatus {
    #[sea_orm(string_value = "SCHEDULED")]
    Scheduled,
    #[sea_orm(string_value = "ACTIVE")]
    Active,
    #[sea_orm(string_value = "EXPIRED")]
    Expired,
}

impl PromotionStatus {
    /// Status implied purely by the validity window.
    pub fn for_window(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if start > now {
            Self::Scheduled
        } else if end < now {
            Self::Expired
        } else {
            Self::Active
        }
    }

    /// Brings a stored status in line with the window at `now`.
    ///
    /// The window always wins for the edges: once `end` has passed the promotion is expired, a
    /// scheduled one becomes active when `start` arrives, and an active one whose start moved
    /// into the future goes back to scheduled. `Expired` inside the window is kept, which is how
    /// an admin switches a running promotion off.
    pub fn reconcile(self, start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now > end {
            return Self::Expired;
        }
        match self {
            Self::Scheduled if now >= start => Self::Active,
            Self::Active if now < start => Self::Scheduled,
            other => other,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::PromotionStatus::{self, *};
    use chrono::{DateTime, TimeZone, Utc};
    use rstest::rstest;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, 12, 0, 0).unwrap()
    }

    #[rstest]
    #[case(day(1), Scheduled)]
    #[case(day(10), Active)]
    #[case(day(20), Active)]
    #[case(day(21), Expired)]
    fn window_status(#[case] now: DateTime<Utc>, #[case] expected: PromotionStatus) {
        assert_eq!(PromotionStatus::for_window(day(10), day(20), now), expected);
    }

    #[rstest]
    #[case(Scheduled, day(12), Active)]
    #[case(Scheduled, day(5), Scheduled)]
    #[case(Active, day(5), Scheduled)]
    #[case(Active, day(25), Expired)]
    #[case(Expired, day(12), Expired)]
    #[case(Active, day(12), Active)]
    fn reconcile(
        #[case] stored: PromotionStatus,
        #[case] now: DateTime<Utc>,
        #[case] expected: PromotionStatus,
    ) {
        assert_eq!(stored.reconcile(day(10), day(20), now), expected);
    }
}
