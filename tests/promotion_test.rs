mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;

use common::TestApp;
use spice_storefront::{
    entities::promotion::PromotionStatus,
    errors::{PromotionRejection, ServiceError},
    services::promotions::UpdatePromotionInput,
};

#[tokio::test]
async fn validation_reports_why_a_code_is_unusable() {
    let app = TestApp::new().await;
    let now = Utc::now();
    app.create_promotion(
        "SUMMER20",
        20,
        now - Duration::days(10),
        now + Duration::days(10),
        None,
    )
    .await;
    app.create_promotion(
        "HOLIDAY25",
        25,
        now + Duration::days(5),
        now + Duration::days(30),
        None,
    )
    .await;
    app.create_promotion(
        "SPRING10",
        10,
        now - Duration::days(60),
        now - Duration::days(30),
        None,
    )
    .await;
    app.create_promotion(
        "PAUSED5",
        5,
        now - Duration::days(1),
        now + Duration::days(1),
        Some(PromotionStatus::Expired),
    )
    .await;
    let promotions = &app.services().promotions;

    let applied = promotions.validate(" summer20 ", now).await.unwrap();
    assert!(applied.valid);
    assert_eq!(applied.discount, 20);
    assert_eq!(applied.code, "SUMMER20");

    assert_matches!(
        promotions.validate("HOLIDAY25", now).await,
        Err(ServiceError::PromotionInvalid(PromotionRejection::NotStarted))
    );
    assert_matches!(
        promotions.validate("SPRING10", now).await,
        Err(ServiceError::PromotionInvalid(PromotionRejection::Expired))
    );
    assert_matches!(
        promotions.validate("PAUSED5", now).await,
        Err(ServiceError::PromotionInvalid(PromotionRejection::Inactive))
    );
    assert_matches!(
        promotions.validate("NOPE", now).await,
        Err(ServiceError::PromotionInvalid(PromotionRejection::NotFound))
    );
    assert_matches!(
        promotions.validate("   ", now).await,
        Err(ServiceError::InvalidRequest(_))
    );
}

#[tokio::test]
async fn scheduled_promotion_becomes_usable_when_its_window_opens() {
    let app = TestApp::new().await;
    let now = Utc::now();
    let start = now + Duration::hours(1);
    let promo = app
        .create_promotion("LATER15", 15, start, now + Duration::days(2), None)
        .await;
    assert_eq!(promo.status, PromotionStatus::Scheduled);

    let later = start + Duration::minutes(1);
    let applied = app
        .services()
        .promotions
        .validate("LATER15", later)
        .await
        .unwrap();
    assert_eq!(applied.discount, 15);
}

#[tokio::test]
async fn codes_are_unique_case_insensitively() {
    let app = TestApp::new().await;
    let now = Utc::now();
    let end = now + Duration::days(1);
    let first = app.create_promotion("welcome15", 15, now, end, None).await;
    assert_eq!(first.code, "WELCOME15");

    let promotions = &app.services().promotions;
    let duplicate = promotions
        .create_promotion(spice_storefront::services::promotions::CreatePromotionInput {
            name: "Copy".to_string(),
            code: "Welcome15".to_string(),
            discount: 10,
            start_date: now,
            end_date: end,
            status: None,
        })
        .await
        .unwrap_err();
    assert_matches!(duplicate, ServiceError::Conflict(_));

    let other = app.create_promotion("SUMMER20", 20, now, end, None).await;
    let renamed = promotions
        .update_promotion(
            other.id,
            UpdatePromotionInput {
                code: Some("welcome15".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(renamed, ServiceError::Conflict(_));

    // Keeping its own code is not a conflict.
    let same = promotions
        .update_promotion(
            first.id,
            UpdatePromotionInput {
                code: Some("WELCOME15".to_string()),
                discount: Some(20),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(same.discount, 20);
}

#[tokio::test]
async fn invalid_promotions_are_rejected() {
    let app = TestApp::new().await;
    let now = Utc::now();
    let promotions = &app.services().promotions;
    let input = |discount: i32, end| spice_storefront::services::promotions::CreatePromotionInput {
        name: "Broken".to_string(),
        code: "BROKEN".to_string(),
        discount,
        start_date: now,
        end_date: end,
        status: None,
    };

    assert_matches!(
        promotions.create_promotion(input(150, now + Duration::days(1))).await,
        Err(ServiceError::ValidationError(_))
    );
    assert_matches!(
        promotions.create_promotion(input(10, now - Duration::days(1))).await,
        Err(ServiceError::InvalidRequest(_))
    );
}

#[tokio::test]
async fn moving_the_window_rederives_status() {
    let app = TestApp::new().await;
    let now = Utc::now();
    let promo = app
        .create_promotion("MOVE10", 10, now - Duration::days(1), now + Duration::days(1), None)
        .await;
    assert_eq!(promo.status, PromotionStatus::Active);

    let moved = app
        .services()
        .promotions
        .update_promotion(
            promo.id,
            UpdatePromotionInput {
                start_date: Some(now + Duration::days(3)),
                end_date: Some(now + Duration::days(5)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.status, PromotionStatus::Scheduled);
}

#[tokio::test]
async fn refresh_persists_reconciled_statuses() {
    let app = TestApp::new().await;
    let now = Utc::now();
    let lapsed = app
        .create_promotion(
            "LAPSED",
            10,
            now - Duration::days(30),
            now - Duration::days(1),
            Some(PromotionStatus::Active),
        )
        .await;
    let due = app
        .create_promotion(
            "DUE",
            10,
            now - Duration::hours(1),
            now + Duration::days(1),
            Some(PromotionStatus::Scheduled),
        )
        .await;
    let paused = app
        .create_promotion(
            "PAUSED",
            10,
            now - Duration::hours(1),
            now + Duration::days(1),
            Some(PromotionStatus::Expired),
        )
        .await;
    let promotions = &app.services().promotions;

    assert_eq!(promotions.refresh_statuses(now).await.unwrap(), 2);
    assert_eq!(
        promotions.get_promotion(lapsed.id).await.unwrap().status,
        PromotionStatus::Expired
    );
    assert_eq!(
        promotions.get_promotion(due.id).await.unwrap().status,
        PromotionStatus::Active
    );
    assert_eq!(
        promotions.get_promotion(paused.id).await.unwrap().status,
        PromotionStatus::Expired
    );

    assert_eq!(promotions.refresh_statuses(now).await.unwrap(), 0);
}

#[tokio::test]
async fn delete_and_lookup() {
    let app = TestApp::new().await;
    let now = Utc::now();
    let promo = app
        .create_promotion("GONE", 10, now, now + Duration::days(1), None)
        .await;
    let promotions = &app.services().promotions;

    assert_eq!(promotions.list_promotions().await.unwrap().len(), 1);
    promotions.delete_promotion(promo.id).await.unwrap();
    assert_matches!(
        promotions.get_promotion(promo.id).await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        promotions.delete_promotion(promo.id).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn quote_applies_summer_discount() {
    let app = TestApp::new().await;
    let now = Utc::now();
    app.create_promotion("SUMMER20", 20, now - Duration::days(1), now + Duration::days(1), None)
        .await;
    let user = app.create_user("quote@spice.test").await;
    let paprika = app.create_product("Smoked Paprika", dec!(6.50), 10).await;
    app.services()
        .cart
        .add_item(user.id, paprika.id, 3)
        .await
        .unwrap();

    let quote = app
        .services()
        .checkout
        .quote(user.id, Some("SUMMER20"))
        .await
        .unwrap();
    assert_eq!(quote.subtotal, dec!(19.50));
    assert_eq!(quote.total, dec!(15.60));
    assert_eq!(quote.discount_amount, dec!(3.90));
    assert_eq!(quote.promo_code.as_deref(), Some("SUMMER20"));

    let unknown = app
        .services()
        .checkout
        .quote(user.id, Some("BOGUS"))
        .await
        .unwrap_err();
    assert_matches!(unknown, ServiceError::PromotionInvalid(PromotionRejection::NotFound));
}
