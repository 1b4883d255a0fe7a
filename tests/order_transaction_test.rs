mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use tokio::sync::Barrier;

use common::TestApp;
use spice_storefront::{
    entities::{cart_entry, order::OrderStatus, CartEntry, Order, OrderItem},
    errors::ServiceError,
    services::{
        catalog::UpdateProductInput,
        checkout::CreateOrderRequest,
        orders::OrderLineInput,
    },
};

fn line(product_id: uuid::Uuid, quantity: i32, price: rust_decimal::Decimal) -> OrderLineInput {
    OrderLineInput {
        product_id,
        quantity,
        price_at_purchase: price,
    }
}

#[tokio::test]
async fn checkout_with_promo_creates_discounted_order() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@spice.test").await;
    let saffron = app.create_product("Saffron Threads", dec!(12.50), 10).await;
    let now = Utc::now();
    app.create_promotion(
        "WELCOME15",
        15,
        now - Duration::days(1),
        now + Duration::days(30),
        None,
    )
    .await;

    app.services()
        .cart
        .add_item(user.id, saffron.id, 2)
        .await
        .unwrap();

    let session = app
        .services()
        .checkout
        .start_payment(user.id, Some("welcome15"))
        .await
        .unwrap();
    assert_eq!(session.quote.subtotal, dec!(25.00));
    assert_eq!(session.quote.discount_percent, 15);
    assert_eq!(session.quote.total, dec!(21.25));
    assert_eq!(session.quote.discount_amount, dec!(3.75));

    app.gateway.confirm(&session.payment_reference).unwrap();

    let placement = app
        .services()
        .checkout
        .place_order(CreateOrderRequest {
            user_id: user.id,
            cart_items: vec![line(saffron.id, 2, dec!(12.50))],
            total_amount: session.quote.total,
            payment_reference: session.payment_reference.clone(),
        })
        .await
        .unwrap();

    assert!(placement.created);
    let order = placement.order;
    assert_eq!(order.total_amount, dec!(21.25));
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(order.order_number.starts_with("ORD-"));
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].line_total, dec!(25.00));
    assert_eq!(order.user.as_ref().map(|u| u.email.as_str()), Some("buyer@spice.test"));

    assert_eq!(app.product_stock(saffron.id).await, 8);
    let cart = app.services().cart.get_cart(user.id).await.unwrap();
    assert!(cart.items.is_empty());

    app.settle().await;
    assert_eq!(app.notifier.sent(), vec![order.order_number]);
}

#[tokio::test]
async fn promo_checkout_over_two_products_decrements_each() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@spice.test").await;
    let saffron = app.create_product("Saffron Threads", dec!(10.00), 5).await;
    let anise = app.create_product("Star Anise", dec!(5.00), 1).await;
    let now = Utc::now();
    app.create_promotion(
        "WELCOME15",
        15,
        now - Duration::days(1),
        now + Duration::days(30),
        None,
    )
    .await;

    let cart = &app.services().cart;
    cart.add_item(user.id, saffron.id, 2).await.unwrap();
    cart.add_item(user.id, anise.id, 1).await.unwrap();

    let session = app
        .services()
        .checkout
        .start_payment(user.id, Some("WELCOME15"))
        .await
        .unwrap();
    assert_eq!(session.quote.subtotal, dec!(25.00));
    assert_eq!(session.quote.total, dec!(21.25));
    app.gateway.confirm(&session.payment_reference).unwrap();

    let order = app
        .services()
        .checkout
        .place_order(CreateOrderRequest {
            user_id: user.id,
            cart_items: vec![
                line(saffron.id, 2, dec!(10.00)),
                line(anise.id, 1, dec!(5.00)),
            ],
            total_amount: session.quote.total,
            payment_reference: session.payment_reference,
        })
        .await
        .unwrap()
        .order;

    assert_eq!(order.total_amount, dec!(21.25));
    assert_eq!(order.items.len(), 2);
    let mut prices: Vec<_> = order.items.iter().map(|i| i.price_at_purchase).collect();
    prices.sort();
    assert_eq!(prices, vec![dec!(5.00), dec!(10.00)]);

    assert_eq!(app.product_stock(saffron.id).await, 3);
    assert_eq!(app.product_stock(anise.id).await, 0);
    assert!(cart.get_cart(user.id).await.unwrap().items.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orders_for_last_unit_never_oversell() {
    let app = TestApp::new().await;
    let first = app.create_user("first@spice.test").await;
    let second = app.create_user("second@spice.test").await;
    let cardamom = app.create_product("Green Cardamom Pods", dec!(9.75), 1).await;

    let orders = app.services().orders.clone();
    let a = {
        let orders = orders.clone();
        let product_id = cardamom.id;
        tokio::spawn(async move {
            orders
                .create_order(first.id, vec![line(product_id, 1, dec!(9.75))], dec!(9.75), "pi_first")
                .await
        })
    };
    let b = {
        let orders = orders.clone();
        let product_id = cardamom.id;
        tokio::spawn(async move {
            orders
                .create_order(second.id, vec![line(product_id, 1, dec!(9.75))], dec!(9.75), "pi_second")
                .await
        })
    };

    let results = vec![a.await.unwrap(), b.await.unwrap()];
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    let failure = results.into_iter().find_map(Result::err).unwrap();
    assert_matches!(failure, ServiceError::StockConflict(_));

    assert_eq!(app.product_stock(cardamom.id).await, 0);
    assert_eq!(Order::find().count(app.db()).await.unwrap(), 1);
    assert_eq!(OrderItem::find().count(app.db()).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn pooled_connections_sell_exactly_the_available_stock() {
    const BUYERS: usize = 20;
    let app = TestApp::file_backed(8).await;
    let saffron = app.create_product("Saffron Threads", dec!(12.50), 5).await;
    let barrier = Arc::new(Barrier::new(BUYERS));

    let mut tasks = Vec::new();
    for n in 0..BUYERS {
        let buyer = app.insert_user(&format!("buyer{n}@spice.test")).await;
        let orders = app.services().orders.clone();
        let barrier = barrier.clone();
        let product_id = saffron.id;
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            orders
                .create_order(
                    buyer.id,
                    vec![line(product_id, 1, dec!(12.50))],
                    dec!(12.50),
                    &format!("pi_rush_{n}"),
                )
                .await
        }));
    }

    let (mut sold, mut conflicts) = (0, 0);
    for task in tasks {
        match task.await.unwrap() {
            Ok(placement) => {
                assert!(placement.created);
                sold += 1;
            }
            Err(ServiceError::StockConflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected checkout failure: {other}"),
        }
    }

    assert_eq!(sold, 5);
    assert_eq!(conflicts, BUYERS - 5);
    assert_eq!(app.product_stock(saffron.id).await, 0);
    assert_eq!(Order::find().count(app.db()).await.unwrap(), 5);
    assert_eq!(OrderItem::find().count(app.db()).await.unwrap(), 5);
}

#[tokio::test]
async fn insufficient_stock_on_any_line_rolls_back_everything() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@spice.test").await;
    let cumin = app.create_product("Ground Cumin", dec!(4.25), 5).await;
    let anise = app.create_product("Star Anise", dec!(6.25), 1).await;

    let err = app
        .services()
        .orders
        .create_order(
            user.id,
            vec![line(cumin.id, 2, dec!(4.25)), line(anise.id, 3, dec!(6.25))],
            dec!(27.25),
            "pi_partial",
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::StockConflict(ref msg) if msg.contains("Star Anise"));
    assert_eq!(app.product_stock(cumin.id).await, 5);
    assert_eq!(app.product_stock(anise.id).await, 1);
    assert_eq!(Order::find().count(app.db()).await.unwrap(), 0);
    assert_eq!(OrderItem::find().count(app.db()).await.unwrap(), 0);
}

#[tokio::test]
async fn storage_failure_mid_transaction_leaves_no_partial_order() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@spice.test").await;
    let paprika = app.create_product("Smoked Paprika", dec!(6.50), 10).await;

    // Clearing the cart is the last write of the unit; make it fail.
    app.execute_sql("DROP TABLE carts").await;

    let err = app
        .services()
        .orders
        .create_order(user.id, vec![line(paprika.id, 3, dec!(6.50))], dec!(19.50), "pi_broken")
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::TransactionFailure(_));
    assert_eq!(app.product_stock(paprika.id).await, 10);
    assert_eq!(Order::find().count(app.db()).await.unwrap(), 0);
    assert_eq!(OrderItem::find().count(app.db()).await.unwrap(), 0);
}

#[tokio::test]
async fn repeated_payment_reference_returns_existing_order() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@spice.test").await;
    let pepper = app.create_product("Tellicherry Peppercorns", dec!(5.49), 10).await;
    let items = vec![line(pepper.id, 2, dec!(5.49))];

    let first = app
        .services()
        .orders
        .create_order(user.id, items.clone(), dec!(10.98), "pi_replay")
        .await
        .unwrap();
    let second = app
        .services()
        .orders
        .create_order(user.id, items, dec!(10.98), "pi_replay")
        .await
        .unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.order.id, second.order.id);
    assert_eq!(app.product_stock(pepper.id).await, 8);
    assert_eq!(Order::find().count(app.db()).await.unwrap(), 1);
}

#[tokio::test]
async fn payment_reference_of_another_user_is_rejected() {
    let app = TestApp::new().await;
    let owner = app.create_user("owner@spice.test").await;
    let other = app.create_user("other@spice.test").await;
    let pepper = app.create_product("Tellicherry Peppercorns", dec!(5.49), 10).await;

    app.services()
        .orders
        .create_order(owner.id, vec![line(pepper.id, 1, dec!(5.49))], dec!(5.49), "pi_owned")
        .await
        .unwrap();
    let err = app
        .services()
        .orders
        .create_order(other.id, vec![line(pepper.id, 1, dec!(5.49))], dec!(5.49), "pi_owned")
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::Conflict(_));
    assert_eq!(app.product_stock(pepper.id).await, 9);
}

#[tokio::test]
async fn price_at_purchase_survives_catalog_price_changes() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@spice.test").await;
    let saffron = app.create_product("Saffron Threads", dec!(12.50), 10).await;

    let placement = app
        .services()
        .orders
        .create_order(user.id, vec![line(saffron.id, 1, dec!(12.50))], dec!(12.50), "pi_price")
        .await
        .unwrap();

    app.services()
        .products
        .update_product(
            saffron.id,
            UpdateProductInput {
                price: Some(dec!(15.00)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let order = app
        .services()
        .orders
        .get_order(placement.order.id)
        .await
        .unwrap();
    assert_eq!(order.items[0].price_at_purchase, dec!(12.50));
    assert_eq!(order.items[0].product_name.as_deref(), Some("Saffron Threads"));
    assert_eq!(order.total_amount, dec!(12.50));
}

#[tokio::test]
async fn unconfirmed_payment_does_not_touch_stock() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@spice.test").await;
    let cinnamon = app.create_product("Ceylon Cinnamon", dec!(7.99), 4).await;
    app.services()
        .cart
        .add_item(user.id, cinnamon.id, 1)
        .await
        .unwrap();

    let session = app
        .services()
        .checkout
        .start_payment(user.id, None)
        .await
        .unwrap();

    let err = app
        .services()
        .checkout
        .place_order(CreateOrderRequest {
            user_id: user.id,
            cart_items: vec![line(cinnamon.id, 1, dec!(7.99))],
            total_amount: dec!(7.99),
            payment_reference: session.payment_reference,
        })
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::PaymentNotConfirmed(_));
    assert_eq!(app.product_stock(cinnamon.id).await, 4);
    assert_eq!(Order::find().count(app.db()).await.unwrap(), 0);
    let entries = CartEntry::find()
        .filter(cart_entry::Column::UserId.eq(user.id))
        .count(app.db())
        .await
        .unwrap();
    assert_eq!(entries, 1);
}

#[tokio::test]
async fn payment_for_a_different_total_is_rejected() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@spice.test").await;
    let cinnamon = app.create_product("Ceylon Cinnamon", dec!(7.99), 4).await;
    let reference = app.confirmed_payment(dec!(1.00), user.id).await;

    let err = app
        .services()
        .checkout
        .place_order(CreateOrderRequest {
            user_id: user.id,
            cart_items: vec![line(cinnamon.id, 1, dec!(7.99))],
            total_amount: dec!(7.99),
            payment_reference: reference,
        })
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::PaymentNotConfirmed(_));
    assert_eq!(app.product_stock(cinnamon.id).await, 4);
}

#[tokio::test]
async fn malformed_orders_are_rejected_before_any_write() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@spice.test").await;
    let cumin = app.create_product("Ground Cumin", dec!(4.25), 5).await;
    let orders = &app.services().orders;

    let empty = orders
        .create_order(user.id, vec![], dec!(0), "pi_empty")
        .await
        .unwrap_err();
    assert_matches!(empty, ServiceError::InvalidRequest(_));

    let zero_quantity = orders
        .create_order(user.id, vec![line(cumin.id, 0, dec!(4.25))], dec!(0), "pi_zero")
        .await
        .unwrap_err();
    assert_matches!(zero_quantity, ServiceError::InvalidRequest(_));

    let unknown_user = orders
        .create_order(
            uuid::Uuid::new_v4(),
            vec![line(cumin.id, 1, dec!(4.25))],
            dec!(4.25),
            "pi_ghost",
        )
        .await
        .unwrap_err();
    assert_matches!(unknown_user, ServiceError::NotFound(_));

    let unknown_product = orders
        .create_order(
            user.id,
            vec![line(uuid::Uuid::new_v4(), 1, dec!(4.25))],
            dec!(4.25),
            "pi_missing",
        )
        .await
        .unwrap_err();
    assert_matches!(unknown_product, ServiceError::NotFound(_));

    assert_eq!(app.product_stock(cumin.id).await, 5);
    assert_eq!(Order::find().count(app.db()).await.unwrap(), 0);
}

#[tokio::test]
async fn status_follows_the_lifecycle() {
    let app = TestApp::new().await;
    let user = app.create_user("buyer@spice.test").await;
    let cumin = app.create_product("Ground Cumin", dec!(4.25), 5).await;
    let placement = app
        .services()
        .orders
        .create_order(user.id, vec![line(cumin.id, 1, dec!(4.25))], dec!(4.25), "pi_status")
        .await
        .unwrap();
    let id = placement.order.id;
    let orders = &app.services().orders;

    let skipped = orders
        .update_status(id, OrderStatus::Completed)
        .await
        .unwrap_err();
    assert_matches!(skipped, ServiceError::InvalidStatusTransition(_));

    let processing = orders
        .update_status(id, OrderStatus::Processing)
        .await
        .unwrap();
    assert_eq!(processing.status, OrderStatus::Processing);

    let unchanged = orders
        .update_status(id, OrderStatus::Processing)
        .await
        .unwrap();
    assert_eq!(unchanged.status, OrderStatus::Processing);

    let completed = orders
        .update_status(id, OrderStatus::Completed)
        .await
        .unwrap();
    assert_eq!(completed.status, OrderStatus::Completed);

    let reopened = orders
        .update_status(id, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert_matches!(reopened, ServiceError::InvalidStatusTransition(_));

    // Cancelling does not return stock.
    assert_eq!(app.product_stock(cumin.id).await, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_status_changes_leave_a_single_outcome() {
    let app = TestApp::file_backed(4).await;
    let user = app.insert_user("racer@spice.test").await;
    let cumin = app.create_product("Ground Cumin", dec!(4.25), 50).await;
    let orders = app.services().orders.clone();

    for round in 0..10 {
        let id = orders
            .create_order(
                user.id,
                vec![line(cumin.id, 1, dec!(4.25))],
                dec!(4.25),
                &format!("pi_race_{round}"),
            )
            .await
            .unwrap()
            .order
            .id;
        orders.update_status(id, OrderStatus::Processing).await.unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let change = |target: OrderStatus| {
            let orders = orders.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                orders.update_status(id, target).await
            })
        };
        let completing = change(OrderStatus::Completed);
        let cancelling = change(OrderStatus::Cancelled);
        let outcomes = vec![
            (OrderStatus::Completed, completing.await.unwrap()),
            (OrderStatus::Cancelled, cancelling.await.unwrap()),
        ];

        let winners: Vec<OrderStatus> = outcomes
            .iter()
            .filter(|(_, result)| result.is_ok())
            .map(|(target, _)| *target)
            .collect();
        assert_eq!(winners.len(), 1, "round {round}: {winners:?}");
        let loser = outcomes.into_iter().find_map(|(_, r)| r.err()).unwrap();
        assert_matches!(loser, ServiceError::InvalidStatusTransition(_));

        let stored = orders.get_order(id).await.unwrap();
        assert_eq!(stored.status, winners[0]);
    }
}

#[tokio::test]
async fn orders_are_listed_per_user_newest_first() {
    let app = TestApp::new().await;
    let alice = app.create_user("alice@spice.test").await;
    let bob = app.create_user("bob@spice.test").await;
    let cumin = app.create_product("Ground Cumin", dec!(4.25), 10).await;
    let orders = &app.services().orders;

    let first = orders
        .create_order(alice.id, vec![line(cumin.id, 1, dec!(4.25))], dec!(4.25), "pi_a1")
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = orders
        .create_order(alice.id, vec![line(cumin.id, 2, dec!(4.25))], dec!(8.50), "pi_a2")
        .await
        .unwrap();
    orders
        .create_order(bob.id, vec![line(cumin.id, 1, dec!(4.25))], dec!(4.25), "pi_b1")
        .await
        .unwrap();

    let mine = orders.list_orders_for_user(alice.id).await.unwrap();
    let ids: Vec<_> = mine.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![second.order.id, first.order.id]);
    assert!(mine.iter().all(|o| o.user_id == alice.id));

    let all = orders.list_all_orders().await.unwrap();
    assert_eq!(all.len(), 3);
}
