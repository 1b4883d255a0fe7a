#![allow(dead_code)]

use std::{str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseConnection, DbBackend, Set, Statement};
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};
use tower::ServiceExt;
use uuid::Uuid;

use spice_storefront::{
    build_router,
    config::AppConfig,
    db,
    entities::{product, promotion, promotion::PromotionStatus, user, user::UserRole},
    events::{process_events, EventProcessorConfig, EventSender},
    handlers::AppServices,
    notifications::{NotificationError, OrderNotifier},
    services::{
        catalog::CreateProductInput,
        orders::OrderDetails,
        payments::{PaymentGateway, SimulatedGateway},
        promotions::CreatePromotionInput,
        users::CreateUserInput,
    },
    AppState,
};

/// Notifier that remembers which order numbers it was asked to confirm.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: std::sync::Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl OrderNotifier for RecordingNotifier {
    async fn send_order_confirmation(
        &self,
        order: &OrderDetails,
    ) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .expect("notifier lock poisoned")
            .push(order.order_number.clone());
        Ok(())
    }
}

/// Application wired against SQLite.
///
/// `new` uses an in-memory database on a single connection so every query sees the
/// same data; that also serializes transactions. `file_backed` lifts that limit.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub gateway: SimulatedGateway,
    pub notifier: Arc<RecordingNotifier>,
    _event_task: JoinHandle<()>,
    _db_dir: Option<tempfile::TempDir>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_database("sqlite::memory:".to_string(), 1, None).await
    }

    /// Application on a SQLite file with a real connection pool, so transactions
    /// from different tasks actually overlap.
    pub async fn file_backed(max_connections: u32) -> Self {
        let dir = tempfile::TempDir::new().expect("failed to create temp dir");
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("storefront.db").display()
        );
        Self::with_database(url, max_connections, Some(dir)).await
    }

    async fn with_database(
        database_url: String,
        max_connections: u32,
        db_dir: Option<tempfile::TempDir>,
    ) -> Self {
        let mut cfg = AppConfig::new(database_url, "127.0.0.1".to_string(), 0, "test".to_string());
        cfg.db_max_connections = max_connections;
        cfg.db_min_connections = 1;
        cfg.db_acquire_timeout_secs = 30;
        cfg.cors_allow_any_origin = true;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to connect to in-memory sqlite");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(process_events(event_rx, EventProcessorConfig::default()));

        let gateway = SimulatedGateway::new("usd", false);
        let notifier = Arc::new(RecordingNotifier::default());
        let services = AppServices::new(
            db_arc.clone(),
            event_sender.clone(),
            Arc::new(gateway.clone()),
            notifier.clone(),
        );

        let state = AppState {
            db: db_arc,
            config: Arc::new(cfg),
            event_sender,
            services,
        };
        let router = build_router(state.clone());

        Self {
            router,
            state,
            gateway,
            notifier,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    /// Sends a request through the full middleware stack.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("failed to serialize request body"))
            }
            None => Body::empty(),
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Like [`TestApp::request`] but decodes the JSON body. Empty bodies become `Value::Null`.
    pub async fn request_json(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body).await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("response body is not JSON")
        };
        (status, json)
    }

    pub async fn execute_sql(&self, sql: &str) {
        self.db()
            .execute(Statement::from_string(DbBackend::Sqlite, sql.to_string()))
            .await
            .expect("raw sql failed");
    }

    pub async fn create_user(&self, email: &str) -> user::Model {
        self.services()
            .users
            .create_user(CreateUserInput {
                name: "Test Customer".to_string(),
                email: email.to_string(),
                password: "correct-horse-battery".to_string(),
                role: UserRole::Customer,
            })
            .await
            .expect("failed to create user")
    }

    /// Writes a customer row directly, skipping password hashing.
    pub async fn insert_user(&self, email: &str) -> user::Model {
        let now = Utc::now();
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("Race Customer".to_string()),
            email: Set(email.to_string()),
            password_hash: Set("not-a-real-hash".to_string()),
            role: Set(UserRole::Customer),
            address: Set(None),
            phone: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("failed to insert user")
    }

    pub async fn create_product(&self, name: &str, price: Decimal, stock: i32) -> product::Model {
        self.services()
            .products
            .create_product(CreateProductInput {
                name: name.to_string(),
                description: format!("{} for testing", name),
                price,
                image: String::new(),
                stock,
            })
            .await
            .expect("failed to create product")
    }

    pub async fn create_promotion(
        &self,
        code: &str,
        discount: i32,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        status: Option<PromotionStatus>,
    ) -> promotion::Model {
        self.services()
            .promotions
            .create_promotion(CreatePromotionInput {
                name: format!("{} promotion", code),
                code: code.to_string(),
                discount,
                start_date,
                end_date,
                status,
            })
            .await
            .expect("failed to create promotion")
    }

    /// Opens a payment intent for `amount` and confirms it, returning its reference.
    pub async fn confirmed_payment(&self, amount: Decimal, user_id: Uuid) -> String {
        let intent = self
            .gateway
            .create_intent(amount, user_id)
            .await
            .expect("failed to create payment intent");
        self.gateway
            .confirm(&intent.id)
            .expect("failed to confirm payment intent");
        intent.id
    }

    pub async fn product_stock(&self, product_id: Uuid) -> i32 {
        self.services()
            .products
            .get_product(product_id)
            .await
            .expect("product lookup failed")
            .stock
    }

    /// Lets spawned background tasks such as confirmation emails run.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Decimals are serialized as strings.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("not a decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("not a decimal number"),
        other => panic!("expected a decimal, got {other}"),
    }
}
