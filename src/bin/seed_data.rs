//! Seed data script - populates the database with demo users, spices and promotions
//!
//! Run with: cargo run --bin seed-data
//!
//! Safe to run repeatedly: users, products and promo codes that already exist are skipped.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use clap::Parser;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::{collections::HashSet, sync::Arc};
use tokio::sync::mpsc;
use tracing::info;

use spice_storefront::{
    config,
    db::{self, DbConfig},
    entities::{promotion::PromotionStatus, user::UserRole},
    errors::ServiceError,
    events::{process_events, EventProcessorConfig, EventSender},
    services::{
        catalog::{CreateProductInput, ProductService},
        promotions::{CreatePromotionInput, PromotionService},
        users::{CreateUserInput, UserService},
    },
};

#[derive(Debug, Parser)]
#[command(name = "seed-data", about = "Populate the storefront database with demo data")]
struct Cli {
    /// Database URL; defaults to the configured `database_url`
    #[arg(long)]
    database_url: Option<String>,

    /// Do not run migrations before seeding
    #[arg(long)]
    skip_migrations: bool,

    /// Password for the demo accounts
    #[arg(long, default_value = "spice-demo-123")]
    password: String,
}

fn catalog() -> Vec<(&'static str, &'static str, Decimal, i32)> {
    vec![
        ("Saffron Threads", "Hand-picked Persian saffron, 1g tin.", dec!(12.50), 40),
        ("Smoked Paprika", "Spanish pimenton de la Vera, sweet and smoky.", dec!(6.50), 120),
        ("Ground Cumin", "Earthy toasted cumin from Rajasthan.", dec!(4.25), 150),
        ("Ceylon Cinnamon", "True cinnamon quills from Sri Lanka.", dec!(7.99), 80),
        ("Green Cardamom Pods", "Whole pods from Kerala.", dec!(9.75), 60),
        ("Tellicherry Peppercorns", "Bold black pepper, extra large grade.", dec!(5.49), 200),
        ("Turmeric Powder", "Bright high-curcumin turmeric.", dec!(4.99), 15),
        ("Star Anise", "Whole stars with a sweet licorice note.", dec!(6.25), 0),
    ]
}

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s)
        .single()
        .with_context(|| format!("invalid date {y}-{m}-{d}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();
    let cli = Cli::parse();

    info!("=== Spice Storefront Seed Data ===");

    let db_config = match cli.database_url {
        Some(url) => DbConfig {
            url,
            ..DbConfig::default()
        },
        None => DbConfig::from(&config::load_config()?),
    };
    info!("Connecting to database: {}", db_config.url);
    let pool = Arc::new(db::establish_connection_with_config(&db_config).await?);
    if !cli.skip_migrations {
        db::run_migrations(&pool).await?;
    }

    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(process_events(rx, EventProcessorConfig::default()));
    let events = Arc::new(EventSender::new(tx));

    let users = UserService::new(pool.clone());
    let products = ProductService::new(pool.clone(), events.clone());
    let promotions = PromotionService::new(pool.clone(), events);

    info!("Creating users...");
    let accounts = [
        ("Store Admin", "admin@spice.shop", UserRole::Admin),
        ("Demo Customer", "customer@spice.shop", UserRole::Customer),
    ];
    for (name, email, role) in accounts {
        let input = CreateUserInput {
            name: name.to_string(),
            email: email.to_string(),
            password: cli.password.clone(),
            role,
        };
        match users.create_user(input).await {
            Ok(user) => info!("  Created {} ({})", user.email, user.id),
            Err(ServiceError::Conflict(_)) => info!("  Skipped {} (exists)", email),
            Err(e) => return Err(e.into()),
        }
    }

    info!("Creating products...");
    let existing: HashSet<String> = products
        .list_products()
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();
    for (name, description, price, stock) in catalog() {
        if existing.contains(name) {
            info!("  Skipped {} (exists)", name);
            continue;
        }
        let product = products
            .create_product(CreateProductInput {
                name: name.to_string(),
                description: description.to_string(),
                price,
                image: format!("/images/{}.jpg", name.to_lowercase().replace(' ', "-")),
                stock,
            })
            .await?;
        info!("  Created {} at ${} ({} in stock)", product.name, product.price, product.stock);
    }

    info!("Creating promotions...");
    let promos = [
        (
            "Summer Spice Sale",
            "SUMMER20",
            20,
            utc(2024, 6, 1, 0, 0, 0)?,
            utc(2024, 8, 31, 23, 59, 59)?,
            PromotionStatus::Active,
        ),
        (
            "Welcome Discount",
            "WELCOME15",
            15,
            utc(2024, 1, 1, 0, 0, 0)?,
            utc(2024, 12, 31, 23, 59, 59)?,
            PromotionStatus::Active,
        ),
        (
            "Holiday Special",
            "HOLIDAY25",
            25,
            utc(2024, 12, 1, 0, 0, 0)?,
            utc(2024, 12, 31, 23, 59, 59)?,
            PromotionStatus::Scheduled,
        ),
    ];
    for (name, code, discount, start_date, end_date, status) in promos {
        let input = CreatePromotionInput {
            name: name.to_string(),
            code: code.to_string(),
            discount,
            start_date,
            end_date,
            status: Some(status),
        };
        match promotions.create_promotion(input).await {
            Ok(promotion) => info!("  Created {} ({}% off)", promotion.code, promotion.discount),
            Err(ServiceError::Conflict(_)) => info!("  Skipped {} (exists)", code),
            Err(e) => return Err(e.into()),
        }
    }

    info!("=== Seed Data Complete ===");
    info!("Try: curl http://localhost:8080/api/v1/products");
    Ok(())
}
