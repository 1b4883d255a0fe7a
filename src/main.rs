use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tracing::{error, info, warn};

use spice_storefront as api;
use spice_storefront::{
    notifications::{LogNotifier, OrderNotifier, ResendEmailNotifier},
    services::payments::{PaymentGateway, SimulatedGateway, StripeGateway},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity.max(1));
    let event_sender = Arc::new(api::events::EventSender::new(event_tx));
    tokio::spawn(api::events::process_events(
        event_rx,
        api::events::EventProcessorConfig {
            low_stock_threshold: cfg.low_stock_threshold,
        },
    ));

    let gateway: Arc<dyn PaymentGateway> = if cfg.uses_stripe() {
        let key = cfg.stripe_secret_key.clone().unwrap_or_default();
        Arc::new(
            StripeGateway::new(key, cfg.default_currency.clone())
                .context("failed to build Stripe client")?,
        )
    } else {
        warn!("Using the simulated payment gateway; no real charges are made");
        Arc::new(SimulatedGateway::new(
            cfg.default_currency.clone(),
            cfg.simulated_auto_confirm,
        ))
    };
    info!(gateway = gateway.name(), "Payment gateway ready");

    let notifier: Arc<dyn OrderNotifier> = if cfg.uses_resend() {
        let key = cfg.resend_api_key.clone().unwrap_or_default();
        Arc::new(
            ResendEmailNotifier::new(key, cfg.notification_from_address.clone())
                .context("failed to build Resend client")?,
        )
    } else {
        Arc::new(LogNotifier)
    };

    // Aggregate app services used by HTTP handlers
    let services =
        api::handlers::AppServices::new(db_arc.clone(), event_sender.clone(), gateway, notifier);

    if cfg.promotion_refresh_interval_secs > 0 {
        api::services::promotions::spawn_status_refresher(
            (*services.promotions).clone(),
            Duration::from_secs(cfg.promotion_refresh_interval_secs),
        );
    }

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", cfg.host, cfg.port))?;

    // Compose shared app state
    let app_state = api::AppState {
        db: db_arc,
        config: Arc::new(cfg),
        event_sender,
        services,
    };
    let app = api::build_router(app_state);

    info!("spice-storefront listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
