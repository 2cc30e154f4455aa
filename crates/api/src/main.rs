//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use checkout::{CheckoutService, PayHeroGateway, TracingNotifier};
use order_store::{PostgresOrderStore, PostgresProductCatalog};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    init_tracing(&config);

    if let Err(err) = config.validate() {
        tracing::error!(error = %err, "invalid configuration");
        std::process::exit(1);
    }

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Connect to PostgreSQL and apply migrations
    let database_url = config
        .database_url
        .as_deref()
        .expect("DATABASE_URL checked by validate");
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(database_url)
        .await
        .expect("failed to connect to database");
    let store = PostgresOrderStore::new(pool.clone());
    store.run_migrations().await.expect("migrations failed");
    let catalog = PostgresProductCatalog::new(pool);

    // 4. Wire the checkout workflow
    let gateway = PayHeroGateway::new(config.payhero()).expect("failed to build PayHero client");
    let checkout = CheckoutService::new(
        Arc::new(store),
        Arc::new(catalog),
        Arc::new(gateway),
        Arc::new(TracingNotifier),
    );
    let state = Arc::new(api::AppState::new(
        checkout,
        config.webhook_secret.clone().unwrap_or_default(),
        config.admin_emails.clone(),
    ));

    // 5. Build the application
    let app = api::create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
