//! HTTP API server for storefront orders and M-Pesa payments.
//!
//! Provides the checkout endpoints (orders, payment initiation, status
//! polling, provider webhook), Google Pay confirmation and the admin back
//! office, with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Router, middleware};
use checkout::{CheckoutService, WebhookReceiver};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use auth::AdminPolicy;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub checkout: CheckoutService,
    pub webhook: WebhookReceiver,
    pub admins: AdminPolicy,
}

impl AppState {
    pub fn new(
        checkout: CheckoutService,
        webhook_secret: impl Into<String>,
        admin_emails: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            webhook: WebhookReceiver::new(checkout.clone(), webhook_secret),
            checkout,
            admins: AdminPolicy::new(admin_emails),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    let admin_router = Router::new()
        .route(
            "/admin/orders",
            get(routes::admin::list).put(routes::admin::update_status),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create).get(routes::orders::list))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/payment/initiate", post(routes::payment::initiate))
        .route("/payment/status", get(routes::payment::status))
        .route("/payment/webhook", post(routes::webhook::receive))
        .route("/payments/google-pay", post(routes::payment::google_pay))
        .merge(admin_router)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
