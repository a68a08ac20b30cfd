//! Operator HTTP surface.
//!
//! Thin collaborator over the core interfaces: wallet/filter/mapping admin,
//! order inspection and cancellation, mode and safety controls, status.
//! Unexpected errors map to 500; bad input 400, missing entities 404,
//! illegal state transitions 409 — everything else is 200 with a structured
//! payload.

pub mod routes;

use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::execution::manager::OrderManager;
use crate::execution::safety::SafetyGuard;
use crate::intelligence::filters::FilterManager;
use crate::signals::SignalQueue;
use crate::storage::{Cache, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub cache: Arc<Cache>,
    pub queue: Arc<SignalQueue>,
    pub safety: Arc<SafetyGuard>,
    pub filters: Arc<FilterManager>,
    pub orders: Option<Arc<OrderManager>>,
    pub has_live_credentials: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/status", get(routes::status))
        .route("/wallets", get(routes::list_wallets).post(routes::add_wallet))
        .route("/wallets/:address", delete(routes::remove_wallet))
        .route("/wallets/:address/controls", put(routes::update_wallet_controls))
        .route("/filters", get(routes::list_filters).post(routes::add_filter))
        .route("/filters/:id", delete(routes::remove_filter))
        .route("/mappings", get(routes::list_mappings).post(routes::add_mapping))
        .route("/mappings/:id", delete(routes::remove_mapping))
        .route("/orders", get(routes::list_orders))
        .route("/orders/:id/cancel", post(routes::cancel_order))
        .route("/trades", get(routes::recent_trades))
        .route("/settings", get(routes::get_settings).put(routes::update_settings))
        .route("/emergency-stop", post(routes::emergency_stop))
        .route("/resume-trading", post(routes::resume_trading))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
