//! Route handlers for the operator surface.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use super::AppState;
use crate::config::TradingMode;
use crate::execution::order::OrderStatus;
use crate::intelligence::filters::{FilterAction, FilterType};
use crate::storage::database::WalletControls;

type ApiResponse = (StatusCode, Json<Value>);

fn ok(value: Value) -> ApiResponse {
    (StatusCode::OK, Json(value))
}

fn bad_request(message: impl Into<String>) -> ApiResponse {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message.into()})))
}

fn not_found(message: impl Into<String>) -> ApiResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": message.into()})))
}

fn conflict(message: impl Into<String>) -> ApiResponse {
    (StatusCode::CONFLICT, Json(json!({"error": message.into()})))
}

fn internal(e: impl std::fmt::Display) -> ApiResponse {
    error!(error = %e, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "internal error"})),
    )
}

pub async fn health() -> ApiResponse {
    ok(json!({"healthy": true}))
}

pub async fn status(State(state): State<AppState>) -> ApiResponse {
    let wallet_count = match state.store.wallet_count().await {
        Ok(n) => n,
        Err(e) => return internal(e),
    };
    let queue_size = state.queue.size().await;
    ok(json!({
        "mode": state.cache.mode().as_str(),
        "daily_pnl": state.cache.daily_pnl(),
        "open_exposure": state.cache.open_exposure(),
        "wallet_count": wallet_count,
        "queue_size": queue_size,
        "emergency_stop": state.cache.is_stopped(),
    }))
}

// Wallets

pub async fn list_wallets(State(state): State<AppState>) -> ApiResponse {
    match state.store.list_wallets().await {
        Ok(wallets) => ok(json!({ "wallets": wallets })),
        Err(e) => internal(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct AddWalletRequest {
    pub address: String,
    pub alias: Option<String>,
}

pub async fn add_wallet(
    State(state): State<AppState>,
    Json(body): Json<AddWalletRequest>,
) -> ApiResponse {
    let address = body.address.trim();
    if address.is_empty() {
        return bad_request("address is required");
    }
    if state.store.get_wallet(address).await.ok().flatten().is_some() {
        return conflict(format!("wallet {} already tracked", address.to_lowercase()));
    }
    match state.store.add_wallet(address, body.alias.as_deref()).await {
        Ok(wallet) => ok(json!({ "wallet": wallet })),
        Err(e) => internal(e),
    }
}

pub async fn remove_wallet(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResponse {
    match state.store.remove_wallet(&address).await {
        Ok(true) => ok(json!({"removed": true})),
        Ok(false) => not_found(format!("wallet {} not tracked", address.to_lowercase())),
        Err(e) => internal(e),
    }
}

pub async fn update_wallet_controls(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Json(controls): Json<WalletControls>,
) -> ApiResponse {
    match state.store.update_wallet_controls(&address, &controls).await {
        Ok(true) => match state.store.get_wallet(&address).await {
            Ok(Some(wallet)) => ok(json!({ "wallet": wallet })),
            Ok(None) => not_found("wallet vanished"),
            Err(e) => internal(e),
        },
        Ok(false) => not_found(format!("wallet {} not tracked", address.to_lowercase())),
        Err(e) => bad_request(e.to_string()),
    }
}

// Filters

pub async fn list_filters(State(state): State<AppState>) -> ApiResponse {
    match state.store.list_market_filters().await {
        Ok(filters) => ok(json!({ "filters": filters })),
        Err(e) => internal(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct AddFilterRequest {
    pub filter_type: String,
    pub value: String,
    pub action: String,
}

pub async fn add_filter(
    State(state): State<AppState>,
    Json(body): Json<AddFilterRequest>,
) -> ApiResponse {
    let Some(filter_type) = FilterType::parse(&body.filter_type) else {
        return bad_request("filter_type must be market_id|category|keyword");
    };
    let Some(action) = FilterAction::parse(&body.action) else {
        return bad_request("action must be allow|deny");
    };
    if body.value.trim().is_empty() {
        return bad_request("value is required");
    }
    match state.filters.add_filter(filter_type, &body.value, action).await {
        Ok(filter) => ok(json!({
            "id": filter.id,
            "filter_type": filter.filter_type.as_str(),
            "value": filter.value,
            "action": filter.action.as_str(),
        })),
        Err(e) => internal(e),
    }
}

pub async fn remove_filter(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResponse {
    match state.filters.remove_filter(id).await {
        Ok(true) => ok(json!({"removed": true})),
        Ok(false) => not_found(format!("filter {} not found", id)),
        Err(e) => internal(e),
    }
}

// Market mappings

pub async fn list_mappings(State(state): State<AppState>) -> ApiResponse {
    match state.store.list_market_mappings().await {
        Ok(mappings) => ok(json!({ "mappings": mappings })),
        Err(e) => internal(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct AddMappingRequest {
    pub polymarket_id: String,
    pub kalshi_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

pub async fn add_mapping(
    State(state): State<AppState>,
    Json(body): Json<AddMappingRequest>,
) -> ApiResponse {
    if body.polymarket_id.trim().is_empty() || body.kalshi_id.trim().is_empty() {
        return bad_request("polymarket_id and kalshi_id are required");
    }
    match state
        .store
        .add_market_mapping(&body.polymarket_id, &body.kalshi_id, &body.description, body.active)
        .await
    {
        Ok(mapping) => ok(json!({ "mapping": mapping })),
        Err(e) => internal(e),
    }
}

pub async fn remove_mapping(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResponse {
    match state.store.remove_market_mapping(id).await {
        Ok(true) => ok(json!({"removed": true})),
        Ok(false) => not_found(format!("mapping {} not found", id)),
        Err(e) => internal(e),
    }
}

// Orders

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrdersQuery>,
) -> ApiResponse {
    let status = match &query.status {
        Some(raw) => match OrderStatus::parse(raw) {
            Some(status) => Some(status),
            None => return bad_request(format!("unknown order status {:?}", raw)),
        },
        None => None,
    };
    match state.store.list_orders(status, query.limit.unwrap_or(50)).await {
        Ok(orders) => ok(json!({ "orders": orders })),
        Err(e) => internal(e),
    }
}

pub async fn cancel_order(State(state): State<AppState>, Path(id): Path<String>) -> ApiResponse {
    let Some(manager) = &state.orders else {
        return conflict("order manager is not configured (paper mode)");
    };
    match state.store.get_order(&id).await {
        Ok(None) => return not_found(format!("order {} not found", id)),
        Ok(Some(order)) if !order.is_cancellable() => {
            return conflict(format!(
                "order {} is {} and cannot be cancelled",
                id,
                order.status.as_str()
            ));
        }
        Ok(Some(_)) => {}
        Err(e) => return internal(e),
    }
    match manager.cancel(&id).await {
        Ok(order) => ok(json!({ "order": order })),
        Err(e) => internal(e),
    }
}

// Trades

#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    pub limit: Option<usize>,
    #[serde(default)]
    pub executed_only: bool,
}

pub async fn recent_trades(
    State(state): State<AppState>,
    Query(query): Query<TradesQuery>,
) -> ApiResponse {
    match state
        .store
        .recent_trades(query.limit.unwrap_or(20), query.executed_only)
        .await
    {
        Ok(trades) => ok(json!({ "trades": trades })),
        Err(e) => internal(e),
    }
}

// Settings & safety

pub async fn get_settings(State(state): State<AppState>) -> ApiResponse {
    ok(json!({
        "mode": state.cache.mode().as_str(),
        "live_confirmed": state.cache.live_confirmed(),
        "first_live_trade_acknowledged": state.cache.first_live_trade_acknowledged(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SettingsUpdate {
    pub mode: Option<String>,
    pub live_confirmed: Option<bool>,
    pub acknowledge_first_live_trade: Option<bool>,
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(body): Json<SettingsUpdate>,
) -> ApiResponse {
    if let Some(confirmed) = body.live_confirmed {
        state.cache.set_live_confirmed(confirmed);
    }
    if body.acknowledge_first_live_trade == Some(true) {
        state.safety.acknowledge_first_live_trade();
    }

    if let Some(mode_raw) = &body.mode {
        let Some(mode) = TradingMode::parse(mode_raw) else {
            return bad_request(format!(
                "invalid mode {:?} (expected paper|live|paused)",
                mode_raw
            ));
        };
        if mode == TradingMode::Live {
            if let Err(e) = state.safety.check_live_mode_allowed(state.has_live_credentials) {
                return conflict(e.to_string());
            }
        }
        state.cache.set_mode(mode);
    }

    get_settings(State(state)).await
}

#[derive(Debug, Deserialize)]
pub struct EmergencyStopRequest {
    pub reason: Option<String>,
}

pub async fn emergency_stop(
    State(state): State<AppState>,
    body: Option<Json<EmergencyStopRequest>>,
) -> ApiResponse {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "operator request".to_string());
    state.safety.activate_emergency_stop(&reason);
    ok(json!({
        "success": true,
        "message": "Emergency stop activated. All trading halted.",
        "emergency_stop": true,
    }))
}

pub async fn resume_trading(State(state): State<AppState>) -> ApiResponse {
    state.safety.reset_emergency_stop();
    ok(json!({
        "success": true,
        "message": "Trading resumed.",
        "emergency_stop": false,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::manager::{OrderGateway, OrderManager};
    use crate::execution::order::Order;
    use crate::execution::safety::SafetyGuard;
    use crate::intelligence::filters::FilterManager;
    use crate::models::TradeAction;
    use crate::signals::SignalQueue;
    use crate::storage::{Cache, Store};
    use crate::venues::polymarket::OrderSubmission;
    use crate::venues::{VenueError, VenueResult};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct StubGateway;

    #[async_trait]
    impl OrderGateway for StubGateway {
        async fn submit_order(
            &self,
            _market_id: &str,
            _side: TradeAction,
            _size: f64,
            _price: f64,
        ) -> VenueResult<OrderSubmission> {
            Err(VenueError::Status {
                status: 500,
                body: "stub".to_string(),
            })
        }

        async fn order_status(&self, _external_id: &str) -> VenueResult<OrderSubmission> {
            Err(VenueError::NotFound("stub".to_string()))
        }

        async fn cancel_order(&self, _external_id: &str) -> VenueResult<bool> {
            Ok(true)
        }
    }

    fn state(with_orders: bool, has_live_credentials: bool) -> AppState {
        let store = Store::in_memory().unwrap();
        let cache = Arc::new(Cache::new());
        let orders = with_orders
            .then(|| Arc::new(OrderManager::new(store.clone(), Arc::new(StubGateway))));
        AppState {
            store: store.clone(),
            cache: cache.clone(),
            queue: Arc::new(SignalQueue::new(10, Duration::from_secs(300))),
            safety: Arc::new(SafetyGuard::new(cache)),
            filters: Arc::new(FilterManager::new(store)),
            orders,
            has_live_credentials,
        }
    }

    fn settings(mode: &str) -> SettingsUpdate {
        SettingsUpdate {
            mode: Some(mode.to_string()),
            live_confirmed: None,
            acknowledge_first_live_trade: None,
        }
    }

    #[tokio::test]
    async fn cancel_order_without_manager_is_conflict() {
        let state = state(false, false);
        let (status, Json(body)) = cancel_order(State(state), Path("o-1".to_string())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("order manager"));
    }

    #[tokio::test]
    async fn cancel_order_unknown_id_is_not_found() {
        let state = state(true, false);
        let (status, Json(body)) = cancel_order(State(state), Path("missing".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn cancel_order_terminal_status_is_conflict() {
        let state = state(true, false);
        let mut order = Order::new("sig-1", "cond-1", TradeAction::Buy, 50.0, 0.5, 3);
        order.mark_submitted("ext-1");
        order.mark_filled(50.0, 0.5);
        state.store.insert_order(&order).await.unwrap();

        let (status, Json(body)) = cancel_order(State(state), Path(order.id.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("filled"));
    }

    #[tokio::test]
    async fn cancel_order_resting_order_succeeds() {
        let state = state(true, false);
        let order = Order::new("sig-1", "cond-1", TradeAction::Buy, 50.0, 0.5, 3);
        state.store.insert_order(&order).await.unwrap();

        let (status, Json(body)) = cancel_order(State(state), Path(order.id.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["order"]["status"], "cancelled");
    }

    #[tokio::test]
    async fn live_mode_without_credentials_is_conflict() {
        let state = state(false, false);
        let (status, Json(body)) =
            update_settings(State(state.clone()), Json(settings("live"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("credentials"));
        assert_eq!(state.cache.mode(), crate::config::TradingMode::Paper);
    }

    #[tokio::test]
    async fn live_mode_unconfirmed_is_conflict_even_with_credentials() {
        let state = state(false, true);
        let (status, Json(body)) = update_settings(State(state), Json(settings("live"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("confirmation"));
    }

    #[tokio::test]
    async fn confirmed_live_mode_switch_succeeds() {
        let state = state(false, true);
        let update = SettingsUpdate {
            mode: Some("live".to_string()),
            live_confirmed: Some(true),
            acknowledge_first_live_trade: None,
        };
        let (status, Json(body)) = update_settings(State(state), Json(update)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "live");
        assert_eq!(body["live_confirmed"], true);
    }

    #[tokio::test]
    async fn invalid_mode_is_bad_request() {
        let state = state(false, false);
        let (status, Json(body)) = update_settings(State(state), Json(settings("yolo"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("yolo"));
    }

    #[tokio::test]
    async fn duplicate_wallet_is_conflict() {
        let state = state(false, false);
        let request = AddWalletRequest {
            address: "0xAAA".to_string(),
            alias: None,
        };
        let (status, _) = add_wallet(State(state.clone()), Json(request)).await;
        assert_eq!(status, StatusCode::OK);

        // Same address, different casing: still the same wallet.
        let request = AddWalletRequest {
            address: "0xaaa".to_string(),
            alias: Some("dup".to_string()),
        };
        let (status, Json(body)) = add_wallet(State(state), Json(request)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("0xaaa"));
    }

    #[tokio::test]
    async fn blank_wallet_address_is_bad_request() {
        let state = state(false, false);
        let request = AddWalletRequest {
            address: "   ".to_string(),
            alias: None,
        };
        let (status, _) = add_wallet(State(state), Json(request)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn remove_unknown_wallet_is_not_found() {
        let state = state(false, false);
        let (status, _) = remove_wallet(State(state), Path("0xghost".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
