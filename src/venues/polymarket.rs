//! Polymarket adapter (primary venue)
//!
//! Three upstream APIs behind one client: gamma (market metadata), clob
//! (prices, orderbooks, authenticated order endpoints) and data (wallet
//! trade activity). Authenticated requests carry L2 HMAC headers over
//! `timestamp + method + path + body`.

use base64::engine::general_purpose::URL_SAFE as B64_URL;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;

use super::{BookLevel, MarketInfo, MarketToken, Orderbook, VenueError, VenueResult};
use crate::config::PolymarketConfig;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw wallet trade as reported by the data API, before signal mapping.
#[derive(Debug, Clone)]
pub struct WalletTrade {
    pub market: String,
    pub asset_id: String,
    /// Side of book: BUY or SELL.
    pub side: String,
    /// Outcome label when the venue reports it directly (Yes/No/Up/Down).
    pub outcome: Option<String>,
    pub size: f64,
    pub price: f64,
    pub timestamp: i64,
    pub tx_hash: String,
    pub maker: Option<String>,
    pub taker: Option<String>,
}

/// Normalized order submission result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSubmission {
    pub order_id: String,
    /// filled | partial | cancelled | failed | pending
    pub status: String,
    pub filled_size: f64,
    pub filled_price: Option<f64>,
}

pub struct PolymarketClient {
    http: Client,
    gamma_base: String,
    clob_base: String,
    data_base: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    api_passphrase: Option<String>,
}

impl PolymarketClient {
    pub fn new(config: &PolymarketConfig) -> VenueResult<Self> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent("mirrorbot/0.1")
            .build()?;
        Ok(Self {
            http,
            gamma_base: config.gamma_base.trim_end_matches('/').to_string(),
            clob_base: config.clob_base.trim_end_matches('/').to_string(),
            data_base: config.data_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            api_passphrase: config.api_passphrase.clone(),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some()
    }

    // Market metadata (gamma)

    pub async fn get_market(&self, condition_id: &str) -> VenueResult<MarketInfo> {
        let url = format!("{}/markets/{}", self.gamma_base, condition_id);
        let response = self.http.get(&url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(VenueError::NotFound(condition_id.to_string()));
        }
        let body = check_status(response).await?;
        parse_market(&body, condition_id)
    }

    // Prices & orderbooks (clob)

    pub async fn get_orderbook(&self, token_id: &str) -> VenueResult<Orderbook> {
        let url = format!("{}/book", self.clob_base);
        let response = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?;
        let body = check_status(response).await?;
        let book = parse_orderbook(&body)?;
        debug!(
            token_id,
            bids = book.bids.len(),
            asks = book.asks.len(),
            "fetched orderbook"
        );
        Ok(book)
    }

    pub async fn get_midpoint(&self, token_id: &str) -> VenueResult<f64> {
        let url = format!("{}/midpoint", self.clob_base);
        let response = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?;
        let body = check_status(response).await?;
        value_as_f64(&body["mid"])
            .ok_or_else(|| VenueError::Parse(format!("midpoint missing in {}", body)))
    }

    // Wallet activity (data)

    pub async fn get_wallet_trades(
        &self,
        address: &str,
        limit: u32,
        since_ts: Option<i64>,
    ) -> VenueResult<Vec<WalletTrade>> {
        let url = format!("{}/trades", self.data_base);
        let mut query = vec![
            ("user".to_string(), address.to_lowercase()),
            ("limit".to_string(), limit.to_string()),
        ];
        if let Some(ts) = since_ts {
            query.push(("startTs".to_string(), ts.to_string()));
        }

        let response = self.http.get(&url).query(&query).send().await?;
        let body = check_status(response).await?;
        let Some(items) = body.as_array() else {
            return Err(VenueError::Parse(format!("expected trade array, got {}", body)));
        };
        Ok(items.iter().filter_map(parse_wallet_trade).collect())
    }

    // Authenticated order endpoints (clob)

    pub async fn create_order(
        &self,
        token_id: &str,
        side: &str,
        size: f64,
        price: f64,
    ) -> VenueResult<OrderSubmission> {
        let body = serde_json::json!({
            "tokenID": token_id,
            "side": side.to_uppercase(),
            "size": size,
            "price": price,
        });
        let payload = body.to_string();
        let response = self
            .http
            .post(format!("{}/order", self.clob_base))
            .headers(self.auth_headers("POST", "/order", &payload)?)
            .body(payload)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await?;
        let body = check_status(response).await?;
        Ok(parse_order_response(&body))
    }

    pub async fn get_order(&self, order_id: &str) -> VenueResult<OrderSubmission> {
        let path = format!("/order/{}", order_id);
        let response = self
            .http
            .get(format!("{}{}", self.clob_base, path))
            .headers(self.auth_headers("GET", &path, "")?)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(VenueError::NotFound(order_id.to_string()));
        }
        let body = check_status(response).await?;
        Ok(parse_order_response(&body))
    }

    pub async fn cancel_order(&self, order_id: &str) -> VenueResult<bool> {
        let payload = serde_json::json!({ "orderID": order_id }).to_string();
        let response = self
            .http
            .delete(format!("{}/order", self.clob_base))
            .headers(self.auth_headers("DELETE", "/order", &payload)?)
            .body(payload)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await?;
        let body = check_status(response).await?;
        Ok(body["success"].as_bool().unwrap_or(false))
    }

    fn auth_headers(
        &self,
        method: &str,
        path: &str,
        body: &str,
    ) -> VenueResult<reqwest::header::HeaderMap> {
        let (Some(key), Some(secret)) = (&self.api_key, &self.api_secret) else {
            return Err(VenueError::Auth(
                "order endpoints require API credentials".to_string(),
            ));
        };

        let timestamp = Utc::now().timestamp().to_string();
        let message = format!("{}{}{}{}", timestamp, method.to_uppercase(), path, body);
        let secret_bytes = B64_URL
            .decode(secret)
            .map_err(|e| VenueError::Auth(format!("invalid API secret: {}", e)))?;
        let mut mac = Hmac::<Sha256>::new_from_slice(&secret_bytes)
            .map_err(|e| VenueError::Auth(format!("invalid API secret length: {}", e)))?;
        mac.update(message.as_bytes());
        let signature = B64_URL.encode(mac.finalize().into_bytes());

        let mut headers = reqwest::header::HeaderMap::new();
        let mut insert = |name: &'static str, value: &str| -> VenueResult<()> {
            headers.insert(
                name,
                value
                    .parse()
                    .map_err(|_| VenueError::Auth(format!("invalid header value for {}", name)))?,
            );
            Ok(())
        };
        insert("POLY-API-KEY", key)?;
        insert("POLY-SIGNATURE", &signature)?;
        insert("POLY-TIMESTAMP", &timestamp)?;
        if let Some(passphrase) = &self.api_passphrase {
            insert("POLY-PASSPHRASE", passphrase)?;
        }
        Ok(headers)
    }
}

async fn check_status(response: reqwest::Response) -> VenueResult<Value> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let body = response.text().await.unwrap_or_default();
        return Err(VenueError::Auth(body));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(400).collect();
        return Err(VenueError::Status {
            status: status.as_u16(),
            body: snippet,
        });
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| VenueError::Parse(e.to_string()))
}

fn parse_market(body: &Value, condition_id: &str) -> VenueResult<MarketInfo> {
    let tokens = body["tokens"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|t| MarketToken {
                    token_id: string_field(t, &["token_id", "tokenId"]),
                    outcome: string_field(t, &["outcome"]),
                    winner: t["winner"].as_bool().unwrap_or(false),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(MarketInfo {
        condition_id: {
            let id = string_field(body, &["conditionId", "condition_id", "id"]);
            if id.is_empty() {
                condition_id.to_string()
            } else {
                id
            }
        },
        question: string_field(body, &["question", "title"]),
        category: string_field(body, &["category"]),
        end_date: body["endDate"]
            .as_str()
            .or_else(|| body["end_date_iso"].as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc)),
        tokens,
        closed: body["closed"].as_bool().unwrap_or(false),
        active: body["active"].as_bool().unwrap_or(true),
    })
}

fn parse_orderbook(body: &Value) -> VenueResult<Orderbook> {
    let parse_side = |side: &Value| -> Vec<BookLevel> {
        side.as_array()
            .map(|levels| {
                levels
                    .iter()
                    .filter_map(|l| {
                        Some(BookLevel {
                            price: value_as_f64(&l["price"])?,
                            size: value_as_f64(&l["size"])?,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    };

    Ok(Orderbook {
        bids: parse_side(&body["bids"]),
        asks: parse_side(&body["asks"]),
    }
    .normalize())
}

fn parse_wallet_trade(item: &Value) -> Option<WalletTrade> {
    Some(WalletTrade {
        market: string_field(item, &["market", "conditionId"]),
        asset_id: string_field(item, &["asset_id", "asset"]),
        side: string_field(item, &["side"]),
        outcome: item["outcome"].as_str().map(|s| s.to_string()),
        size: value_as_f64(&item["size"])?,
        price: value_as_f64(&item["price"])?,
        timestamp: value_as_i64(&item["timestamp"])?,
        tx_hash: string_field(item, &["transaction_hash", "transactionHash"]),
        maker: item["maker"].as_str().map(|s| s.to_lowercase()),
        taker: item["taker"].as_str().map(|s| s.to_lowercase()),
    })
}

/// Normalize the venue order lifecycle into our order statuses.
pub fn parse_order_response(body: &Value) -> OrderSubmission {
    let venue_status = string_field(body, &["status"]).to_uppercase();
    let matched = value_as_f64(&body["matchedAmount"]).unwrap_or(0.0);
    let average_price = value_as_f64(&body["averagePrice"]).unwrap_or(0.0);

    let status = match venue_status.as_str() {
        "MATCHED" => "filled",
        "OPEN" | "PENDING" if matched > 0.0 => "partial",
        "CANCELLED" | "EXPIRED" => "cancelled",
        "REJECTED" | "FAILED" => "failed",
        _ => "pending",
    };

    OrderSubmission {
        order_id: string_field(body, &["orderID", "orderId", "id"]),
        status: status.to_string(),
        filled_size: matched,
        filled_price: (matched > 0.0).then_some(average_price),
    }
}

fn string_field(value: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| value[*k].as_str())
        .unwrap_or_default()
        .to_string()
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_normalisation() {
        let cases = [
            (serde_json::json!({"orderID": "o1", "status": "MATCHED", "matchedAmount": 50, "averagePrice": 0.42}), "filled"),
            (serde_json::json!({"orderID": "o2", "status": "OPEN", "matchedAmount": 10, "averagePrice": 0.42}), "partial"),
            (serde_json::json!({"orderID": "o3", "status": "OPEN", "matchedAmount": 0}), "pending"),
            (serde_json::json!({"orderID": "o4", "status": "CANCELLED"}), "cancelled"),
            (serde_json::json!({"orderID": "o5", "status": "EXPIRED"}), "cancelled"),
            (serde_json::json!({"orderID": "o6", "status": "REJECTED"}), "failed"),
            (serde_json::json!({"orderID": "o7", "status": "weird"}), "pending"),
        ];
        for (body, expected) in cases {
            assert_eq!(parse_order_response(&body).status, expected, "{}", body);
        }
    }

    #[test]
    fn filled_price_requires_matched_amount() {
        let body = serde_json::json!({"orderID": "o1", "status": "OPEN", "matchedAmount": 0, "averagePrice": 0.9});
        assert_eq!(parse_order_response(&body).filled_price, None);

        let body = serde_json::json!({"orderID": "o1", "status": "MATCHED", "matchedAmount": 5, "averagePrice": "0.9"});
        assert_eq!(parse_order_response(&body).filled_price, Some(0.9));
    }

    #[test]
    fn wallet_trade_parses_mixed_number_encodings() {
        let item = serde_json::json!({
            "market": "cond-1",
            "asset_id": "tok-1",
            "side": "BUY",
            "size": "12.5",
            "price": 0.4,
            "timestamp": "1700000000",
            "transaction_hash": "0xhash",
            "maker": "0xAAA",
        });
        let trade = parse_wallet_trade(&item).unwrap();
        assert_eq!(trade.size, 12.5);
        assert_eq!(trade.price, 0.4);
        assert_eq!(trade.timestamp, 1_700_000_000);
        assert_eq!(trade.maker.as_deref(), Some("0xaaa"));
        assert_eq!(trade.outcome, None);
    }

    #[test]
    fn wallet_trade_missing_size_is_dropped() {
        let item = serde_json::json!({"market": "m", "side": "BUY", "price": 0.4, "timestamp": 1});
        assert!(parse_wallet_trade(&item).is_none());
    }

    #[test]
    fn market_parse_extracts_tokens_and_winner() {
        let body = serde_json::json!({
            "conditionId": "cond-1",
            "question": "Will BTC close above 100k?",
            "category": "crypto",
            "endDate": "2025-12-31T00:00:00Z",
            "closed": true,
            "active": false,
            "tokens": [
                {"token_id": "t-yes", "outcome": "Yes", "winner": true},
                {"token_id": "t-no", "outcome": "No", "winner": false},
            ],
        });
        let market = parse_market(&body, "cond-1").unwrap();
        assert!(market.closed);
        assert_eq!(market.winning_outcome(), Some("Yes"));
        assert_eq!(market.tokens.len(), 2);
        assert!(market.end_date.is_some());
    }

    #[test]
    fn orderbook_parse_normalises() {
        let body = serde_json::json!({
            "bids": [{"price": "0.40", "size": "10"}, {"price": "0.45", "size": "5"}],
            "asks": [{"price": "0.55", "size": "3"}, {"price": "0.50", "size": "8"}],
        });
        let book = parse_orderbook(&body).unwrap();
        assert_eq!(book.best_bid(), Some(0.45));
        assert_eq!(book.best_ask(), Some(0.50));
    }
}
