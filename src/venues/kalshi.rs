//! Kalshi adapter (secondary venue, read-only)
//!
//! Market data for the cross-venue arbitrage scanner. Authenticated requests
//! are signed RSA-PSS (SHA-256, salt length = digest length) over
//! `timestamp_ms + METHOD + path_without_query`, with the signature sent
//! base64-encoded in the `KALSHI-ACCESS-*` headers.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::SigningKey;
use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::info;

use super::{BookLevel, Orderbook, VenueError, VenueResult};
use crate::config::KalshiConfig;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Path prefix expected by the signature scheme.
const API_PREFIX: &str = "/trade-api/v2";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KalshiMarket {
    pub ticker: String,
    pub title: String,
    /// Raw YES price as reported (cents 0-100 or probability 0-1).
    pub yes_price: f64,
    /// Raw NO price as reported.
    pub no_price: f64,
    pub volume: i64,
    pub category: String,
}

impl KalshiMarket {
    /// Normalized YES probability: renormalises cent quotes and divides out
    /// the spread so `yes / (yes + no)` lands in [0, 1].
    pub fn yes_probability(&self) -> f64 {
        normalize_yes_probability(self.yes_price, self.no_price)
    }
}

/// Prices may arrive in cents (0-100) or decimals (0-1), and YES+NO rarely
/// sums to exactly one. Unknown quotes fall back to 0.5.
pub fn normalize_yes_probability(yes_price: f64, no_price: f64) -> f64 {
    let (yes, no) = if yes_price > 1.0 || no_price > 1.0 {
        (yes_price / 100.0, no_price / 100.0)
    } else {
        (yes_price, no_price)
    };
    let total = yes + no;
    if total <= 0.0 {
        return 0.5;
    }
    (yes / total).clamp(0.0, 1.0)
}

pub struct KalshiClient {
    http: Client,
    base_url: String,
    api_key_id: Option<String>,
    private_key: Option<RsaPrivateKey>,
}

impl KalshiClient {
    pub fn new(config: &KalshiConfig) -> VenueResult<Self> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent("mirrorbot/0.1")
            .build()?;

        let private_key = match &config.private_key_path {
            Some(path) => Some(load_private_key(path)?),
            None => None,
        };

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key_id: config.api_key_id.clone(),
            private_key,
        })
    }

    pub async fn get_markets(&self, status: &str, limit: u32) -> VenueResult<Vec<KalshiMarket>> {
        let body = self
            .request(
                "GET",
                "/markets",
                &[("status", status.to_string()), ("limit", limit.to_string())],
            )
            .await?;
        let markets = body["markets"]
            .as_array()
            .map(|arr| arr.iter().map(parse_market).collect::<Vec<_>>())
            .unwrap_or_default();
        info!(count = markets.len(), status, "fetched kalshi markets");
        Ok(markets)
    }

    pub async fn get_market(&self, ticker: &str) -> VenueResult<Option<KalshiMarket>> {
        match self
            .request("GET", &format!("/markets/{}", ticker), &[])
            .await
        {
            Ok(body) => Ok(Some(parse_market(&body["market"]))),
            Err(VenueError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Kalshi books quote resting YES bids and NO bids. Normal form maps YES
    /// bids straight through and derives YES asks as `1 - no_bid`.
    pub async fn get_orderbook(&self, ticker: &str) -> VenueResult<Orderbook> {
        let body = self
            .request("GET", &format!("/markets/{}/orderbook", ticker), &[])
            .await?;
        let book = &body["orderbook"];

        let parse_levels = |side: &Value| -> Vec<(f64, f64)> {
            side.as_array()
                .map(|levels| {
                    levels
                        .iter()
                        .filter_map(|l| {
                            let pair = l.as_array()?;
                            let price = pair.first()?.as_f64()?;
                            let size = pair.get(1)?.as_f64()?;
                            Some((price, size))
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        let bids = parse_levels(&book["yes"])
            .into_iter()
            .map(|(cents, size)| BookLevel {
                price: cents / 100.0,
                size,
            })
            .collect();
        let asks = parse_levels(&book["no"])
            .into_iter()
            .map(|(cents, size)| BookLevel {
                price: 1.0 - cents / 100.0,
                size,
            })
            .collect();

        Ok(Orderbook { bids, asks }.normalize())
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> VenueResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = match method {
            "GET" => self.http.get(&url),
            other => {
                return Err(VenueError::Parse(format!(
                    "unsupported method {} for read-only adapter",
                    other
                )))
            }
        };
        if !query.is_empty() {
            req = req.query(query);
        }
        for (name, value) in self.auth_headers(method, path)? {
            req = req.header(name, value);
        }

        let response = req.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(VenueError::NotFound(path.to_string()));
        }
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

    /// Unauthenticated when no key is configured (public market data works
    /// either way).
    fn auth_headers(&self, method: &str, path: &str) -> VenueResult<Vec<(&'static str, String)>> {
        let (Some(key_id), Some(private_key)) = (&self.api_key_id, &self.private_key) else {
            return Ok(Vec::new());
        };

        let timestamp_ms = chrono::Utc::now().timestamp_millis().to_string();
        let path_without_query = path.split('?').next().unwrap_or(path);
        let message = format!(
            "{}{}{}{}",
            timestamp_ms,
            method.to_uppercase(),
            API_PREFIX,
            path_without_query
        );
        let signature = sign_pss(private_key, &message)?;

        Ok(vec![
            ("KALSHI-ACCESS-KEY", key_id.clone()),
            ("KALSHI-ACCESS-SIGNATURE", signature),
            ("KALSHI-ACCESS-TIMESTAMP", timestamp_ms),
        ])
    }
}

fn load_private_key(path: &str) -> VenueResult<RsaPrivateKey> {
    let pem = std::fs::read_to_string(path)
        .map_err(|e| VenueError::Auth(format!("cannot read private key {}: {}", path, e)))?;
    RsaPrivateKey::from_pkcs8_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
        .map_err(|e| VenueError::Auth(format!("invalid RSA private key: {}", e)))
}

fn sign_pss(private_key: &RsaPrivateKey, message: &str) -> VenueResult<String> {
    let signing_key = SigningKey::<Sha256>::new(private_key.clone());
    let signature = signing_key.sign_with_rng(&mut rand::thread_rng(), message.as_bytes());
    Ok(B64.encode(signature.to_bytes()))
}

fn parse_market(m: &Value) -> KalshiMarket {
    KalshiMarket {
        ticker: m["ticker"].as_str().unwrap_or_default().to_string(),
        title: m["title"].as_str().unwrap_or_default().to_string(),
        yes_price: m["yes_price"].as_f64().unwrap_or(0.5),
        no_price: m["no_price"].as_f64().unwrap_or(0.5),
        volume: m["volume"].as_i64().unwrap_or(0),
        category: m["category"].as_str().unwrap_or_default().to_string(),
    }
}
