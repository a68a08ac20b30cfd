//! Advisor client (Claude messages API).
//!
//! The advisor reads the serialized decision context and answers with a
//! strict JSON verdict. Transport failures, timeouts and unparseable
//! replies all degrade to reject verdicts; the pipeline never errors on
//! advisor trouble.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::context::DecisionContext;
use super::decision::Verdict;
use crate::config::AdvisorConfig;

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// The advisor's reasoning strategy is its own concern; this prompt only
// pins down the verdict contract the pipeline parses.
const SYSTEM_PROMPT: &str = "\
You are the trade advisor for a prediction-market copy-trading engine. Each
request carries one detected trade signal together with wallet performance,
market conditions and the current risk state. Decide whether to mirror the
trade and at what size.

Respond with ONLY this JSON (no markdown, no extra text):
{
    \"execute\": boolean,
    \"size\": number,
    \"confidence\": number between 0 and 1,
    \"urgency\": \"high\" | \"normal\" | \"low\",
    \"reasoning\": string
}";

/// The single verb the orchestrator needs.
#[async_trait]
pub trait Advisor: Send + Sync {
    async fn evaluate(&self, context: &DecisionContext) -> Verdict;
}

pub struct ClaudeAdvisor {
    http: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl ClaudeAdvisor {
    pub fn new(http: reqwest::Client, config: &AdvisorConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            http,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn build_prompt(context: &DecisionContext) -> String {
        let remaining_budget = context.risk_max_daily_loss + context.risk_daily_pnl;
        format!(
            "Evaluate this trade signal and decide whether to execute:\n\n\
             SIGNAL:\n\
             - Type: {}\n\
             - Wallet: {}\n\
             - Market: {}\n\
             - Side: {}\n\
             - Size: ${:.2}\n\
             - Price: {:.4}\n\n\
             WALLET PERFORMANCE:\n\
             - Win Rate: {:.1}%\n\
             - Avg ROI: {:.1}%\n\
             - Total Trades: {}\n\
             - Confidence Score: {:.2}\n\n\
             MARKET CONDITIONS:\n\
             - Liquidity: ${:.2}\n\
             - Spread: {:.2}%\n\
             - Quality Score: {:.2}\n\
             - Allowed by filters: {}\n\n\
             RISK STATE:\n\
             - Daily P&L: ${:.2}\n\
             - Open Exposure: ${:.2}\n\
             - Max Daily Loss: ${:.2}\n\
             - Remaining Budget: ${:.2}\n\n\
             Provide your decision as JSON.",
            context.signal_type,
            context.signal_wallet,
            context.signal_market_id,
            context.signal_side,
            context.signal_size,
            context.signal_price,
            context.wallet_win_rate * 100.0,
            context.wallet_avg_roi * 100.0,
            context.wallet_total_trades,
            context.wallet_confidence_score,
            context.market_liquidity,
            context.market_spread * 100.0,
            context.market_quality_score,
            context.market_allowed,
            context.risk_daily_pnl,
            context.risk_open_exposure,
            context.risk_max_daily_loss,
            remaining_budget,
        )
    }
}

#[async_trait]
impl Advisor for ClaudeAdvisor {
    async fn evaluate(&self, context: &DecisionContext) -> Verdict {
        let start = Instant::now();
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: Self::build_prompt(context),
            }],
        };

        let response = self
            .http
            .post(MESSAGES_URL)
            .timeout(self.timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "advisor request failed");
                return Verdict::reject(format!("API error: {}", e));
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let snippet: String = body.chars().take(400).collect();
            warn!(status = status.as_u16(), "advisor returned error");
            return Verdict::reject(format!("API error {}: {}", status.as_u16(), snippet));
        }

        let parsed: MessagesResponse = match serde_json::from_str(&body) {
            Ok(p) => p,
            Err(e) => return Verdict::reject(format!("API error: {}", e)),
        };
        let text = parsed
            .content
            .first()
            .map(|c| c.text.clone())
            .unwrap_or_default();

        debug!(latency_ms = start.elapsed().as_millis() as u64, "advisor replied");
        parse_verdict(&text)
    }
}

/// Parse the advisor's reply, tolerating markdown fences around the JSON.
pub fn parse_verdict(text: &str) -> Verdict {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text.trim()) {
        return Verdict::from_value(&value);
    }
    if let Some(extracted) = extract_json(text) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&extracted) {
            return Verdict::from_value(&value);
        }
    }
    Verdict::reject("Failed to parse AI response as JSON")
}

/// Pull a JSON object out of a code fence, or fall back to the outermost
/// brace pair.
fn extract_json(text: &str) -> Option<String> {
    if let Some(fence_start) = text.find("```") {
        let after = &text[fence_start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(fence_end) = body.find("```") {
            let candidate = body[..fence_end].trim();
            if candidate.starts_with('{') {
                return Some(candidate.to_string());
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| text[start..=end].to_string())
}

/// Stand-in advisor used when no API key is configured: rejects everything
/// so the pipeline keeps auditing signals without ever trading on them.
pub struct DisabledAdvisor;

#[async_trait]
impl Advisor for DisabledAdvisor {
    async fn evaluate(&self, _context: &DecisionContext) -> Verdict {
        Verdict::reject("advisor not configured")
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}
