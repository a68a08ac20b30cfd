//! Advisor verdict model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    High,
    Normal,
    Low,
}

impl Urgency {
    /// Unknown or missing urgency degrades to Normal.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "high" => Urgency::High,
            "low" => Urgency::Low,
            _ => Urgency::Normal,
        }
    }
}

/// The advisor's decision on one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub execute: bool,
    pub size: f64,
    pub confidence: f64,
    pub urgency: Urgency,
    pub reasoning: String,
}

impl Verdict {
    pub fn reject(reasoning: impl Into<String>) -> Self {
        Self {
            execute: false,
            size: 0.0,
            confidence: 0.0,
            urgency: Urgency::Normal,
            reasoning: reasoning.into(),
        }
    }

    pub fn approve(size: f64, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            execute: true,
            size,
            confidence,
            urgency: Urgency::Normal,
            reasoning: reasoning.into(),
        }
    }

    /// Lenient parse from advisor JSON: missing fields default to a
    /// non-executing verdict rather than erroring.
    pub fn from_value(value: &Value) -> Self {
        Self {
            execute: value["execute"].as_bool().unwrap_or(false),
            size: value["size"].as_f64().unwrap_or(0.0),
            confidence: value["confidence"].as_f64().unwrap_or(0.0).clamp(0.0, 1.0),
            urgency: value["urgency"]
                .as_str()
                .map(Urgency::parse)
                .unwrap_or(Urgency::Normal),
            reasoning: value["reasoning"].as_str().unwrap_or_default().to_string(),
        }
    }
}
