//! Market allow/deny filters.
//!
//! Precedence: market_id > category > keyword. Within the market and
//! category levels an explicit allow beats a deny; at the keyword level deny
//! wins, because keywords match broadly and denial is the conservative
//! reading. No matching filter means allowed.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::storage::database::MarketFilterRecord;
use crate::storage::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    MarketId,
    Category,
    Keyword,
}

impl FilterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterType::MarketId => "market_id",
            FilterType::Category => "category",
            FilterType::Keyword => "keyword",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "market_id" => Some(Self::MarketId),
            "category" => Some(Self::Category),
            "keyword" => Some(Self::Keyword),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    Allow,
    Deny,
}

impl FilterAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterAction::Allow => "allow",
            FilterAction::Deny => "deny",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Self::Allow),
            "deny" => Some(Self::Deny),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarketFilter {
    pub id: i64,
    pub filter_type: FilterType,
    pub value: String,
    pub action: FilterAction,
}

impl MarketFilter {
    fn from_record(record: &MarketFilterRecord) -> Option<Self> {
        Some(Self {
            id: record.id,
            filter_type: FilterType::parse(&record.filter_type)?,
            value: record.value.clone(),
            action: FilterAction::parse(&record.action)?,
        })
    }
}

/// Outcome of a filter evaluation, with the rule level that decided it.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl FilterVerdict {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }
}

pub struct FilterManager {
    store: Store,
}

impl FilterManager {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn filters(&self) -> anyhow::Result<Vec<MarketFilter>> {
        let records = self.store.list_market_filters().await?;
        Ok(records.iter().filter_map(MarketFilter::from_record).collect())
    }

    pub async fn add_filter(
        &self,
        filter_type: FilterType,
        value: &str,
        action: FilterAction,
    ) -> anyhow::Result<MarketFilter> {
        let record = self
            .store
            .add_market_filter(filter_type.as_str(), value, action.as_str())
            .await?;
        info!(
            filter_type = filter_type.as_str(),
            value,
            action = action.as_str(),
            id = record.id,
            "filter added"
        );
        Ok(MarketFilter {
            id: record.id,
            filter_type,
            value: value.to_string(),
            action,
        })
    }

    pub async fn remove_filter(&self, filter_id: i64) -> anyhow::Result<bool> {
        self.store.remove_market_filter(filter_id).await
    }

    pub async fn evaluate(
        &self,
        market_id: &str,
        category: &str,
        title: &str,
    ) -> anyhow::Result<FilterVerdict> {
        let filters = self.filters().await?;
        Ok(evaluate_filters(market_id, category, title, &filters))
    }
}

pub fn evaluate_filters(
    market_id: &str,
    category: &str,
    title: &str,
    filters: &[MarketFilter],
) -> FilterVerdict {
    if filters.is_empty() {
        return FilterVerdict::allowed();
    }

    let mut market_allow = false;
    let mut market_deny = false;
    let mut category_allow = false;
    let mut category_deny = false;
    let mut keyword_allow = false;
    let mut keyword_deny = false;

    let category_lower = category.to_lowercase();
    let title_lower = title.to_lowercase();

    for filter in filters {
        let matched = match filter.filter_type {
            FilterType::MarketId => filter.value == market_id,
            FilterType::Category => filter.value.to_lowercase() == category_lower,
            FilterType::Keyword => title_lower.contains(&filter.value.to_lowercase()),
        };
        if !matched {
            continue;
        }
        match (filter.filter_type, filter.action) {
            (FilterType::MarketId, FilterAction::Allow) => market_allow = true,
            (FilterType::MarketId, FilterAction::Deny) => market_deny = true,
            (FilterType::Category, FilterAction::Allow) => category_allow = true,
            (FilterType::Category, FilterAction::Deny) => category_deny = true,
            (FilterType::Keyword, FilterAction::Allow) => keyword_allow = true,
            (FilterType::Keyword, FilterAction::Deny) => keyword_deny = true,
        }
    }

    let deny = |reason: &str| FilterVerdict {
        allowed: false,
        reason: Some(reason.to_string()),
    };

    if market_allow {
        return FilterVerdict::allowed();
    }
    if market_deny {
        return deny("market denied by market_id filter");
    }
    if category_allow {
        return FilterVerdict::allowed();
    }
    if category_deny {
        return deny("market denied by category filter");
    }
    // Keyword level: deny takes precedence over allow.
    if keyword_deny {
        return deny("market denied by keyword filter");
    }
    if keyword_allow {
        return FilterVerdict::allowed();
    }

    FilterVerdict::allowed()
}
