//! Assistant usage log (`stats-cache.json`): today's counters, a cost
//! estimate and the trailing seven-day trend.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{Duration, NaiveDate};
use serde::Deserialize;

use crate::error::UsageError;
use crate::types::{DailyUsage, DayTrend, UsageStats};

pub const USAGE_LOG_FILE: &str = "stats-cache.json";

const DATE_FMT: &str = "%Y-%m-%d";
const TREND_DAYS: i64 = 7;

// Assumed token split for the cost estimate.
const INPUT_SHARE: f64 = 0.3;
const OUTPUT_SHARE: f64 = 0.7;

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

// First entry whose key is a substring of the model name wins.
const PRICING: &[(&str, ModelPrice)] = &[(
    "opus",
    ModelPrice {
        input: 15.0,
        output: 75.0,
    },
)];
const DEFAULT_PRICE: ModelPrice = ModelPrice {
    input: 3.0,
    output: 15.0,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub session_count: u64,
    #[serde(default)]
    pub tool_call_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelTokensEntry {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub tokens_by_model: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageLog {
    #[serde(default)]
    pub daily_activity: Vec<ActivityEntry>,
    #[serde(default)]
    pub daily_model_tokens: Vec<ModelTokensEntry>,
}

pub fn price_for(model: &str) -> ModelPrice {
    PRICING
        .iter()
        .find(|(key, _)| model.contains(key))
        .map(|(_, p)| *p)
        .unwrap_or(DEFAULT_PRICE)
}

/// Estimated USD cost of a day's tokens. A heuristic: flat per-model prices and
/// a fixed 30/70 input/output split, not metered billing.
pub fn estimate_cost(tokens_by_model: &HashMap<String, u64>) -> f64 {
    tokens_by_model
        .iter()
        .map(|(model, &tokens)| {
            let price = price_for(model);
            let tokens = tokens as f64;
            (tokens * INPUT_SHARE / 1_000_000.0 * price.input)
                + (tokens * OUTPUT_SHARE / 1_000_000.0 * price.output)
        })
        .sum()
}

impl UsageLog {
    pub fn parse(s: &str) -> Result<Self, UsageError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, UsageError> {
        let s = std::fs::read_to_string(path)?;
        Self::parse(&s)
    }

    fn activity_on(&self, date: &str) -> Option<&ActivityEntry> {
        self.daily_activity.iter().find(|a| a.date == date)
    }

    fn tokens_on(&self, date: &str) -> Option<&ModelTokensEntry> {
        self.daily_model_tokens.iter().find(|t| t.date == date)
    }

    /// Counters for `today`, or `None` when the log has no activity entry for it.
    pub fn day(&self, today: NaiveDate) -> Option<DailyUsage> {
        let key = today.format(DATE_FMT).to_string();
        let activity = self.activity_on(&key)?;
        let (token_count, estimated_cost_usd) = self
            .tokens_on(&key)
            .map(|t| (t.tokens_by_model.values().sum::<u64>(), estimate_cost(&t.tokens_by_model)))
            .unwrap_or((0, 0.0));
        Some(DailyUsage {
            message_count: activity.message_count,
            session_count: activity.session_count,
            tool_call_count: activity.tool_call_count,
            token_count,
            estimated_cost_usd,
        })
    }

    /// Days in `today - 6 ..= today` that appear in the log, ascending.
    pub fn weekly(&self, today: NaiveDate) -> Vec<DayTrend> {
        let start = today - Duration::days(TREND_DAYS - 1);
        let mut days: BTreeMap<NaiveDate, DayTrend> = BTreeMap::new();
        for entry in &self.daily_activity {
            let Ok(date) = NaiveDate::parse_from_str(&entry.date, DATE_FMT) else {
                continue;
            };
            if date < start || date > today || days.contains_key(&date) {
                continue;
            }
            let token_count = self
                .tokens_on(&entry.date)
                .map(|t| t.tokens_by_model.values().sum::<u64>())
                .unwrap_or(0);
            days.insert(
                date,
                DayTrend {
                    date: entry.date.clone(),
                    message_count: entry.message_count,
                    token_count,
                },
            );
        }
        days.into_values().collect()
    }

    pub fn stats(&self, today: NaiveDate) -> UsageStats {
        UsageStats {
            today: self.day(today),
            weekly: self.weekly(today),
        }
    }
}

/// Probe entry point: `None` when the log is missing or corrupt.
pub fn read_usage(path: &Path, today: NaiveDate) -> Option<UsageStats> {
    match UsageLog::load(path) {
        Ok(log) => Some(log.stats(today)),
        Err(e) => {
            tracing::debug!("no usage data from {}: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FMT).unwrap()
    }

    const LOG: &str = r#"{
        "dailyActivity": [
            {"date": "2026-10-10", "messageCount": 99, "sessionCount": 1, "toolCallCount": 1},
            {"date": "2026-10-13", "messageCount": 4,  "sessionCount": 1, "toolCallCount": 2},
            {"date": "2026-10-19", "messageCount": 12, "sessionCount": 3, "toolCallCount": 40},
            {"date": "2026-10-15", "messageCount": 7,  "sessionCount": 2, "toolCallCount": 5},
            {"date": "2026-10-20", "messageCount": 1,  "sessionCount": 1, "toolCallCount": 1},
            {"date": "2026-10-18", "messageCount": 0,  "sessionCount": 0, "toolCallCount": 0}
        ],
        "dailyModelTokens": [
            {"date": "2026-10-19", "tokensByModel": {"claude-opus-4": 1000000, "claude-sonnet-4": 1000000}},
            {"date": "2026-10-15", "tokensByModel": {"claude-sonnet-4": 2500}}
        ]
    }"#;

    #[test]
    fn today_counters_and_tokens() {
        let log = UsageLog::parse(LOG).unwrap();
        let today = log.day(d("2026-10-19")).unwrap();
        assert_eq!(today.message_count, 12);
        assert_eq!(today.session_count, 3);
        assert_eq!(today.tool_call_count, 40);
        assert_eq!(today.token_count, 2_000_000);
        assert!((today.estimated_cost_usd - (57.0 + 11.4)).abs() < 1e-9);
    }

    #[test]
    fn absent_day_is_no_data_not_zero() {
        let log = UsageLog::parse(LOG).unwrap();
        assert_eq!(log.day(d("2026-10-17")), None);
        let zero = log.day(d("2026-10-18")).unwrap();
        assert_eq!(zero, DailyUsage::default());
    }

    #[test]
    fn cost_uses_flat_price_table() {
        let mut m = HashMap::new();
        m.insert("claude-sonnet-4".to_string(), 1_000_000);
        assert!((estimate_cost(&m) - 11.4).abs() < 1e-9);
        m.clear();
        m.insert("claude-opus-4-1".to_string(), 1_000_000);
        assert!((estimate_cost(&m) - 57.0).abs() < 1e-9);
        // unknown models fall back to the default price
        assert_eq!(price_for("claude-haiku"), DEFAULT_PRICE);
    }

    #[test]
    fn weekly_window_is_ascending_and_sparse() {
        let log = UsageLog::parse(LOG).unwrap();
        let week = log.weekly(d("2026-10-19"));
        let dates: Vec<&str> = week.iter().map(|t| t.date.as_str()).collect();
        assert_eq!(dates, vec!["2026-10-13", "2026-10-15", "2026-10-18", "2026-10-19"]);
        assert_eq!(week[1].token_count, 2500);
        assert_eq!(week[0].token_count, 0);
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let log = UsageLog::parse("{}").unwrap();
        let stats = log.stats(d("2026-10-19"));
        assert_eq!(stats.today, None);
        assert!(stats.weekly.is_empty());
    }

    #[test]
    fn corrupt_or_missing_file_is_none() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join(USAGE_LOG_FILE);
        assert_eq!(read_usage(&path, d("2026-10-19")), None);
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(read_usage(&path, d("2026-10-19")), None);
        std::fs::write(&path, LOG).unwrap();
        assert!(read_usage(&path, d("2026-10-19")).is_some());
    }
}
