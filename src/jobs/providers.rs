//! Collaborator interfaces consumed by the job loops
//!
//! Market data and stage classification live outside this crate. A job only
//! needs an ordered price history for a ticker and the classifier's raw text
//! answer for that history.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{ Deserialize, Serialize };

/// One daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Source of daily price history
#[async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    /// Bars for the last `days` days, oldest first
    async fn price_history(&self, ticker: &str, days: u32) -> anyhow::Result<Vec<PriceBar>>;
}

/// Stage classifier returning free text such as
/// `STAGE2 Crossover on 2025-05-21 at $4.71`
#[async_trait]
pub trait StageClassifier: Send + Sync {
    async fn classify(&self, ticker: &str, history: &[PriceBar]) -> anyhow::Result<String>;
}
