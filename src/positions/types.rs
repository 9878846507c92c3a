use chrono::NaiveDate;
use serde::{ Deserialize, Serialize };

/// One open-to-close episode for a ticker (one row of `tracked_stocks`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedPosition {
    /// Surrogate row id; tickers repeat across episodes
    pub id: i64,
    pub ticker: String,
    pub open_date: NaiveDate,
    pub close_date: Option<NaiveDate>,
    pub open_price: f64,
    pub close_price: Option<f64>,
    pub open_crossover_date: Option<NaiveDate>,
    pub open_crossover_price: Option<f64>,
    pub close_crossover_date: Option<NaiveDate>,
    pub close_crossover_price: Option<f64>,
}

impl TrackedPosition {
    pub fn is_open(&self) -> bool {
        self.close_date.is_none()
    }

    pub fn state(&self) -> EpisodeState {
        if self.is_open() { EpisodeState::Open } else { EpisodeState::Closed }
    }
}

/// Ticker state as inferred from its latest episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeState {
    NoPosition,
    Open,
    Closed,
}

impl EpisodeState {
    pub fn of(latest: Option<&TrackedPosition>) -> Self {
        latest.map(|episode| episode.state()).unwrap_or(EpisodeState::NoPosition)
    }
}

/// Date, price and crossover detail written when an episode opens or closes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMark {
    pub date: NaiveDate,
    pub price: f64,
    pub crossover_date: Option<NaiveDate>,
    pub crossover_price: Option<f64>,
}

impl EpisodeMark {
    pub fn new(date: NaiveDate, price: f64) -> Self {
        Self {
            date,
            price,
            crossover_date: None,
            crossover_price: None,
        }
    }

    pub fn with_crossover(mut self, date: Option<NaiveDate>, price: Option<f64>) -> Self {
        self.crossover_date = date;
        self.crossover_price = price;
        self
    }
}

/// Summary row used by the re-evaluation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub ticker: String,
    pub open_date: NaiveDate,
    pub open_crossover_date: Option<NaiveDate>,
    pub open_crossover_price: Option<f64>,
}

/// Statistics about the tracked positions store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionsDatabaseStats {
    pub total_episodes: u64,
    pub open_episodes: u64,
    pub closed_episodes: u64,
    pub distinct_tickers: u64,
    pub schema_version: u32,
}

/// Normalize a ticker symbol: trimmed and upper-cased
pub fn normalize_ticker(ticker: &str) -> Option<String> {
    let normalized = ticker.trim().to_uppercase();
    if normalized.is_empty() || normalized.chars().any(char::is_whitespace) {
        None
    } else {
        Some(normalized)
    }
}
