use super::db::PositionsDatabase;
use super::types::{ normalize_ticker, OpenPosition, PositionsDatabaseStats, TrackedPosition };
use crate::errors::{ TrackerError, TrackerResult };

/// Read-only accessors over the episode history
#[derive(Clone)]
pub struct QueryService {
    store: PositionsDatabase,
}

impl QueryService {
    pub fn new(store: PositionsDatabase) -> Self {
        Self { store }
    }

    /// Tickers that currently hold an open episode, for re-evaluation
    pub async fn open_positions(&self) -> TrackerResult<Vec<OpenPosition>> {
        self.store.get_open_positions().await
    }

    /// Every episode for the ticker, oldest first
    pub async fn history(&self, ticker: &str) -> TrackerResult<Vec<TrackedPosition>> {
        let ticker = normalize_ticker(ticker).ok_or_else(||
            TrackerError::InvalidTicker(ticker.to_string())
        )?;
        self.store.get_history(&ticker).await
    }

    pub async fn tracked_tickers(&self) -> TrackerResult<Vec<String>> {
        self.store.get_tracked_tickers().await
    }

    pub async fn stats(&self) -> TrackerResult<PositionsDatabaseStats> {
        self.store.get_database_stats().await
    }
}
