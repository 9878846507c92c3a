use thiserror::Error;

/// Errors raised by the position lifecycle tracker
///
/// The variants follow the failure taxonomy of the tracker:
/// - `ParseFailure` - no stage token in a classifier response (skip the ticker this round)
/// - `ConstraintViolation` / `AlreadyClosed` - another writer won the race
/// - `StoreUnavailable` - connection or transaction infrastructure failure
/// - `InvariantViolation` - the stored history is inconsistent and needs manual repair
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("No stage token found in signal text")] ParseFailure,

    #[error("Open episode already exists for {ticker}")] ConstraintViolation {
        ticker: String,
    },

    #[error("Episode {episode_id} was already closed")] AlreadyClosed {
        episode_id: i64,
    },

    #[error("Episode {episode_id} not found for {ticker}")] EpisodeNotFound {
        ticker: String,
        episode_id: i64,
    },

    #[error("Store unavailable: {0}")] StoreUnavailable(String),

    #[error("Invariant violation for {ticker}: {detail}")] InvariantViolation {
        ticker: String,
        detail: String,
    },

    #[error("Invalid episode: {0}")] InvalidEpisode(String),

    #[error("Invalid ticker: {0:?}")] InvalidTicker(String),

    #[error("Configuration error: {0}")] Config(String),
}

impl TrackerError {
    /// Another writer acted on the ticker between our read and our write
    pub fn is_lost_race(&self) -> bool {
        matches!(
            self,
            TrackerError::ConstraintViolation { .. } | TrackerError::AlreadyClosed { .. }
        )
    }

    /// Infrastructure failure; the caller stops and retries on the next cycle
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TrackerError::StoreUnavailable(_))
    }

    pub fn is_critical(&self) -> bool {
        match self {
            TrackerError::InvariantViolation { .. } => true,
            TrackerError::Config(_) => true,
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for TrackerError {
    fn from(error: rusqlite::Error) -> Self {
        TrackerError::StoreUnavailable(format!("sqlite: {}", error))
    }
}

impl From<r2d2::Error> for TrackerError {
    fn from(error: r2d2::Error) -> Self {
        TrackerError::StoreUnavailable(format!("connection pool: {}", error))
    }
}

impl From<tokio::task::JoinError> for TrackerError {
    fn from(error: tokio::task::JoinError) -> Self {
        TrackerError::StoreUnavailable(format!("store task failed: {}", error))
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
