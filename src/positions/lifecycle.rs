use super::db::PositionsDatabase;
use super::transitions::{ decide, IgnoreReason, PositionTransition };
use super::types::normalize_ticker;
use crate::config::{ ClosePolicy, LifecycleConfig };
use crate::errors::{ TrackerError, TrackerResult };
use crate::logger::{ self, LogLevel, LogTag };
use crate::signals::StageSignal;
use chrono::{ Local, NaiveDate };
use std::future::Future;

/// Result of applying one signal to a ticker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Opened {
        episode_id: i64,
    },
    Closed {
        episode_id: i64,
    },
    Ignored(IgnoreReason),
    /// Another writer kept winning; its write stands and ours was dropped
    LostRace,
}

impl ApplyOutcome {
    /// Level the outcome is reported at: bad input warns, everything else is Info
    pub fn log_level(&self) -> LogLevel {
        match self {
            ApplyOutcome::Ignored(reason) if reason.is_warning() => LogLevel::Warning,
            _ => LogLevel::Info,
        }
    }
}

impl std::fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplyOutcome::Opened { episode_id } => write!(f, "opened episode {}", episode_id),
            ApplyOutcome::Closed { episode_id } => write!(f, "closed episode {}", episode_id),
            ApplyOutcome::Ignored(reason) => write!(f, "ignored ({})", reason),
            ApplyOutcome::LostRace => write!(f, "lost race"),
        }
    }
}

/// Turns stage signals into episode history
///
/// Holds no per-ticker state: every call reads the latest episode inside the
/// same locked transaction that writes the decision.
#[derive(Clone)]
pub struct LifecycleManager {
    store: PositionsDatabase,
    policy: ClosePolicy,
    lost_race_retries: u32,
}

impl LifecycleManager {
    pub fn new(store: PositionsDatabase, config: &LifecycleConfig) -> Self {
        Self {
            store,
            policy: config.close_policy,
            lost_race_retries: config.lost_race_retries,
        }
    }

    /// Apply a signal to a ticker in one transaction
    ///
    /// Lost races (`ConstraintViolation`, `AlreadyClosed`) re-read and
    /// re-decide up to `lost_race_retries` times, then resolve to
    /// `ApplyOutcome::LostRace`. `StoreUnavailable` and `InvariantViolation`
    /// are returned to the caller.
    pub async fn apply(&self, ticker: &str, signal: &StageSignal) -> TrackerResult<ApplyOutcome> {
        let ticker = normalize_ticker(ticker).ok_or_else(||
            TrackerError::InvalidTicker(ticker.to_string())
        )?;
        let observed_on = signal.observed_on.unwrap_or_else(|| Local::now().date_naive());

        let ticker_ref = ticker.as_str();
        let result = retry_lost_race(ticker_ref, self.lost_race_retries, move ||
            self.apply_once(ticker_ref, signal, observed_on)
        ).await;

        match result {
            Ok(outcome) => {
                self.log_outcome(&ticker, signal, observed_on, &outcome);
                Ok(outcome)
            }
            Err(e) => {
                if e.is_critical() {
                    logger::error(LogTag::Positions, &format!("🚨 {}", e));
                } else {
                    logger::warning(
                        LogTag::Positions,
                        &format!("Failed to apply {} to {}: {}", signal.stage, ticker, e)
                    );
                }
                Err(e)
            }
        }
    }

    async fn apply_once(
        &self,
        ticker: &str,
        signal: &StageSignal,
        observed_on: NaiveDate
    ) -> TrackerResult<ApplyOutcome> {
        let policy = self.policy;
        let signal = signal.clone();

        self.store.with_ticker_transaction(ticker, move |tx| {
            let open_rows = tx.open_row_count()?;
            if open_rows > 1 {
                return Err(TrackerError::InvariantViolation {
                    ticker: tx.ticker().to_string(),
                    detail: format!("{} open episodes", open_rows),
                });
            }

            let latest = tx.latest_episode()?;
            let latest_is_open = latest.as_ref().map_or(false, |episode| episode.is_open());
            if open_rows == 1 && !latest_is_open {
                return Err(TrackerError::InvariantViolation {
                    ticker: tx.ticker().to_string(),
                    detail: "open episode is older than the latest closed one".to_string(),
                });
            }

            match decide(latest.as_ref(), &signal, observed_on, policy) {
                PositionTransition::Open { mark } => {
                    let episode_id = tx.open_episode(&mark)?;
                    Ok(ApplyOutcome::Opened { episode_id })
                }
                PositionTransition::Close { episode_id, mark } => {
                    tx.close_episode(episode_id, &mark)?;
                    Ok(ApplyOutcome::Closed { episode_id })
                }
                PositionTransition::Ignore(reason) => Ok(ApplyOutcome::Ignored(reason)),
            }
        }).await
    }

    fn log_outcome(
        &self,
        ticker: &str,
        signal: &StageSignal,
        observed_on: NaiveDate,
        outcome: &ApplyOutcome
    ) {
        let price = signal
            .effective_price()
            .map(|p| format!("{:.4}", p))
            .unwrap_or_else(|| "n/a".to_string());

        let message = match outcome {
            ApplyOutcome::Opened { episode_id } =>
                format!(
                    "🟢 Opened {} (episode {}) on {} at {} [{}]",
                    ticker,
                    episode_id,
                    observed_on,
                    price,
                    signal.stage
                ),
            ApplyOutcome::Closed { episode_id } =>
                format!(
                    "🔴 Closed {} (episode {}) on {} at {} [{}]",
                    ticker,
                    episode_id,
                    observed_on,
                    price,
                    signal.stage
                ),
            ApplyOutcome::Ignored(reason) if reason.is_warning() =>
                format!("Ignored {} for {} on {}: {}", signal.stage, ticker, observed_on, reason),
            ApplyOutcome::Ignored(reason) =>
                format!("No-op {} for {}: {}", signal.stage, ticker, reason),
            // Already reported by the retry loop
            ApplyOutcome::LostRace => {
                return;
            }
        };

        logger::log(LogTag::Positions, outcome.log_level(), &message);
    }
}

/// Run `attempt` until it stops losing races, at most `retries` extra times
///
/// Each attempt is a fresh transaction, so a retry re-reads the latest
/// episode and re-decides. Any other error is returned immediately.
async fn retry_lost_race<F, Fut>(ticker: &str, retries: u32, mut attempt: F) -> TrackerResult<ApplyOutcome>
    where F: FnMut() -> Fut, Fut: Future<Output = TrackerResult<ApplyOutcome>>
{
    let mut retried: u32 = 0;
    loop {
        match attempt().await {
            Err(e) if e.is_lost_race() => {
                if retried < retries {
                    retried += 1;
                    logger::info(
                        LogTag::Positions,
                        &format!(
                            "{} lost a race ({}), re-reading (attempt {}/{})",
                            ticker,
                            e,
                            retried,
                            retries
                        )
                    );
                    continue;
                }
                logger::info(
                    LogTag::Positions,
                    &format!("{} lost a race ({}), keeping the other writer's result", ticker, e)
                );
                return Ok(ApplyOutcome::LostRace);
            }
            other => {
                return other;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{ AtomicU32, Ordering };

    fn constraint_violation() -> TrackerError {
        TrackerError::ConstraintViolation { ticker: "XYZ".to_string() }
    }

    #[tokio::test]
    async fn test_lost_race_retried_then_given_up() {
        let calls = AtomicU32::new(0);
        let retries = LifecycleConfig::default().lost_race_retries;

        let outcome = retry_lost_race("XYZ", retries, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<ApplyOutcome, _>(constraint_violation()) }
        }).await;

        assert_eq!(outcome.unwrap(), ApplyOutcome::LostRace);
        assert_eq!(calls.load(Ordering::SeqCst), retries + 1);
    }

    #[tokio::test]
    async fn test_retry_rereads_after_already_closed() {
        let calls = AtomicU32::new(0);

        let outcome = retry_lost_race("XYZ", 1, || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    Err(TrackerError::AlreadyClosed { episode_id: 3 })
                } else {
                    Ok(ApplyOutcome::Ignored(IgnoreReason::NoPositionToClose))
                }
            }
        }).await;

        assert_eq!(outcome.unwrap(), ApplyOutcome::Ignored(IgnoreReason::NoPositionToClose));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_store_error_not_retried() {
        let calls = AtomicU32::new(0);

        let outcome = retry_lost_race("XYZ", 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<ApplyOutcome, _>(TrackerError::StoreUnavailable("database is locked".to_string())) }
        }).await;

        assert!(matches!(outcome, Err(TrackerError::StoreUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_op_decisions_logged_at_info() {
        for reason in [
            IgnoreReason::DuplicateOpenSignal,
            IgnoreReason::NoPositionToClose,
            IgnoreReason::StageDoesNotClose,
        ] {
            assert_eq!(ApplyOutcome::Ignored(reason).log_level(), LogLevel::Info);
        }
        assert_eq!(ApplyOutcome::Ignored(IgnoreReason::MissingPrice).log_level(), LogLevel::Warning);
        assert_eq!(ApplyOutcome::Ignored(IgnoreReason::StaleSignal).log_level(), LogLevel::Warning);
        assert_eq!(ApplyOutcome::Opened { episode_id: 1 }.log_level(), LogLevel::Info);
        assert_eq!(ApplyOutcome::LostRace.log_level(), LogLevel::Info);
    }

    #[tokio::test]
    async fn test_zero_retries_gives_up_at_once() {
        let calls = AtomicU32::new(0);

        let outcome = retry_lost_race("XYZ", 0, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<ApplyOutcome, _>(constraint_violation()) }
        }).await;

        assert_eq!(outcome.unwrap(), ApplyOutcome::LostRace);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
