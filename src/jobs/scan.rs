use super::providers::{ PriceHistoryProvider, StageClassifier };
use crate::config::JobsConfig;
use crate::errors::{ TrackerError, TrackerResult };
use crate::logger::{ self, LogTag };
use crate::positions::{ ApplyOutcome, LifecycleManager, QueryService };
use crate::signals::parse_signal;
use futures::stream::{ self, StreamExt };
use serde::Serialize;
use std::sync::Arc;
use std::time::{ Duration, Instant };

/// Counters for one scan or re-evaluation round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub processed: usize,
    pub opened: usize,
    pub closed: usize,
    pub ignored: usize,
    pub lost_races: usize,
    pub unparsed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub invariant_violations: usize,
}

impl ScanReport {
    fn record_outcome(&mut self, outcome: &ApplyOutcome) {
        match outcome {
            ApplyOutcome::Opened { .. } => {
                self.opened += 1;
            }
            ApplyOutcome::Closed { .. } => {
                self.closed += 1;
            }
            ApplyOutcome::Ignored(_) => {
                self.ignored += 1;
            }
            ApplyOutcome::LostRace => {
                self.lost_races += 1;
            }
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "processed={} opened={} closed={} ignored={} lost_races={} unparsed={} failed={} timed_out={} invariant_violations={}",
            self.processed,
            self.opened,
            self.closed,
            self.ignored,
            self.lost_races,
            self.unparsed,
            self.failed,
            self.timed_out,
            self.invariant_violations
        )
    }
}

/// Per-ticker result inside a round
enum TickerStep {
    Applied(ApplyOutcome),
    Unparsed,
    Skipped(String),
    TimedOut,
    Failed(TrackerError),
}

/// Fetch, classify, parse and apply for a set of tickers
#[derive(Clone)]
pub struct SignalJob {
    manager: LifecycleManager,
    queries: QueryService,
    prices: Arc<dyn PriceHistoryProvider>,
    classifier: Arc<dyn StageClassifier>,
    config: JobsConfig,
}

impl SignalJob {
    pub fn new(
        manager: LifecycleManager,
        queries: QueryService,
        prices: Arc<dyn PriceHistoryProvider>,
        classifier: Arc<dyn StageClassifier>,
        config: JobsConfig
    ) -> Self {
        Self {
            manager,
            queries,
            prices,
            classifier,
            config,
        }
    }

    /// Run one round over `tickers`
    ///
    /// Provider, classifier and parse failures skip the ticker. A
    /// `StoreUnavailable` error ends the round and is returned; invariant
    /// violations are counted and the round continues with other tickers.
    pub async fn run_scan(&self, tickers: &[String]) -> TrackerResult<ScanReport> {
        let started = Instant::now();
        let mut report = ScanReport::default();

        logger::info(LogTag::Jobs, &format!("Starting scan of {} tickers", tickers.len()));

        let mut results = stream
            ::iter(
                tickers
                    .iter()
                    .cloned()
                    .map(|ticker| {
                        let job = self.clone();
                        async move {
                            let step = job.process_ticker(&ticker).await;
                            (ticker, step)
                        }
                    })
            )
            .buffer_unordered(self.config.concurrency.max(1));

        while let Some((ticker, step)) = results.next().await {
            report.processed += 1;
            match step {
                TickerStep::Applied(outcome) => report.record_outcome(&outcome),
                TickerStep::Unparsed => {
                    report.unparsed += 1;
                    logger::info(
                        LogTag::Signals,
                        &format!("No actionable signal for {} this round", ticker)
                    );
                }
                TickerStep::Skipped(reason) => {
                    report.failed += 1;
                    logger::warning(LogTag::Jobs, &format!("Skipping {}: {}", ticker, reason));
                }
                TickerStep::TimedOut => {
                    report.timed_out += 1;
                    logger::warning(
                        LogTag::Jobs,
                        &format!(
                            "Apply for {} timed out after {}s; next round will observe the stored state",
                            ticker,
                            self.config.apply_timeout_secs
                        )
                    );
                }
                TickerStep::Failed(e) if e.is_recoverable() => {
                    logger::error(
                        LogTag::Jobs,
                        &format!("Aborting round at {}, retry next cycle: {}", ticker, e)
                    );
                    return Err(e);
                }
                TickerStep::Failed(e @ TrackerError::InvariantViolation { .. }) => {
                    report.invariant_violations += 1;
                    logger::error(LogTag::Jobs, &format!("{} needs manual repair: {}", ticker, e));
                }
                TickerStep::Failed(e) => {
                    report.failed += 1;
                    logger::warning(LogTag::Jobs, &format!("Failed to apply signal for {}: {}", ticker, e));
                }
            }
        }

        logger::info(
            LogTag::Jobs,
            &format!("Scan finished in {:.2}s: {}", started.elapsed().as_secs_f64(), report.summary())
        );

        Ok(report)
    }

    /// Fresh signals for every ticker with an open episode
    pub async fn reevaluate_open_positions(&self) -> TrackerResult<ScanReport> {
        let tickers: Vec<String> = self.queries
            .open_positions().await?
            .into_iter()
            .map(|position| position.ticker)
            .collect();

        if tickers.is_empty() {
            logger::debug(LogTag::Jobs, "No open positions to re-evaluate");
            return Ok(ScanReport::default());
        }

        self.run_scan(&tickers).await
    }

    async fn process_ticker(&self, ticker: &str) -> TickerStep {
        let history = match self.prices.price_history(ticker, self.config.history_days).await {
            Ok(history) => history,
            Err(e) => {
                return TickerStep::Skipped(format!("price history unavailable: {}", e));
            }
        };

        let last_bar = match history.last() {
            Some(bar) => bar.clone(),
            None => {
                return TickerStep::Skipped("empty price history".to_string());
            }
        };

        let text = match self.classifier.classify(ticker, &history).await {
            Ok(text) => text,
            Err(e) => {
                return TickerStep::Skipped(format!("classifier failed: {}", e));
            }
        };

        logger::verbose(LogTag::Signals, &format!("{} classifier response: {}", ticker, text));

        let signal = match parse_signal(&text) {
            Some(signal) => signal.with_price(last_bar.close).observed_on(last_bar.date),
            None => {
                return TickerStep::Unparsed;
            }
        };

        let timeout = Duration::from_secs(self.config.apply_timeout_secs.max(1));
        match tokio::time::timeout(timeout, self.manager.apply(ticker, &signal)).await {
            Ok(Ok(outcome)) => TickerStep::Applied(outcome),
            Ok(Err(e)) => TickerStep::Failed(e),
            Err(_) => TickerStep::TimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ DatabaseConfig, LifecycleConfig };
    use crate::jobs::providers::PriceBar;
    use crate::positions::PositionsDatabase;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use parking_lot::Mutex;
    use rusqlite::Connection;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct StaticPrices {
        bars: HashMap<String, Vec<PriceBar>>,
    }

    #[async_trait]
    impl PriceHistoryProvider for StaticPrices {
        async fn price_history(&self, ticker: &str, _days: u32) -> anyhow::Result<Vec<PriceBar>> {
            match self.bars.get(ticker) {
                Some(bars) => Ok(bars.clone()),
                None => anyhow::bail!("no data for {}", ticker),
            }
        }
    }

    /// Answers from a mutable table so a test can move tickers between stages
    struct ScriptedClassifier {
        answers: Mutex<HashMap<String, String>>,
    }

    impl ScriptedClassifier {
        fn set(&self, ticker: &str, answer: &str) {
            self.answers.lock().insert(ticker.to_string(), answer.to_string());
        }
    }

    #[async_trait]
    impl StageClassifier for ScriptedClassifier {
        async fn classify(&self, ticker: &str, _history: &[PriceBar]) -> anyhow::Result<String> {
            self.answers
                .lock()
                .get(ticker)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("model refused {}", ticker))
        }
    }

    fn bar(day: u32, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2025, 5, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000.0,
        }
    }

    fn tickers(names: &[&str]) -> Vec<String> {
        names
            .iter()
            .map(|name| name.to_string())
            .collect()
    }

    fn setup(
        db_config: DatabaseConfig,
        jobs_config: JobsConfig
    ) -> (SignalJob, Arc<ScriptedClassifier>, QueryService) {
        let store = PositionsDatabase::open(&db_config).unwrap();
        let manager = LifecycleManager::new(store.clone(), &LifecycleConfig::default());
        let queries = QueryService::new(store);

        let mut bars = HashMap::new();
        bars.insert("AAA".to_string(), vec![bar(20, 1.0), bar(21, 1.25)]);
        bars.insert("BBB".to_string(), vec![bar(21, 7.5)]);
        bars.insert("CCC".to_string(), vec![bar(21, 3.0)]);
        bars.insert("EMPTY".to_string(), Vec::new());

        let classifier = Arc::new(ScriptedClassifier { answers: Mutex::new(HashMap::new()) });
        let job = SignalJob::new(
            manager,
            queries.clone(),
            Arc::new(StaticPrices { bars }),
            classifier.clone(),
            jobs_config
        );
        (job, classifier, queries)
    }

    fn db_config(dir: &TempDir) -> DatabaseConfig {
        DatabaseConfig {
            path: dir.path().join("jobs.db").to_string_lossy().to_string(),
            ..DatabaseConfig::default()
        }
    }

    #[tokio::test]
    async fn test_scan_counts_each_path() {
        let dir = TempDir::new().unwrap();
        let (job, classifier, queries) = setup(db_config(&dir), JobsConfig::default());
        classifier.set("AAA", "STAGE2 Crossover on 2025-05-20 at $1.10");
        classifier.set("BBB", "STAGE4");
        classifier.set("CCC", "I cannot determine the stage");
        classifier.set("EMPTY", "STAGE2");

        let report = job.run_scan(&tickers(&["AAA", "BBB", "CCC", "EMPTY", "NODATA"])).await.unwrap();

        assert_eq!(report.processed, 5);
        assert_eq!(report.opened, 1);
        assert_eq!(report.ignored, 1);
        assert_eq!(report.unparsed, 1);
        assert_eq!(report.failed, 2);

        let open = queries.open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].ticker, "AAA");
        assert_eq!(open[0].open_date, NaiveDate::from_ymd_opt(2025, 5, 21).unwrap());
        assert_eq!(open[0].open_crossover_price, Some(1.1));

        // Price comes from the last bar, not the crossover
        let history = queries.history("AAA").await.unwrap();
        assert_eq!(history[0].open_price, 1.25);
    }

    #[tokio::test]
    async fn test_reevaluate_closes_open_positions() {
        let dir = TempDir::new().unwrap();
        let (job, classifier, queries) = setup(db_config(&dir), JobsConfig::default());

        classifier.set("AAA", "STAGE2");
        classifier.set("BBB", "STAGE2");
        let first = job.run_scan(&tickers(&["AAA", "BBB"])).await.unwrap();
        assert_eq!(first.opened, 2);

        classifier.set("AAA", "STAGE3 on 2025-05-21 at $1.30");
        let report = job.reevaluate_open_positions().await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.closed, 1);
        assert_eq!(report.ignored, 1);

        let open = queries.open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].ticker, "BBB");
    }

    #[tokio::test]
    async fn test_reevaluate_with_nothing_open() {
        let dir = TempDir::new().unwrap();
        let (job, _classifier, _queries) = setup(db_config(&dir), JobsConfig::default());
        assert_eq!(job.reevaluate_open_positions().await.unwrap(), ScanReport::default());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_locked_store_aborts_round() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            busy_timeout_ms: 100,
            ..db_config(&dir)
        };
        let jobs_config = JobsConfig {
            concurrency: 1,
            ..JobsConfig::default()
        };
        let (job, classifier, _queries) = setup(config.clone(), jobs_config);
        classifier.set("AAA", "STAGE2");

        let blocker = Connection::open(&config.path).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE;").unwrap();

        let result = job.run_scan(&tickers(&["AAA"])).await;
        assert!(matches!(result, Err(TrackerError::StoreUnavailable(_))));

        blocker.execute_batch("ROLLBACK;").unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_store_times_out() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            busy_timeout_ms: 2_500,
            ..db_config(&dir)
        };
        let jobs_config = JobsConfig {
            apply_timeout_secs: 1,
            ..JobsConfig::default()
        };
        let (job, classifier, _queries) = setup(config.clone(), jobs_config);
        classifier.set("AAA", "STAGE2");

        let blocker = Connection::open(&config.path).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE;").unwrap();

        let report = job.run_scan(&tickers(&["AAA"])).await.unwrap();
        assert_eq!(report.timed_out, 1);
        assert_eq!(report.opened, 0);

        blocker.execute_batch("ROLLBACK;").unwrap();
    }
}
