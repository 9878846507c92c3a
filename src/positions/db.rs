use r2d2::{ Pool, PooledConnection };
use r2d2_sqlite::SqliteConnectionManager;
/// Database module for tracked positions
///
/// This module provides:
/// - A pooled SQLite store for the `tracked_stocks` episode table
/// - Per-ticker transactions that read and write under one immediate lock
/// - Schema-level guards for the episode invariants (one open row per
///   ticker, close after open, closed rows immutable, no deletes)
use rusqlite::{ params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior };
use std::path::Path;
use std::time::Duration;

use super::locks::TickerLocks;
use super::types::{ EpisodeMark, OpenPosition, PositionsDatabaseStats, TrackedPosition };
use crate::config::DatabaseConfig;
use crate::errors::{ TrackerError, TrackerResult };
use crate::logger::{ self, LogTag };

// Database schema version
const POSITIONS_SCHEMA_VERSION: u32 = 1;

// =============================================================================
// DATABASE SCHEMA DEFINITIONS
// =============================================================================

const SCHEMA_TRACKED_STOCKS: &str =
    r#"
CREATE TABLE IF NOT EXISTS tracked_stocks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker TEXT NOT NULL,
    open_date TEXT NOT NULL,
    close_date TEXT,
    open_price REAL NOT NULL,
    close_price REAL,
    open_crossover_date TEXT,
    open_crossover_price REAL,
    close_crossover_date TEXT,
    close_crossover_price REAL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    closed_at TEXT,
    CHECK ((close_date IS NULL) = (close_price IS NULL)),
    CHECK (close_date IS NULL OR close_date >= open_date)
);
"#;

const SCHEMA_METADATA: &str =
    r#"
CREATE TABLE IF NOT EXISTS tracked_stocks_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const POSITIONS_INDEXES: &[&str] = &[
    // At most one open episode per ticker, enforced across processes
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_tracked_stocks_one_open ON tracked_stocks(ticker) WHERE close_date IS NULL;",
    "CREATE INDEX IF NOT EXISTS idx_tracked_stocks_ticker_open_date ON tracked_stocks(ticker, open_date DESC, id DESC);",
];

const POSITIONS_TRIGGERS: &[&str] = &[
    r#"CREATE TRIGGER IF NOT EXISTS trg_tracked_stocks_closed_immutable
       BEFORE UPDATE ON tracked_stocks
       WHEN OLD.close_date IS NOT NULL
       BEGIN SELECT RAISE(ABORT, 'closed episodes are immutable'); END;"#,
    r#"CREATE TRIGGER IF NOT EXISTS trg_tracked_stocks_append_only
       BEFORE DELETE ON tracked_stocks
       BEGIN SELECT RAISE(ABORT, 'episode history is append-only'); END;"#,
];

const EPISODE_COLUMNS: &str =
    "id, ticker, open_date, close_date, open_price, close_price, \
     open_crossover_date, open_crossover_price, close_crossover_date, close_crossover_price";

// =============================================================================
// PER-TICKER TRANSACTION
// =============================================================================

/// An immediate transaction scoped to one ticker
///
/// Created by `PositionsDatabase::with_ticker_transaction`, which holds the
/// ticker's lock for the lifetime of the transaction. Dropping it without a
/// commit rolls everything back.
pub struct EpisodeTransaction<'conn> {
    tx: Transaction<'conn>,
    ticker: String,
}

impl<'conn> EpisodeTransaction<'conn> {
    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Most recently opened episode (open_date descending, then insertion order)
    pub fn latest_episode(&self) -> TrackerResult<Option<TrackedPosition>> {
        let sql = format!(
            "SELECT {} FROM tracked_stocks WHERE ticker = ?1 ORDER BY open_date DESC, id DESC LIMIT 1",
            EPISODE_COLUMNS
        );
        let episode = self.tx
            .query_row(&sql, params![self.ticker], row_to_position)
            .optional()?;
        Ok(episode)
    }

    pub fn open_row_count(&self) -> TrackerResult<u32> {
        let count: i64 = self.tx.query_row(
            "SELECT COUNT(*) FROM tracked_stocks WHERE ticker = ?1 AND close_date IS NULL",
            params![self.ticker],
            |row| row.get(0)
        )?;
        Ok(count as u32)
    }

    /// Insert a new open episode and return its id
    ///
    /// Fails with `ConstraintViolation` when the ticker already has an open episode.
    pub fn open_episode(&self, mark: &EpisodeMark) -> TrackerResult<i64> {
        validate_price(mark.price)?;

        if self.open_row_count()? > 0 {
            return Err(TrackerError::ConstraintViolation {
                ticker: self.ticker.clone(),
            });
        }

        let inserted = self.tx.query_row(
            r#"
            INSERT INTO tracked_stocks (
                ticker, open_date, open_price, open_crossover_date, open_crossover_price
            ) VALUES (?1, ?2, ?3, ?4, ?5) RETURNING id
            "#,
            params![
                self.ticker,
                mark.date,
                mark.price,
                mark.crossover_date,
                mark.crossover_price
            ],
            |row| row.get::<_, i64>(0)
        );

        match inserted {
            Ok(episode_id) => {
                logger::debug(
                    LogTag::Store,
                    &format!(
                        "Inserted episode {} for {} (open {} at {:.4})",
                        episode_id,
                        self.ticker,
                        mark.date,
                        mark.price
                    )
                );
                Ok(episode_id)
            }
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
                Err(TrackerError::ConstraintViolation {
                    ticker: self.ticker.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fill the close columns of an open episode
    ///
    /// Fails with `AlreadyClosed` when the row is no longer open, detected by
    /// conditioning the update on `close_date IS NULL`.
    pub fn close_episode(&self, episode_id: i64, mark: &EpisodeMark) -> TrackerResult<()> {
        validate_price(mark.price)?;

        let existing = self.tx
            .query_row(
                "SELECT ticker, open_date, close_date FROM tracked_stocks WHERE id = ?1",
                params![episode_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, chrono::NaiveDate>(1)?,
                        row.get::<_, Option<chrono::NaiveDate>>(2)?,
                    ))
                }
            )
            .optional()?;

        let (ticker, open_date, close_date) = match existing {
            Some(row) if row.0 == self.ticker => row,
            _ => {
                return Err(TrackerError::EpisodeNotFound {
                    ticker: self.ticker.clone(),
                    episode_id,
                });
            }
        };

        if close_date.is_some() {
            return Err(TrackerError::AlreadyClosed { episode_id });
        }

        if mark.date < open_date {
            return Err(
                TrackerError::InvalidEpisode(
                    format!(
                        "{} episode {} cannot close on {} before its open date {}",
                        ticker,
                        episode_id,
                        mark.date,
                        open_date
                    )
                )
            );
        }

        let rows_affected = self.tx.execute(
            r#"
            UPDATE tracked_stocks SET
                close_date = ?2, close_price = ?3,
                close_crossover_date = ?4, close_crossover_price = ?5,
                closed_at = datetime('now')
            WHERE id = ?1 AND close_date IS NULL
            "#,
            params![episode_id, mark.date, mark.price, mark.crossover_date, mark.crossover_price]
        )?;

        if rows_affected != 1 {
            return Err(TrackerError::AlreadyClosed { episode_id });
        }

        logger::debug(
            LogTag::Store,
            &format!(
                "Closed episode {} for {} ({} at {:.4})",
                episode_id,
                self.ticker,
                mark.date,
                mark.price
            )
        );

        Ok(())
    }

    fn commit(self) -> TrackerResult<()> {
        self.tx.commit()?;
        Ok(())
    }
}

fn validate_price(price: f64) -> TrackerResult<()> {
    if price.is_finite() && price >= 0.0 {
        Ok(())
    } else {
        Err(TrackerError::InvalidEpisode(format!("price must be a non-negative number, got {}", price)))
    }
}

fn row_to_position(row: &rusqlite::Row) -> rusqlite::Result<TrackedPosition> {
    Ok(TrackedPosition {
        id: row.get(0)?,
        ticker: row.get(1)?,
        open_date: row.get(2)?,
        close_date: row.get(3)?,
        open_price: row.get(4)?,
        close_price: row.get(5)?,
        open_crossover_date: row.get(6)?,
        open_crossover_price: row.get(7)?,
        close_crossover_date: row.get(8)?,
        close_crossover_price: row.get(9)?,
    })
}

// =============================================================================
// POSITIONS DATABASE MANAGER
// =============================================================================

/// Pooled, thread-safe store for tracked position episodes
///
/// Cloning is cheap and shares the pool and the ticker lock registry. Every
/// write goes through `with_ticker_transaction`; reads use plain pooled
/// connections with SQLite's normal read isolation.
#[derive(Clone)]
pub struct PositionsDatabase {
    pool: Pool<SqliteConnectionManager>,
    database_path: String,
    locks: TickerLocks,
}

impl PositionsDatabase {
    /// Open (creating if needed) the file-backed store described by `config`
    pub fn open(config: &DatabaseConfig) -> TrackerResult<Self> {
        let database_path = Path::new(&config.path);
        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs
                    ::create_dir_all(parent)
                    .map_err(|e| {
                        TrackerError::StoreUnavailable(
                            format!("Failed to create data directory: {}", e)
                        )
                    })?;
            }
        }

        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let manager = SqliteConnectionManager::file(database_path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });

        let pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .min_idle(Some(1))
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs.max(1)))
            .build(manager)?;

        let db = PositionsDatabase {
            pool,
            database_path: config.path.clone(),
            locks: TickerLocks::new(),
        };
        db.initialize_schema(true)?;

        logger::info(LogTag::Store, &format!("Positions database ready at {}", config.path));

        Ok(db)
    }

    /// Private in-memory store on a single pooled connection
    pub fn in_memory() -> TrackerResult<Self> {
        let manager = SqliteConnectionManager::memory();

        // The database lives and dies with the connection, so never recycle it
        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;

        let db = PositionsDatabase {
            pool,
            database_path: ":memory:".to_string(),
            locks: TickerLocks::new(),
        };
        db.initialize_schema(false)?;

        Ok(db)
    }

    /// Initialize database schema with tables, indexes and guard triggers
    fn initialize_schema(&self, use_wal: bool) -> TrackerResult<()> {
        let conn = self.get_connection()?;

        if use_wal {
            let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row|
                row.get(0)
            )?;
            logger::debug(LogTag::Store, &format!("journal_mode = {}", mode));
            conn.pragma_update(None, "synchronous", "NORMAL")?;
        }

        conn.execute_batch(SCHEMA_TRACKED_STOCKS)?;
        conn.execute_batch(SCHEMA_METADATA)?;

        for index_sql in POSITIONS_INDEXES {
            conn.execute_batch(index_sql)?;
        }
        for trigger_sql in POSITIONS_TRIGGERS {
            conn.execute_batch(trigger_sql)?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO tracked_stocks_metadata (key, value) VALUES ('schema_version', ?1)",
            params![POSITIONS_SCHEMA_VERSION.to_string()]
        )?;

        logger::debug(
            LogTag::Store,
            &format!("Schema v{} ready at {}", POSITIONS_SCHEMA_VERSION, self.database_path)
        );

        Ok(())
    }

    /// Get database connection from pool
    fn get_connection(&self) -> TrackerResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    pub fn database_path(&self) -> &str {
        &self.database_path
    }

    /// Run `operation` inside one immediate transaction for `ticker`
    ///
    /// The ticker lock is taken first and released only after the transaction
    /// commits or rolls back, even if the calling future is dropped. Any error
    /// returned by `operation` rolls the transaction back.
    pub async fn with_ticker_transaction<F, T>(&self, ticker: &str, operation: F) -> TrackerResult<T>
        where
            F: FnOnce(&EpisodeTransaction<'_>) -> TrackerResult<T> + Send + 'static,
            T: Send + 'static
    {
        let guard = self.locks.acquire(ticker).await;
        let pool = self.pool.clone();
        let ticker = ticker.to_string();

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let mut conn = pool.get()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let episode_tx = EpisodeTransaction { tx, ticker };

            let result = operation(&episode_tx)?;
            episode_tx.commit()?;
            Ok(result)
        }).await?
    }

    /// Run a read-only query on a pooled connection off the async runtime
    async fn with_connection<F, T>(&self, operation: F) -> TrackerResult<T>
        where F: FnOnce(&Connection) -> TrackerResult<T> + Send + 'static, T: Send + 'static
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            operation(&conn)
        }).await?
    }

    // -------------------------------------------------------------------------
    // Single-operation transactions
    // -------------------------------------------------------------------------

    pub async fn latest_episode(&self, ticker: &str) -> TrackerResult<Option<TrackedPosition>> {
        self.with_ticker_transaction(ticker, |tx| tx.latest_episode()).await
    }

    pub async fn open_episode(&self, ticker: &str, mark: EpisodeMark) -> TrackerResult<i64> {
        self.with_ticker_transaction(ticker, move |tx| tx.open_episode(&mark)).await
    }

    pub async fn close_episode(
        &self,
        ticker: &str,
        episode_id: i64,
        mark: EpisodeMark
    ) -> TrackerResult<()> {
        self.with_ticker_transaction(ticker, move |tx| tx.close_episode(episode_id, &mark)).await
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// All episodes with no close date, oldest open first
    pub async fn get_open_positions(&self) -> TrackerResult<Vec<OpenPosition>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT ticker, open_date, open_crossover_date, open_crossover_price
                FROM tracked_stocks
                WHERE close_date IS NULL
                ORDER BY open_date ASC, ticker ASC
                "#
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(OpenPosition {
                    ticker: row.get(0)?,
                    open_date: row.get(1)?,
                    open_crossover_date: row.get(2)?,
                    open_crossover_price: row.get(3)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        }).await
    }

    /// Full episode history for a ticker, oldest first
    pub async fn get_history(&self, ticker: &str) -> TrackerResult<Vec<TrackedPosition>> {
        let ticker = ticker.to_string();
        self.with_connection(move |conn| {
            let sql = format!(
                "SELECT {} FROM tracked_stocks WHERE ticker = ?1 ORDER BY open_date ASC, id ASC",
                EPISODE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![ticker], row_to_position)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        }).await
    }

    pub async fn get_tracked_tickers(&self) -> TrackerResult<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT ticker FROM tracked_stocks ORDER BY ticker ASC"
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        }).await
    }

    pub async fn get_database_stats(&self) -> TrackerResult<PositionsDatabaseStats> {
        self.with_connection(|conn| {
            let (total, open, tickers): (i64, i64, i64) = conn.query_row(
                r#"
                SELECT COUNT(*),
                       COALESCE(SUM(CASE WHEN close_date IS NULL THEN 1 ELSE 0 END), 0),
                       COUNT(DISTINCT ticker)
                FROM tracked_stocks
                "#,
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            )?;

            let schema_version = conn
                .query_row(
                    "SELECT value FROM tracked_stocks_metadata WHERE key = 'schema_version'",
                    [],
                    |row| row.get::<_, String>(0)
                )
                .optional()?
                .and_then(|value| value.parse::<u32>().ok())
                .unwrap_or(0);

            Ok(PositionsDatabaseStats {
                total_episodes: total as u64,
                open_episodes: open as u64,
                closed_episodes: (total - open) as u64,
                distinct_tickers: tickers as u64,
                schema_version,
            })
        }).await
    }
}
