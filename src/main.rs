use anyhow::Context;
use chrono::NaiveDate;
use clap::{ Parser, Subcommand };
use comfy_table::{ presets, Attribute, Cell, ContentArrangement, Table };
use stagetracker::{
    config::{ self, get_config_clone, load_config_from_path, save_config, CONFIG_FILE_PATH },
    logger::{ self as logger, LogTag, LoggerConfig },
    positions::{ LifecycleManager, PositionsDatabase, QueryService },
    signals::require_signal,
};
use std::path::Path;

/// Stage signal position tracker
#[derive(Parser, Debug)]
#[command(name = "stagetracker", version, about = "Tracks stage-2 episodes per ticker")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = CONFIG_FILE_PATH)]
    config: String,

    /// Debug output for lifecycle decisions
    #[arg(long, global = true)]
    debug_positions: bool,

    /// Debug output for signal parsing
    #[arg(long, global = true)]
    debug_signals: bool,

    /// Debug output for the SQLite store
    #[arg(long, global = true)]
    debug_store: bool,

    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the default config (if missing) and create the database
    Init,
    /// Parse a classifier response and print the signal as JSON
    Parse {
        text: String,
    },
    /// Apply a classifier response to a ticker
    Apply {
        #[arg(long)]
        ticker: String,
        /// Classifier response, e.g. "STAGE2 Crossover on 2025-05-21 at $4.71"
        #[arg(long)]
        signal: String,
        /// Observed price (defaults to the crossover price)
        #[arg(long)]
        price: Option<f64>,
        /// Observation date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List open positions
    Open,
    /// Show every episode for a ticker
    History {
        ticker: String,
    },
    /// List every ticker with at least one episode
    Tickers,
    /// Show store statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    load_config_from_path(&cli.config)?;
    let settings = get_config_clone();

    let mut logger_config = LoggerConfig::from_settings(&settings.logging);
    if cli.debug_positions {
        logger_config = logger_config.with_debug_tag(LogTag::Positions);
    }
    if cli.debug_signals {
        logger_config = logger_config.with_debug_tag(LogTag::Signals);
    }
    if cli.debug_store {
        logger_config = logger_config.with_debug_tag(LogTag::Store);
    }
    if cli.verbose {
        logger_config = logger_config.verbose();
    }
    logger::init(logger_config);
    logger::debug(LogTag::Config, &format!("Configuration loaded from {}", cli.config));

    let result = run(cli, settings).await;
    logger::flush();
    result
}

async fn run(cli: Cli, settings: config::Config) -> anyhow::Result<()> {
    match cli.command {
        Command::Init => {
            if !Path::new(&cli.config).exists() {
                save_config(Some(&cli.config))?;
                println!("✅ Wrote default config to {}", cli.config);
            }
            let store = PositionsDatabase::open(&settings.database)?;
            println!("✅ Database ready at {}", store.database_path());
        }

        Command::Parse { text } => {
            let signal = require_signal(&text)?;
            println!("{}", serde_json::to_string_pretty(&signal)?);
        }

        Command::Apply { ticker, signal, price, date } => {
            let mut parsed = require_signal(&signal)?;
            if let Some(price) = price {
                parsed = parsed.with_price(price);
            }
            if let Some(date) = date {
                parsed = parsed.observed_on(date);
            }

            let store = PositionsDatabase::open(&settings.database)?;
            let manager = LifecycleManager::new(store, &settings.lifecycle);
            let outcome = manager
                .apply(&ticker, &parsed).await
                .with_context(|| format!("Failed to apply signal to {}", ticker))?;
            println!("{}: {}", ticker.trim().to_uppercase(), outcome);
        }

        Command::Open => {
            let queries = QueryService::new(PositionsDatabase::open(&settings.database)?);
            let positions = queries.open_positions().await?;
            if positions.is_empty() {
                println!("No open positions");
                return Ok(());
            }

            let mut table = new_table(&["Ticker", "Opened", "Crossover date", "Crossover price"]);
            for position in positions {
                table.add_row(
                    vec![
                        Cell::new(&position.ticker),
                        Cell::new(position.open_date),
                        Cell::new(optional(position.open_crossover_date)),
                        Cell::new(optional_price(position.open_crossover_price))
                    ]
                );
            }
            println!("{}", table);
        }

        Command::History { ticker } => {
            let queries = QueryService::new(PositionsDatabase::open(&settings.database)?);
            let history = queries.history(&ticker).await?;
            if history.is_empty() {
                println!("No episodes for {}", ticker);
                return Ok(());
            }

            let mut table = new_table(
                &["#", "Opened", "Open price", "Closed", "Close price", "Open crossover", "Close crossover"]
            );
            for episode in history {
                table.add_row(
                    vec![
                        Cell::new(episode.id),
                        Cell::new(episode.open_date),
                        Cell::new(format!("{:.4}", episode.open_price)),
                        Cell::new(optional(episode.close_date)),
                        Cell::new(optional_price(episode.close_price)),
                        Cell::new(crossover(episode.open_crossover_date, episode.open_crossover_price)),
                        Cell::new(crossover(episode.close_crossover_date, episode.close_crossover_price))
                    ]
                );
            }
            println!("{}", table);
        }

        Command::Tickers => {
            let queries = QueryService::new(PositionsDatabase::open(&settings.database)?);
            for ticker in queries.tracked_tickers().await? {
                println!("{}", ticker);
            }
        }

        Command::Stats => {
            let queries = QueryService::new(PositionsDatabase::open(&settings.database)?);
            let stats = queries.stats().await?;

            let mut table = new_table(&["Metric", "Value"]);
            table.add_row(vec![Cell::new("Episodes"), Cell::new(stats.total_episodes)]);
            table.add_row(vec![Cell::new("Open"), Cell::new(stats.open_episodes)]);
            table.add_row(vec![Cell::new("Closed"), Cell::new(stats.closed_episodes)]);
            table.add_row(vec![Cell::new("Tickers"), Cell::new(stats.distinct_tickers)]);
            table.add_row(vec![Cell::new("Schema version"), Cell::new(stats.schema_version)]);
            println!("{}", table);
        }
    }

    Ok(())
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL).set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        headers
            .iter()
            .map(|header| Cell::new(header).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>()
    );
    table
}

fn optional<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn optional_price(value: Option<f64>) -> String {
    value.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "-".to_string())
}

fn crossover(date: Option<NaiveDate>, price: Option<f64>) -> String {
    match (date, price) {
        (Some(date), Some(price)) => format!("{} @ {:.4}", date, price),
        (Some(date), None) => date.to_string(),
        (None, Some(price)) => format!("{:.4}", price),
        (None, None) => "-".to_string(),
    }
}
