//! Job orchestration
//!
//! Scan rounds pull price history, ask the classifier for a stage, parse the
//! answer and hand it to the lifecycle manager. Re-evaluation runs the same
//! pipeline over tickers that currently hold an open episode.

pub mod providers;
pub mod scan;

pub use providers::{ PriceBar, PriceHistoryProvider, StageClassifier };
pub use scan::{ ScanReport, SignalJob };
