// Position lifecycle module - store, decisions and read accessors
pub mod db;
pub mod lifecycle;
pub mod locks;
pub mod queries;
pub mod transitions;
pub mod types;


// Public API exports
pub use db::{ EpisodeTransaction, PositionsDatabase };
pub use lifecycle::{ ApplyOutcome, LifecycleManager };
pub use queries::QueryService;

// Core types re-exports
pub use locks::{ TickerLockGuard, TickerLocks };
pub use transitions::{ decide, IgnoreReason, PositionTransition };
pub use types::{
    normalize_ticker,
    EpisodeMark,
    EpisodeState,
    OpenPosition,
    PositionsDatabaseStats,
    TrackedPosition,
};
