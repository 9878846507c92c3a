pub mod config;
pub mod errors; // Structured error handling
pub mod jobs;
pub mod logger;
pub mod positions; // Episode store, lifecycle decisions, queries
pub mod signals; // Classifier response parsing
