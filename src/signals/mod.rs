//! Stage signals: the typed form of a classifier response
pub mod parser;
pub mod types;

pub use parser::{ parse_signal, require_signal };
pub use types::{ Stage, StageSignal };
