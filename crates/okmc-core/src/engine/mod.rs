pub mod config;
pub mod ensemble;
pub mod error;
pub mod evaluator;
pub mod kinetic;
pub mod progress;
pub mod rate_table;
pub mod snapshot;
pub mod system;
