//! CLI command implementations

pub mod config;
pub mod fill;
pub mod gc;
pub mod get;
pub mod put;
pub mod run;
pub mod stats;
