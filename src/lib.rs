pub mod analysis;
pub mod config;
pub mod errors;
pub mod feeds;
pub mod models;
pub mod report;
pub mod runner;
pub mod series;

#[cfg(test)]
mod testutil;

pub use errors::{EngineError, EngineResult};
