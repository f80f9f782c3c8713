//! Progress & gamification engine for the learnhub marketplace.

pub mod badges;
pub mod catalog;
pub mod certificates;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod leaderboard;
pub mod ledger;
pub mod models;
pub mod routes;
pub mod store;
pub mod streak;

pub use engine::{EngineSettings, ProgressEngine};
pub use error::{ProgressError, Result};
