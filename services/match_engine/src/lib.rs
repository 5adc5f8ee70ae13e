pub mod aggregate;
pub mod config;
pub mod error;
pub mod event_store;
pub mod export;
pub mod lineup;
pub mod logging;
pub mod metrics;
pub mod minutes;
pub mod score;
pub mod store;
pub mod types;
pub mod web;

pub use aggregate::MatchService;
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, StoreError};
