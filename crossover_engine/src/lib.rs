pub mod config;
pub mod error;
pub mod models;
pub mod strategy;
pub mod backtest;
pub mod metrics;
pub mod risk;
pub mod data;
pub mod live;
pub mod engine;

pub use error::{Disposition, TraderError};
pub use models::*;
