pub mod backtest;
pub mod config;
pub mod data;
pub mod error;
pub mod graph;
pub mod model;
pub mod pipeline;
pub mod risk_profile;
pub mod run_store;
pub mod signal;
pub mod topology;
