//! Core domain types and logic.

pub mod error;
pub mod instrument;
pub mod price;
pub mod signal;
pub mod rolling;
pub mod expression;
pub mod expression_parser;
pub mod expression_eval;
pub mod alpha;
pub mod returns;
pub mod metrics;
pub mod universe;
pub mod backtest;
pub mod config_validation;
pub mod orchestrator;
