//! Backtest workbook ingestion
//!
//! Reads strategy-tester exports (one workbook per backtest run), maps the
//! metric, property and trade-list sheets into typed records, and writes them
//! to PostgreSQL: one `backtesting` row per workbook plus one `trades` row per
//! closed trade.

pub mod audit;
pub mod coerce;
pub mod config;
pub mod db;
pub mod error;
pub mod files;
pub mod layout;
pub mod mapper;
pub mod models;
pub mod pipeline;
pub mod properties;
pub mod sheet;
