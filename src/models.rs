use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::coerce::Toggle;

/// Metric sheet packaged as JSON: normalized row label → { normalized column header → value }
pub type MetricBlock = serde_json::Map<String, Value>;

/// Run settings read from the Properties sheet
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub trading_range_start: NaiveDateTime,
    pub trading_range_end: NaiveDateTime,
    pub backtesting_range_start: NaiveDateTime,
    pub backtesting_range_end: NaiveDateTime,
    pub symbol: String,
    pub timeframe: String,
    pub point_value: f64,
    pub chart_type: String,
    pub currency: String,
    pub tick_size: f64,
    pub precision: String,
    pub start_date: NaiveDateTime,
    pub initial_capital: f64,
    pub order_size: i64,
    pub pyramiding: i64,
    /// Percent, "%" already stripped
    pub commission: f64,
    pub slippage: i64,
    pub verify_price_ticks: i64,
    /// Percent, "%" already stripped
    pub long_margin: f64,
    /// Percent, "%" already stripped
    pub short_margin: f64,
    pub recalculate_after_order: Toggle,
    pub recalculate_every_tick: Toggle,
    pub recalculate_on_bar_close: Toggle,
    pub use_bar_magnifier: Toggle,
}

/// A backtest run assembled from a workbook, before ticker resolution
#[derive(Debug, Clone, PartialEq)]
pub struct RunCandidate {
    pub strategy: String,
    pub performance: MetricBlock,
    pub trades_analysis: MetricBlock,
    pub risk_performance_ratios: MetricBlock,
    pub settings: RunSettings,
}

impl RunCandidate {
    /// Attach the resolved ticker, producing an insertable row
    pub fn resolve(self, ticker_id: i64) -> NewBacktestRun {
        NewBacktestRun {
            ticker_id,
            strategy: self.strategy,
            performance: self.performance,
            trades_analysis: self.trades_analysis,
            risk_performance_ratios: self.risk_performance_ratios,
            settings: self.settings,
        }
    }
}

/// Row for the `backtesting` table
#[derive(Debug, Clone, PartialEq)]
pub struct NewBacktestRun {
    pub ticker_id: i64,
    pub strategy: String,
    pub performance: MetricBlock,
    pub trades_analysis: MetricBlock,
    pub risk_performance_ratios: MetricBlock,
    pub settings: RunSettings,
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Direction from a trade type such as "Entry Long" or "Exit Short".
    /// The type must name exactly one of the two directions.
    pub fn from_trade_type(trade_type: &str) -> Option<Self> {
        let lower = trade_type.to_lowercase();
        match (lower.contains("long"), lower.contains("short")) {
            (true, false) => Some(Direction::Long),
            (false, true) => Some(Direction::Short),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

/// Row for the `trades` table, minus the parent id
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrade {
    pub trade_no: i64,
    pub direction: Direction,
    pub signal: String,
    pub exec_time: NaiveDateTime,
    pub exec_price: Decimal,
    pub quantity: Decimal,
    pub pnl_absolute: Option<f64>,
    pub pnl_percent: Option<f64>,
    pub runup_absolute: Option<f64>,
    pub runup_percent: Option<f64>,
    pub drawdown_absolute: Option<f64>,
    pub drawdown_percent: Option<f64>,
    pub cumulative_pnl_absolute: Option<Decimal>,
    pub cumulative_pnl_percent: Option<Decimal>,
}
