//! Sheet names, header rows and labels of a backtest export
//!
//! All positional knowledge about the workbook lives here so the mappers only
//! ever ask for a field by name.

/// Sheets holding the metric blocks of a run
pub const PERFORMANCE_SHEET: &str = "Performance";
pub const TRADES_ANALYSIS_SHEET: &str = "Trades analysis";
pub const RISK_RATIOS_SHEET: &str = "Risk performance ratios";

/// Two-column label/value sheet with the strategy settings
pub const PROPERTIES_SHEET: &str = "Properties";

/// One row per trade leg, header in the first row
pub const TRADES_SHEET: &str = "List of trades";

/// Metric sheets: row labels in column A, column headers in row 0
pub const METRIC_LABEL_COLUMN: &str = "A";
pub const METRIC_HEADER_ROW: usize = 0;

/// Properties sheet: labels in A, values in B
pub const PROPERTY_LABEL_COLUMN: &str = "A";
pub const PROPERTY_VALUE_COLUMN: &str = "B";

pub const TRADES_HEADER_ROW: usize = 0;

/// Separator between the start and end of a date range
pub const RANGE_SEPARATOR: char = '—';

/// Property labels, exactly as they appear in column A of the Properties sheet
pub mod prop {
    pub const TRADING_RANGE: &str = "Trading range";
    pub const BACKTESTING_RANGE: &str = "Backtesting range";
    pub const SYMBOL: &str = "Symbol";
    pub const TIMEFRAME: &str = "Timeframe";
    pub const POINT_VALUE: &str = "Point value";
    pub const CHART_TYPE: &str = "Chart type";
    pub const CURRENCY: &str = "Currency";
    pub const TICK_SIZE: &str = "Tick size";
    pub const PRECISION: &str = "Precision";
    pub const START_DATE: &str = "Start Date";
    pub const INITIAL_CAPITAL: &str = "Initial capital";
    pub const ORDER_SIZE: &str = "Order size";
    pub const PYRAMIDING: &str = "Pyramiding";
    pub const COMMISSION: &str = "Commission";
    pub const SLIPPAGE: &str = "Slippage";
    pub const VERIFY_PRICE: &str = "Verify price for limit orders";
    pub const LONG_MARGIN: &str = "Margin for long positions";
    pub const SHORT_MARGIN: &str = "Margin for short positions";
    pub const RECALC_AFTER_ORDER: &str = "Recalculate after order is filled";
    pub const RECALC_EVERY_TICK: &str = "Recalculate on every tick";
    pub const RECALC_ON_BAR_CLOSE: &str = "Recalculate on bar close";
    pub const BAR_MAGNIFIER: &str = "Backtesting precision. Use bar magnifier";
}

/// A trade-list column, located by the normalized text of its header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeColumn {
    pub name: &'static str,
    /// Accepted normalized header prefixes, tried in order
    pub prefixes: &'static [&'static str],
    /// Percent columns end in `_percent`; absolute ones must not
    pub percent: bool,
    pub required: bool,
}

impl TradeColumn {
    /// Does a normalized header belong to this column?
    pub fn matches(&self, header: &str) -> bool {
        if header.ends_with("_percent") != self.percent && !self.prefixes.contains(&header) {
            return false;
        }
        self.prefixes.iter().any(|p| {
            header == *p || header.strip_prefix(p).is_some_and(|rest| rest.starts_with('_'))
        })
    }
}

macro_rules! trade_column {
    ($ident:ident, $name:literal, [$($p:literal),+], percent = $pct:literal, required = $req:literal) => {
        pub const $ident: TradeColumn = TradeColumn {
            name: $name,
            prefixes: &[$($p),+],
            percent: $pct,
            required: $req,
        };
    };
}

pub mod trade_col {
    use super::TradeColumn;

    trade_column!(TRADE_NO, "Trade #", ["trade"], percent = false, required = true);
    trade_column!(TYPE, "Type", ["type"], percent = false, required = true);
    trade_column!(SIGNAL, "Signal", ["signal"], percent = false, required = true);
    trade_column!(DATE_TIME, "Date/Time", ["date_time", "date"], percent = false, required = true);
    trade_column!(PRICE, "Price", ["price"], percent = false, required = true);
    trade_column!(QUANTITY, "Quantity", ["quantity", "contracts", "size_qty", "size"], percent = false, required = true);
    trade_column!(PNL, "P&L", ["p_and_l", "net_p_and_l", "profit"], percent = false, required = true);
    trade_column!(PNL_PCT, "P&L %", ["p_and_l", "net_p_and_l", "profit"], percent = true, required = true);
    trade_column!(RUNUP, "Run-up", ["run_up"], percent = false, required = true);
    trade_column!(RUNUP_PCT, "Run-up %", ["run_up"], percent = true, required = true);
    trade_column!(DRAWDOWN, "Drawdown", ["drawdown"], percent = false, required = true);
    trade_column!(DRAWDOWN_PCT, "Drawdown %", ["drawdown"], percent = true, required = true);
    trade_column!(CUM_PNL, "Cumulative P&L", ["cumulative_p_and_l", "cum_profit", "cum_p_and_l"], percent = false, required = false);
    trade_column!(CUM_PNL_PCT, "Cumulative P&L %", ["cumulative_p_and_l", "cum_profit", "cum_p_and_l"], percent = true, required = false);

    pub const ALL: &[TradeColumn] = &[
        TRADE_NO, TYPE, SIGNAL, DATE_TIME, PRICE, QUANTITY, PNL, PNL_PCT, RUNUP, RUNUP_PCT,
        DRAWDOWN, DRAWDOWN_PCT, CUM_PNL, CUM_PNL_PCT,
    ];
}

/// Suffix marking a trade row that was still open at export time
pub const OPEN_TYPE_SUFFIX: &str = "Open";

/// Canonical key for a free-text label: lowercase, `&` → `and`, `%` →
/// `percent`, any other run of non-alphanumerics → a single `_`.
///
/// "Buy & hold return" → "buy_and_hold_return", "All %" → "all_percent",
/// "Max equity run-up" → "max_equity_run_up".
pub fn normalize_label(label: &str) -> String {
    let expanded = label
        .trim()
        .to_lowercase()
        .replace('&', " and ")
        .replace('%', " percent ");

    let mut out = String::with_capacity(expanded.len());
    let mut pending_sep = false;
    for ch in expanded.chars() {
        if ch.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("Net Profit"), "net_profit");
        assert_eq!(normalize_label("Buy & hold return"), "buy_and_hold_return");
        assert_eq!(normalize_label("All %"), "all_percent");
        assert_eq!(normalize_label("  Long USDT "), "long_usdt");
        assert_eq!(normalize_label("Avg P&L"), "avg_p_and_l");
        assert_eq!(normalize_label("Ratio avg win / avg loss"), "ratio_avg_win_avg_loss");
        assert_eq!(normalize_label("Trade #"), "trade");
        assert_eq!(normalize_label("Date/Time"), "date_time");
        assert_eq!(normalize_label(""), "");
    }

    #[test]
    fn test_trade_column_matching() {
        use trade_col::*;

        assert!(PRICE.matches("price_usdt"));
        assert!(PRICE.matches("price"));
        assert!(!PRICE.matches("price_percent"));

        assert!(PNL.matches("p_and_l_usdt"));
        assert!(PNL.matches("profit_usd"));
        assert!(!PNL.matches("p_and_l_percent"));
        assert!(PNL_PCT.matches("p_and_l_percent"));
        assert!(!PNL_PCT.matches("p_and_l_usdt"));

        assert!(RUNUP.matches("run_up_usdt"));
        assert!(DRAWDOWN_PCT.matches("drawdown_percent"));

        assert!(CUM_PNL.matches("cum_profit_usdt"));
        assert!(CUM_PNL_PCT.matches("cumulative_p_and_l_percent"));
        assert!(!PNL.matches("cum_profit_usdt"));

        assert!(TRADE_NO.matches("trade"));
        assert!(TYPE.matches("type"));
        assert!(QUANTITY.matches("quantity"));
        assert!(QUANTITY.matches("contracts"));
        assert!(DATE_TIME.matches("date_time"));
    }
}
