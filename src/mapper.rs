//! Workbook → record mapping
//!
//! [`map_run`] builds the backtest-run candidate from the metric and property
//! sheets; [`map_trades`] turns the trade list into insertable trades, skipping
//! open positions and rows that fail to coerce.

use serde_json::{Number, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::coerce::{self, parse_date_cell, parse_decimal, parse_int};
use crate::error::{ParseError, RowError, ShapeError};
use crate::layout::{
    self, normalize_label, prop, trade_col, TradeColumn, METRIC_HEADER_ROW, METRIC_LABEL_COLUMN,
    OPEN_TYPE_SUFFIX, TRADES_HEADER_ROW, TRADES_SHEET,
};
use crate::models::{Direction, MetricBlock, NewTrade, RunCandidate, RunSettings};
use crate::properties::Properties;
use crate::sheet::{column_index, column_letter, Cell, Sheet, Workbook};

fn require_sheet<'a>(workbook: &'a Workbook, name: &str) -> Result<&'a Sheet, ShapeError> {
    workbook
        .sheet(name)
        .ok_or_else(|| ShapeError::MissingSheet(name.to_string()))
}

/// JSON value of a metric cell. Numbers stay numbers, everything else is text.
fn cell_to_json(cell: &Cell) -> Value {
    match cell {
        Cell::Empty => Value::Null,
        Cell::Int(i) => Value::from(*i),
        Cell::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Cell::Bool(b) => Value::Bool(*b),
        other => other
            .text()
            .map(|t| Value::String(t.into_owned()))
            .unwrap_or(Value::Null),
    }
}

/// Package a metric sheet: one entry per labelled row, holding the row's
/// value columns keyed by their normalized header ("all_usdt", "long_percent", ...).
/// Repeated labels get a `_2`, `_3`, ... suffix. A column without a header, or
/// whose header repeats further right, is keyed by its lowercase letter.
pub fn metric_block(sheet: &Sheet) -> MetricBlock {
    let keys: HashMap<String, String> = sheet
        .header_index(METRIC_HEADER_ROW, normalize_label)
        .into_iter()
        .map(|(key, letter)| (letter, key))
        .collect();
    let value_columns: Vec<(String, String)> = (1..sheet.width())
        .map(|col| {
            let letter = column_letter(col);
            let key = keys
                .get(&letter)
                .cloned()
                .unwrap_or_else(|| letter.to_lowercase());
            (letter, key)
        })
        .collect();

    let mut block = MetricBlock::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for row in (METRIC_HEADER_ROW + 1)..sheet.height() {
        let Some(label) = sheet.cell(METRIC_LABEL_COLUMN, row).text() else {
            continue;
        };
        let base = normalize_label(&label);
        if base.is_empty() {
            continue;
        }

        let count = seen.entry(base.clone()).or_insert(0);
        *count += 1;
        let key = if *count == 1 {
            base
        } else {
            format!("{}_{}", base, count)
        };

        let mut entry = serde_json::Map::new();
        for (letter, column_key) in &value_columns {
            entry.insert(column_key.clone(), cell_to_json(sheet.cell(letter, row)));
        }
        block.insert(key, Value::Object(entry));
    }

    block
}

/// Read every run setting from the Properties sheet. All of them are mandatory.
pub fn run_settings(props: &Properties) -> Result<RunSettings, ShapeError> {
    let (trading_range_start, trading_range_end) = props.range(prop::TRADING_RANGE)?;
    let (backtesting_range_start, backtesting_range_end) = props.range(prop::BACKTESTING_RANGE)?;

    Ok(RunSettings {
        trading_range_start,
        trading_range_end,
        backtesting_range_start,
        backtesting_range_end,
        symbol: props.text(prop::SYMBOL)?,
        timeframe: props.text(prop::TIMEFRAME)?,
        point_value: props.float(prop::POINT_VALUE)?,
        chart_type: props.text(prop::CHART_TYPE)?,
        currency: props.text(prop::CURRENCY)?,
        tick_size: props.float(prop::TICK_SIZE)?,
        precision: props.text(prop::PRECISION)?,
        start_date: props.date(prop::START_DATE)?,
        initial_capital: props.float(prop::INITIAL_CAPITAL)?,
        order_size: props.int(prop::ORDER_SIZE)?,
        pyramiding: props.int(prop::PYRAMIDING)?,
        commission: props.float(prop::COMMISSION)?,
        slippage: props.int(prop::SLIPPAGE)?,
        verify_price_ticks: props.int(prop::VERIFY_PRICE)?,
        long_margin: props.float(prop::LONG_MARGIN)?,
        short_margin: props.float(prop::SHORT_MARGIN)?,
        recalculate_after_order: props.toggle(prop::RECALC_AFTER_ORDER)?,
        recalculate_every_tick: props.toggle(prop::RECALC_EVERY_TICK)?,
        recalculate_on_bar_close: props.toggle(prop::RECALC_ON_BAR_CLOSE)?,
        use_bar_magnifier: props.toggle(prop::BAR_MAGNIFIER)?,
    })
}

/// Assemble the run candidate (everything except the ticker reference)
pub fn map_run(workbook: &Workbook, strategy: &str) -> Result<RunCandidate, ShapeError> {
    let performance = metric_block(require_sheet(workbook, layout::PERFORMANCE_SHEET)?);
    let trades_analysis = metric_block(require_sheet(workbook, layout::TRADES_ANALYSIS_SHEET)?);
    let risk_performance_ratios = metric_block(require_sheet(workbook, layout::RISK_RATIOS_SHEET)?);

    let props = Properties::decode(require_sheet(workbook, layout::PROPERTIES_SHEET)?);
    let settings = run_settings(&props)?;

    debug!(
        symbol = %settings.symbol,
        performance_rows = performance.len(),
        analysis_rows = trades_analysis.len(),
        ratio_rows = risk_performance_ratios.len(),
        "Mapped backtest run"
    );

    Ok(RunCandidate {
        strategy: strategy.to_string(),
        performance,
        trades_analysis,
        risk_performance_ratios,
        settings,
    })
}

/// Column letters of the trade list, found through the header row
#[derive(Debug, Clone, Default)]
pub struct TradeColumns {
    letters: HashMap<&'static str, String>,
}

impl TradeColumns {
    /// Match each known column against the header row. A repeated header
    /// resolves to its rightmost column; among different headers matching the
    /// same column the leftmost wins. A missing required column is a shape error.
    pub fn locate(sheet: &Sheet) -> Result<Self, ShapeError> {
        let headers = sheet.header_index(TRADES_HEADER_ROW, normalize_label);

        let mut letters = HashMap::new();
        for column in trade_col::ALL {
            let found = headers
                .iter()
                .filter(|(h, _)| column.matches(h))
                .map(|(_, letter)| letter)
                .min_by_key(|letter| column_index(letter));
            match found {
                Some(letter) => {
                    letters.insert(column.name, letter.clone());
                }
                None if column.required => {
                    return Err(ShapeError::MissingColumn {
                        sheet: TRADES_SHEET.to_string(),
                        column: column.name.to_string(),
                    });
                }
                None => {}
            }
        }
        Ok(Self { letters })
    }

    pub fn has(&self, column: &TradeColumn) -> bool {
        self.letters.contains_key(column.name)
    }

    pub fn cell<'a>(&self, sheet: &'a Sheet, column: &TradeColumn, row: usize) -> Option<&'a Cell> {
        self.letters.get(column.name).map(|l| sheet.cell(l, row))
    }
}

/// Rows of the trade list that describe closed trades
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeCandidates {
    /// Sheet row indices, in order
    pub rows: Vec<usize>,
    /// Rows dropped because the position was still open
    pub open: usize,
}

/// Select candidate rows: everything below the header, minus blank rows and
/// rows whose type ends in "Open"
pub fn candidate_rows(sheet: &Sheet, columns: &TradeColumns) -> TradeCandidates {
    let mut candidates = TradeCandidates::default();

    for row in (TRADES_HEADER_ROW + 1)..sheet.height() {
        if sheet.row(row).iter().all(|c| c.is_empty()) {
            continue;
        }
        let is_open = columns
            .cell(sheet, &trade_col::TYPE, row)
            .and_then(|c| c.text())
            .is_some_and(|t| t.ends_with(OPEN_TYPE_SUFFIX));
        if is_open {
            candidates.open += 1;
        } else {
            candidates.rows.push(row);
        }
    }

    candidates
}

fn field<T>(
    columns: &TradeColumns,
    sheet: &Sheet,
    column: &TradeColumn,
    row: usize,
    parse: impl FnOnce(&Cell) -> Result<T, ParseError>,
) -> Result<T, RowError> {
    let parsed = match columns.cell(sheet, column, row) {
        Some(cell) => parse(cell),
        None => parse(&Cell::Empty),
    };
    parsed.map_err(|source| RowError::Field {
        column: column.name,
        source,
    })
}

/// Coerce one trade row
pub fn map_trade_row(sheet: &Sheet, columns: &TradeColumns, row: usize) -> Result<NewTrade, RowError> {
    let trade_no = field(columns, sheet, &trade_col::TRADE_NO, row, parse_int)?;

    let trade_type = columns
        .cell(sheet, &trade_col::TYPE, row)
        .and_then(|c| c.text())
        .map(|t| t.into_owned())
        .unwrap_or_default();
    let direction =
        Direction::from_trade_type(&trade_type).ok_or_else(|| RowError::Direction(trade_type.clone()))?;

    let signal = columns
        .cell(sheet, &trade_col::SIGNAL, row)
        .and_then(|c| c.text())
        .map(|t| t.into_owned())
        .unwrap_or_default();

    let exec_time = field(columns, sheet, &trade_col::DATE_TIME, row, parse_date_cell)?;
    let exec_price = field(columns, sheet, &trade_col::PRICE, row, parse_decimal)?;
    let quantity = field(columns, sheet, &trade_col::QUANTITY, row, parse_decimal)?;

    let float = |column: &TradeColumn| coerce::opt_float(columns.cell(sheet, column, row));
    let decimal = |column: &TradeColumn| {
        if columns.has(column) {
            coerce::safe_decimal(columns.cell(sheet, column, row))
        } else {
            None
        }
    };

    Ok(NewTrade {
        trade_no,
        direction,
        signal,
        exec_time,
        exec_price,
        quantity,
        pnl_absolute: float(&trade_col::PNL),
        pnl_percent: float(&trade_col::PNL_PCT),
        runup_absolute: float(&trade_col::RUNUP),
        runup_percent: float(&trade_col::RUNUP_PCT),
        drawdown_absolute: float(&trade_col::DRAWDOWN),
        drawdown_percent: float(&trade_col::DRAWDOWN_PCT),
        cumulative_pnl_absolute: decimal(&trade_col::CUM_PNL),
        cumulative_pnl_percent: decimal(&trade_col::CUM_PNL_PCT),
    })
}

/// A row that could not be turned into a trade
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRow {
    pub row: usize,
    pub trade_no: Option<String>,
    pub reason: RowError,
}

/// Result of mapping the trade list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeBatch {
    pub trades: Vec<NewTrade>,
    pub open: usize,
    pub skipped: Vec<SkippedRow>,
}

impl TradeBatch {
    pub fn candidates(&self) -> usize {
        self.trades.len() + self.skipped.len()
    }

    /// At least one valid trade was produced
    pub fn is_success(&self) -> bool {
        !self.trades.is_empty()
    }
}

/// Map the "List of trades" sheet. Rows that fail to coerce are skipped and
/// recorded; they never fail the batch.
pub fn map_trades(workbook: &Workbook) -> Result<TradeBatch, ShapeError> {
    let sheet = require_sheet(workbook, TRADES_SHEET)?;
    let columns = TradeColumns::locate(sheet)?;
    let candidates = candidate_rows(sheet, &columns);

    let mut batch = TradeBatch {
        open: candidates.open,
        ..Default::default()
    };

    for row in candidates.rows {
        match map_trade_row(sheet, &columns, row) {
            Ok(trade) => batch.trades.push(trade),
            Err(reason) => {
                let trade_no = columns
                    .cell(sheet, &trade_col::TRADE_NO, row)
                    .and_then(|c| c.text())
                    .map(|t| t.into_owned());
                warn!(
                    row,
                    trade = trade_no.as_deref().unwrap_or("unknown"),
                    "Skipping malformed trade record: {}",
                    reason
                );
                batch.skipped.push(SkippedRow {
                    row,
                    trade_no,
                    reason,
                });
            }
        }
    }

    debug!(
        valid = batch.trades.len(),
        skipped = batch.skipped.len(),
        open = batch.open,
        "Mapped trade list"
    );
    Ok(batch)
}
