//! Raw cell → typed scalar coercion
//!
//! `parse_*` functions are strict and return a [`ParseError`]; `safe_*`
//! functions never fail and fall back to a default.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::ParseError;
use crate::sheet::Cell;

/// Accepted timestamp layouts, tried in order
pub const DATE_FORMATS: &[&str] = &[
    "%b %d, %Y, %H:%M", // Oct 10, 2022, 12:00
    "%Y-%m-%d %H:%M:%S", // 2022-10-10 12:00:00
    "%m/%d/%Y %H:%M",   // 10/10/2022 12:00
];

/// Significant digits kept for exact decimal fields
pub const DECIMAL_SIGNIFICANT_DIGITS: u32 = 8;

/// Parse a timestamp string using the first matching layout in [`DATE_FORMATS`]
pub fn parse_date(s: &str) -> Result<NaiveDateTime, ParseError> {
    let trimmed = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| ParseError::InvalidDate(s.to_string()))
}

/// Timestamp from a cell; native date cells are taken as-is
pub fn parse_date_cell(cell: &Cell) -> Result<NaiveDateTime, ParseError> {
    match cell {
        Cell::DateTime(dt) => Ok(*dt),
        other => parse_date(&other.text().ok_or(ParseError::Empty)?),
    }
}

fn strip_percent(s: &str) -> &str {
    let t = s.trim();
    t.strip_suffix('%').map(str::trim_end).unwrap_or(t)
}

/// Strict float: a single trailing `%` is dropped, nothing else is forgiven
pub fn parse_float(cell: &Cell) -> Result<f64, ParseError> {
    match cell {
        Cell::Float(f) => Ok(*f),
        Cell::Int(i) => Ok(*i as f64),
        other => {
            let text = other.text().ok_or(ParseError::Empty)?;
            strip_percent(&text)
                .parse::<f64>()
                .map_err(|_| ParseError::InvalidNumber(text.to_string()))
        }
    }
}

/// Strict integer. Integral floats ("3.0", 3.0) are accepted.
pub fn parse_int(cell: &Cell) -> Result<i64, ParseError> {
    match cell {
        Cell::Int(i) => Ok(*i),
        Cell::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(*f as i64),
        other => {
            let text = other.text().ok_or(ParseError::Empty)?;
            let s = strip_percent(&text);
            if let Ok(i) = s.parse::<i64>() {
                return Ok(i);
            }
            match s.parse::<f64>() {
                Ok(f) if f.fract() == 0.0 && f.is_finite() => Ok(f as i64),
                _ => Err(ParseError::InvalidNumber(text.to_string())),
            }
        }
    }
}

/// Exact decimal: thousands commas are removed and the result is rounded to
/// [`DECIMAL_SIGNIFICANT_DIGITS`] significant digits. Floats go through their
/// shortest decimal representation, never through binary arithmetic.
pub fn parse_decimal(cell: &Cell) -> Result<Decimal, ParseError> {
    let text = cell.text().ok_or(ParseError::Empty)?;
    let cleaned: String = strip_percent(&text).chars().filter(|c| *c != ',').collect();

    let value = Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| ParseError::InvalidNumber(text.to_string()))?;

    value
        .round_sf(DECIMAL_SIGNIFICANT_DIGITS)
        .map(|d| d.normalize())
        .ok_or_else(|| ParseError::InvalidNumber(text.to_string()))
}

/// Parse a decimal from plain text
pub fn parse_decimal_str(s: &str) -> Result<Decimal, ParseError> {
    parse_decimal(&Cell::Text(s.to_string()))
}

/// Float, `None` for missing, empty or unparseable input
pub fn opt_float(cell: Option<&Cell>) -> Option<f64> {
    cell.and_then(|c| parse_float(c).ok())
}

/// Float with a default for missing, empty or unparseable input
pub fn safe_float(cell: Option<&Cell>, default: f64) -> f64 {
    opt_float(cell).unwrap_or(default)
}

/// Integer with a default for missing, empty or unparseable input
pub fn safe_int(cell: Option<&Cell>, default: i64) -> i64 {
    cell.and_then(|c| parse_int(c).ok()).unwrap_or(default)
}

/// Decimal, `None` for missing, empty or unparseable input
pub fn safe_decimal(cell: Option<&Cell>) -> Option<Decimal> {
    cell.and_then(|c| parse_decimal(c).ok())
}

/// Two-state switch stored as the literal "On" / "Off"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    /// Only the exact token "On" switches on
    pub fn from_cell(cell: &Cell) -> Self {
        match cell {
            Cell::Text(s) if s == "On" => Toggle::On,
            _ => Toggle::Off,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Toggle::On => "On",
            Toggle::Off => "Off",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("Oct 10, 2022, 12:00").unwrap(), ts(2022, 10, 10, 12, 0, 0));
        assert_eq!(parse_date("2022-10-10 12:00:00").unwrap(), ts(2022, 10, 10, 12, 0, 0));
        assert_eq!(parse_date("10/10/2022 12:00").unwrap(), ts(2022, 10, 10, 12, 0, 0));
        assert_eq!(parse_date("  Jan 02, 2023, 09:30 ").unwrap(), ts(2023, 1, 2, 9, 30, 0));
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert_eq!(
            parse_date("not-a-date"),
            Err(ParseError::InvalidDate("not-a-date".to_string()))
        );
        assert!(parse_date("2022-10-10").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn test_parse_date_cell() {
        let dt = ts(2024, 3, 1, 0, 0, 0);
        assert_eq!(parse_date_cell(&Cell::DateTime(dt)).unwrap(), dt);
        assert_eq!(parse_date_cell(&text("2024-03-01 00:00:00")).unwrap(), dt);
        assert_eq!(parse_date_cell(&Cell::Empty), Err(ParseError::Empty));
    }

    #[test]
    fn test_safe_float() {
        assert_eq!(safe_float(Some(&text("12.5%")), 0.0), 12.5);
        assert_eq!(safe_float(Some(&text("")), 0.0), 0.0);
        assert_eq!(safe_float(None, -1.0), -1.0);
        assert_eq!(safe_float(Some(&text("NA")), 3.0), 3.0);
        assert_eq!(safe_float(Some(&Cell::Int(4)), 0.0), 4.0);
        assert_eq!(safe_float(Some(&text("-0.25 %")), 0.0), -0.25);
        // only a single trailing percent is stripped
        assert_eq!(safe_float(Some(&text("5%%")), 9.0), 9.0);
    }

    #[test]
    fn test_opt_float() {
        assert_eq!(opt_float(Some(&text("-3.5%"))), Some(-3.5));
        assert_eq!(opt_float(Some(&Cell::Float(0.0))), Some(0.0));
        assert_eq!(opt_float(Some(&text("NA"))), None);
        assert_eq!(opt_float(Some(&Cell::Empty)), None);
        assert_eq!(opt_float(None), None);
    }

    #[test]
    fn test_safe_int() {
        assert_eq!(safe_int(Some(&text("7")), 0), 7);
        assert_eq!(safe_int(Some(&Cell::Float(3.0)), 0), 3);
        assert_eq!(safe_int(Some(&text("3.0")), 0), 3);
        assert_eq!(safe_int(Some(&Cell::Float(3.5)), -1), -1);
        assert_eq!(safe_int(Some(&text("abc")), -1), -1);
        assert_eq!(safe_int(None, 5), 5);
    }

    #[test]
    fn test_parse_decimal_is_exact() {
        let d = parse_decimal_str("1,234.5678").unwrap();
        assert_eq!(d, dec!(1234.5678));
        assert_eq!(d.to_string(), "1234.5678");

        // a float cell keeps its shortest decimal form
        let d = parse_decimal(&Cell::Float(0.1)).unwrap();
        assert_eq!(d.to_string(), "0.1");
    }

    #[test]
    fn test_parse_decimal_rounds_to_significant_digits() {
        assert_eq!(parse_decimal_str("123456.789012").unwrap(), dec!(123456.79));
        assert_eq!(parse_decimal_str("-1,000,000").unwrap(), dec!(-1000000));
        assert!(parse_decimal_str("12abc").is_err());
        assert_eq!(parse_decimal(&Cell::Empty), Err(ParseError::Empty));
        assert_eq!(safe_decimal(None), None);
        assert_eq!(safe_decimal(Some(&text("x"))), None);
    }

    #[test]
    fn test_toggle() {
        assert_eq!(Toggle::from_cell(&text("On")), Toggle::On);
        assert_eq!(Toggle::from_cell(&text("on")), Toggle::Off);
        assert_eq!(Toggle::from_cell(&text("Off")), Toggle::Off);
        assert_eq!(Toggle::from_cell(&Cell::Bool(true)), Toggle::Off);
        assert_eq!(Toggle::from_cell(&Cell::Empty).as_str(), "Off");
        assert_eq!(Toggle::On.as_str(), "On");
    }
}
