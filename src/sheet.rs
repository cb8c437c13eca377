//! Workbook extraction
//!
//! Every sheet is turned into a map of spreadsheet column letters ("A", "B", ...)
//! to the cells of that column, one per row, in row order. Nothing here knows
//! about headers: row 0 is just the first row.

use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::NaiveDateTime;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::error::WorkbookError;

/// Extensions read through the spreadsheet reader
pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xls", "xlsx", "xlsm", "xlsb", "ods"];

/// Extensions read as a single comma-separated sheet
pub const CSV_EXTENSIONS: &[&str] = &["csv"];

/// A single raw cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Textual form of the cell, trimmed. `None` for empty cells.
    pub fn text(&self) -> Option<Cow<'_, str>> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    None
                } else {
                    Some(Cow::Borrowed(t))
                }
            }
            Cell::Int(i) => Some(Cow::Owned(i.to_string())),
            // Display gives the shortest representation that round-trips
            Cell::Float(f) => Some(Cow::Owned(f.to_string())),
            Cell::Bool(b) => Some(Cow::Owned(b.to_string())),
            Cell::DateTime(dt) => Some(Cow::Owned(dt.format("%Y-%m-%d %H:%M:%S").to_string())),
        }
    }

    /// Infer a typed cell from a CSV field
    pub fn from_csv_field(field: &str) -> Self {
        let t = field.trim();
        if t.is_empty() {
            Cell::Empty
        } else if let Ok(i) = t.parse::<i64>() {
            Cell::Int(i)
        } else if let Ok(f) = t.parse::<f64>() {
            Cell::Float(f)
        } else {
            Cell::Text(field.to_string())
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.text() {
            Some(t) => write!(f, "{}", t),
            None => Ok(()),
        }
    }
}

impl From<&Data> for Cell {
    fn from(d: &Data) -> Self {
        match d {
            Data::Empty => Cell::Empty,
            Data::Int(i) => Cell::Int(*i),
            Data::Float(f) => Cell::Float(*f),
            Data::String(s) => Cell::Text(s.clone()),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => match dt.as_datetime() {
                Some(ndt) => Cell::DateTime(ndt),
                None => Cell::Float(dt.as_f64()),
            },
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(e) => Cell::Text(e.to_string()),
        }
    }
}

/// Spreadsheet-style column letter for a zero-based column index
/// (0 → "A", 25 → "Z", 26 → "AA", ...)
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Zero-based column index of a column letter ("A" → 0, "AA" → 26)
pub fn column_index(letter: &str) -> Option<usize> {
    if letter.is_empty() {
        return None;
    }
    let mut n = 0usize;
    for ch in letter.chars() {
        if !ch.is_ascii_uppercase() {
            return None;
        }
        n = n * 26 + (ch as usize - 'A' as usize + 1);
    }
    Some(n - 1)
}

/// One sheet as columns of cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    columns: BTreeMap<String, Vec<Cell>>,
    width: usize,
    height: usize,
}

impl Sheet {
    /// Build from rows. Rows may have different lengths; short rows are padded
    /// so that every column has exactly one cell per row.
    pub fn from_rows<I, R>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = Cell>,
    {
        let rows: Vec<Vec<Cell>> = rows.into_iter().map(|r| r.into_iter().collect()).collect();
        let height = rows.len();
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);

        let mut columns: BTreeMap<String, Vec<Cell>> = BTreeMap::new();
        for col in 0..width {
            let cells = rows
                .iter()
                .map(|row| row.get(col).cloned().unwrap_or(Cell::Empty))
                .collect();
            columns.insert(column_letter(col), cells);
        }

        Self {
            columns,
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// All cells of a column, by letter
    pub fn column(&self, letter: &str) -> Option<&[Cell]> {
        self.columns.get(letter).map(|v| v.as_slice())
    }

    /// Cell at (column letter, row). Out-of-range positions read as empty.
    pub fn cell(&self, letter: &str, row: usize) -> &Cell {
        static EMPTY: Cell = Cell::Empty;
        self.columns
            .get(letter)
            .and_then(|c| c.get(row))
            .unwrap_or(&EMPTY)
    }

    /// Cells of one row, in column order
    pub fn row(&self, row: usize) -> Vec<&Cell> {
        (0..self.width)
            .map(|c| self.cell(&column_letter(c), row))
            .collect()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[Cell])> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Map `key(label)` → row index for the labels in column `letter`.
    /// Empty cells and empty keys are skipped. Duplicate keys: the last row wins.
    pub fn label_index(&self, letter: &str, key: impl Fn(&str) -> String) -> HashMap<String, usize> {
        let mut index = HashMap::new();
        if let Some(cells) = self.column(letter) {
            for (row, cell) in cells.iter().enumerate() {
                if let Some(k) = indexed_key(cell, &key) {
                    index.insert(k, row);
                }
            }
        }
        index
    }

    /// Map `key(header)` → column letter for the headers in `row`.
    /// Same rule as [`label_index`](Self::label_index): the rightmost duplicate wins.
    pub fn header_index(&self, row: usize, key: impl Fn(&str) -> String) -> HashMap<String, String> {
        let mut index = HashMap::new();
        for col in 0..self.width {
            let letter = column_letter(col);
            if let Some(k) = indexed_key(self.cell(&letter, row), &key) {
                index.insert(k, letter);
            }
        }
        index
    }
}

fn indexed_key(cell: &Cell, key: &impl Fn(&str) -> String) -> Option<String> {
    cell.text().map(|t| key(&t)).filter(|k| !k.is_empty())
}

/// Named sheets of one workbook
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    sheets: BTreeMap<String, Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, sheet: Sheet) {
        self.sheets.insert(name.into(), sheet);
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.get(name)
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// True if the file has an extension this crate can read
pub fn is_workbook_path(path: &Path) -> bool {
    match extension(path) {
        Some(ext) => {
            SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) || CSV_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Read every sheet of a workbook file
pub fn read_workbook(path: &Path) -> Result<Workbook, WorkbookError> {
    let ext = extension(path).unwrap_or_default();

    if CSV_EXTENSIONS.contains(&ext.as_str()) {
        return read_csv(path);
    }
    if !SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        return Err(WorkbookError::UnsupportedExtension(path.to_path_buf()));
    }

    let mut reader = open_workbook_auto(path)?;
    let mut workbook = Workbook::new();

    for name in reader.sheet_names() {
        let range = reader.worksheet_range(&name)?;
        let sheet = sheet_from_range(&range);
        debug!(
            sheet = %name,
            rows = sheet.height(),
            columns = sheet.width(),
            "Extracted sheet"
        );
        workbook.insert(name, sheet);
    }

    Ok(workbook)
}

/// Convert a spreadsheet range. Ranges start at the first used cell; the
/// result is padded so column letters and row numbers stay absolute.
pub fn sheet_from_range(range: &Range<Data>) -> Sheet {
    let (row_offset, col_offset) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); row_offset];
    for data_row in range.rows() {
        let mut row = vec![Cell::Empty; col_offset];
        row.extend(data_row.iter().map(Cell::from));
        rows.push(row);
    }
    Sheet::from_rows(rows)
}

/// A CSV file is a one-sheet workbook named after the file stem
fn read_csv(path: &Path) -> Result<Workbook, WorkbookError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(Cell::from_csv_field).collect::<Vec<_>>());
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Sheet1")
        .to_string();

    let mut workbook = Workbook::new();
    workbook.insert(name, Sheet::from_rows(rows));
    Ok(workbook)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::normalize_label;
    use calamine::{CellErrorType, ExcelDateTime, ExcelDateTimeType};
    use chrono::NaiveDate;
    use std::io::Write;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(1), "B");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
        assert_eq!(column_letter(51), "AZ");
        assert_eq!(column_letter(52), "BA");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn test_ragged_rows_are_padded() {
        let sheet = Sheet::from_rows(vec![
            vec![text("a"), text("b"), text("c")],
            vec![text("d")],
            vec![text("e"), Cell::Int(2)],
        ]);

        assert_eq!(sheet.width(), 3);
        assert_eq!(sheet.height(), 3);
        for (_, cells) in sheet.columns() {
            assert_eq!(cells.len(), 3);
        }
        assert_eq!(sheet.column("C").unwrap()[1], Cell::Empty);
        assert_eq!(sheet.cell("B", 2), &Cell::Int(2));
        assert_eq!(sheet.cell("Q", 99), &Cell::Empty);
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(Cell::Float(12.5).text().unwrap(), "12.5");
        assert_eq!(Cell::Float(3.0).text().unwrap(), "3");
        assert_eq!(Cell::Int(-4).text().unwrap(), "-4");
        assert!(Cell::Text("   ".to_string()).text().is_none());
        assert!(Cell::Empty.is_empty());
    }

    #[test]
    fn test_column_index() {
        for i in [0, 1, 25, 26, 51, 52, 701, 702] {
            assert_eq!(column_index(&column_letter(i)), Some(i));
        }
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("a1"), None);
    }

    #[test]
    fn test_label_and_header_index() {
        let sheet = Sheet::from_rows(vec![
            vec![Cell::Empty, text("All USDT"), text("All %"), text("All USDT")],
            vec![text("Net profit"), Cell::Float(10.0), Cell::Float(1.0)],
            vec![text("Gross profit"), Cell::Float(20.0), Cell::Float(2.0)],
            vec![text("Net  Profit"), Cell::Float(30.0), Cell::Float(3.0)],
            vec![text("---"), Cell::Empty],
        ]);

        let labels = sheet.label_index("A", normalize_label);
        assert_eq!(labels.len(), 2);
        // "Net  Profit" normalizes to the same key and comes later
        assert_eq!(labels.get("net_profit"), Some(&3));
        assert_eq!(labels.get("gross_profit"), Some(&2));

        let verbatim = sheet.label_index("A", str::to_string);
        assert_eq!(verbatim.get("Net profit"), Some(&1));
        assert_eq!(verbatim.get("Net  Profit"), Some(&3));

        let headers = sheet.header_index(0, normalize_label);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("all_usdt").map(String::as_str), Some("D"));
        assert_eq!(headers.get("all_percent").map(String::as_str), Some("C"));
    }

    #[test]
    fn test_sheet_from_range_keeps_absolute_positions() {
        let mut range: Range<Data> = Range::new((2, 1), (3, 3));
        range.set_value((2, 1), Data::String("Net profit".to_string()));
        range.set_value((2, 2), Data::Float(150.5));
        range.set_value(
            (2, 3),
            Data::DateTime(ExcelDateTime::new(45292.5, ExcelDateTimeType::DateTime, false)),
        );
        range.set_value((3, 1), Data::DateTimeIso("2024-01-01T12:00:00".to_string()));
        range.set_value((3, 2), Data::Error(CellErrorType::NA));
        range.set_value((3, 3), Data::Int(7));

        let sheet = sheet_from_range(&range);
        assert_eq!(sheet.height(), 4);
        assert_eq!(sheet.width(), 4);
        assert_eq!(sheet.cell("A", 2), &Cell::Empty);
        assert_eq!(sheet.cell("B", 0), &Cell::Empty);
        assert_eq!(sheet.cell("B", 2), &text("Net profit"));
        assert_eq!(sheet.cell("C", 2), &Cell::Float(150.5));
        assert_eq!(
            sheet.cell("D", 2),
            &Cell::DateTime(
                NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(12, 0, 0)
                    .unwrap()
            )
        );
        assert_eq!(sheet.cell("B", 3), &text("2024-01-01T12:00:00"));
        assert_eq!(sheet.cell("C", 3), &text("#N/A"));
        assert_eq!(sheet.cell("D", 3), &Cell::Int(7));
    }

    #[test]
    fn test_empty_range() {
        let range: Range<Data> = Range::empty();
        let sheet = sheet_from_range(&range);
        assert_eq!(sheet.height(), 0);
        assert_eq!(sheet.width(), 0);
    }

    #[test]
    fn test_read_csv_as_single_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Trade #,Type,Price USDT").unwrap();
        writeln!(file, "1,Entry Long,100.5").unwrap();
        writeln!(file, "1,Exit Long").unwrap();
        drop(file);

        assert!(is_workbook_path(&path));
        let workbook = read_workbook(&path).unwrap();
        let sheet = workbook.sheet("trades").unwrap();
        assert_eq!(sheet.height(), 3);
        assert_eq!(sheet.width(), 3);
        assert_eq!(sheet.cell("A", 1), &Cell::Int(1));
        assert_eq!(sheet.cell("C", 1), &Cell::Float(100.5));
        assert_eq!(sheet.cell("C", 2), &Cell::Empty);
    }

    #[test]
    fn test_unsupported_extension() {
        let path = Path::new("notes.txt");
        assert!(!is_workbook_path(path));
        assert!(matches!(
            read_workbook(path),
            Err(WorkbookError::UnsupportedExtension(_))
        ));
    }
}
