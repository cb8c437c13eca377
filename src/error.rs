use std::path::PathBuf;

use thiserror::Error;

/// A raw cell value that could not be coerced into the requested scalar
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("value is empty")]
    Empty,

    #[error("not a number: {0:?}")]
    InvalidNumber(String),

    #[error("cannot parse date: {0:?}")]
    InvalidDate(String),
}

/// The workbook does not have the layout a backtest export is expected to have
#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("sheet {0:?} not found in workbook")]
    MissingSheet(String),

    #[error("sheet {sheet:?} has no {label:?} entry")]
    MissingLabel { sheet: String, label: String },

    #[error("sheet {sheet:?} has no column headed {column:?}")]
    MissingColumn { sheet: String, column: String },

    #[error("{label:?} is not a valid value: {source}")]
    InvalidField {
        label: String,
        #[source]
        source: ParseError,
    },

    #[error("{label:?} is not a start — end range: {value:?}")]
    BadRange { label: String, value: String },
}

/// Why a single trade row was skipped
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("{column}: {source}")]
    Field {
        column: &'static str,
        #[source]
        source: ParseError,
    },

    #[error("cannot infer direction from type {0:?}")]
    Direction(String),
}

/// Failure reading a workbook file into sheets
#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("unsupported workbook extension: {0:?}")]
    UnsupportedExtension(PathBuf),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Datastore failures, split along the lines the batch driver reports them
#[derive(Debug, Error)]
pub enum StoreError {
    /// Datastore unreachable or connection lost mid-transaction
    #[error("connection error: {0}")]
    Connectivity(String),

    /// Duplicate key, foreign-key violation or another constraint failure
    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Classify by SQLSTATE. Errors without one (conversion, protocol) are
    /// plain database errors unless the connection is gone.
    pub fn classify(closed: bool, sqlstate: Option<&str>, message: String) -> Self {
        if closed {
            return StoreError::Connectivity(message);
        }
        match sqlstate {
            // Class 23: integrity constraint violation
            Some(code) if code.starts_with("23") => StoreError::Integrity(message),
            // Class 08: connection exception
            Some(code) if code.starts_with("08") => StoreError::Connectivity(message),
            _ => StoreError::Database(message),
        }
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        StoreError::classify(e.is_closed(), e.code().map(|c| c.code()), e.to_string())
    }
}

/// Everything that can end the ingestion of a single file
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read workbook: {0}")]
    Workbook(#[from] WorkbookError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("symbol {symbol:?} not found in database (lookup key {key:?})")]
    TickerNotFound { symbol: String, key: String },

    #[error("no valid trade rows ({skipped} skipped, {open} open)")]
    NoValidTrades { skipped: usize, open: usize },

    #[error("backtesting insert failed: {0}")]
    RunInsert(#[source] StoreError),

    #[error("trade insert failed for backtesting id {run_id}: {source}")]
    TradeInsert {
        run_id: i64,
        #[source]
        source: StoreError,
    },

    #[error("ticker lookup failed: {0}")]
    Lookup(#[source] StoreError),

    #[error("filesystem error on {path:?}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IngestError {
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// True when the error leaves rows committed in the datastore
    pub fn after_commit(&self) -> bool {
        matches!(self, IngestError::TradeInsert { .. })
    }
}
