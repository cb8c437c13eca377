//! Batch driver: one pass over the inbox
//!
//! Per file the order is fixed: read → map run → map trades → resolve ticker →
//! insert run → insert trades → move to processed. Every mapping step runs
//! before the first write, so shape and lookup failures leave the datastore
//! untouched. Failures stop at the file boundary and the batch moves on.

use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::audit::AuditLog;
use crate::config::IngestConfig;
use crate::db::RunStore;
use crate::error::{IngestError, WorkbookError};
use crate::files::{self, DirLayout, UnzipSummary};
use crate::mapper::{map_run, map_trades};
use crate::sheet::{self, Workbook};

/// Turns a file on disk into sheets
pub type WorkbookReader = fn(&Path) -> Result<Workbook, WorkbookError>;

/// What a successfully ingested file produced
#[derive(Debug, Clone, PartialEq)]
pub struct FileReport {
    pub run_id: i64,
    pub symbol: String,
    pub strategy: String,
    pub trades_inserted: u64,
    pub skipped_rows: usize,
    pub open_rows: usize,
    /// Where the source ended up; `None` when the move failed
    pub processed_path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<FileReport, IngestError>,
}

impl FileOutcome {
    pub fn file_name(&self) -> String {
        display_name(&self.path)
    }
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub archives: UnzipSummary,
    pub files: Vec<FileOutcome>,
}

impl BatchSummary {
    /// The inbox held no workbooks
    pub fn nothing_to_process(&self) -> bool {
        self.files.is_empty()
    }

    pub fn ingested(&self) -> impl Iterator<Item = (&FileOutcome, &FileReport)> {
        self.files
            .iter()
            .filter_map(|f| f.result.as_ref().ok().map(|r| (f, r)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&FileOutcome, &IngestError)> {
        self.files
            .iter()
            .filter_map(|f| f.result.as_ref().err().map(|e| (f, e)))
    }

    pub fn trades_inserted(&self) -> u64 {
        self.ingested().map(|(_, r)| r.trades_inserted).sum()
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Ingests workbooks from the inbox into a [`RunStore`]
pub struct Ingestor<S: RunStore> {
    store: S,
    config: IngestConfig,
    layout: DirLayout,
    audit: AuditLog,
    reader: WorkbookReader,
}

impl<S: RunStore> Ingestor<S> {
    pub fn new(store: S, config: IngestConfig) -> Self {
        let layout = DirLayout::from_config(&config.directories);
        let audit = AuditLog::new(config.audit_log.path.clone());
        Self {
            store,
            config,
            layout,
            audit,
            reader: sheet::read_workbook,
        }
    }

    /// Replace the workbook reader
    pub fn with_reader(mut self, reader: WorkbookReader) -> Self {
        self.reader = reader;
        self
    }

    pub fn layout(&self) -> &DirLayout {
        &self.layout
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Map and persist one workbook. Does not touch the file itself.
    pub async fn ingest_file(&mut self, path: &Path) -> Result<FileReport, IngestError> {
        let workbook = (self.reader)(path)?;
        debug!(
            file = %path.display(),
            sheets = ?workbook.sheet_names().collect::<Vec<_>>(),
            "Workbook loaded"
        );

        let strategy = self.config.strategy.label_for(path);
        let candidate = map_run(&workbook, &strategy)?;
        let batch = map_trades(&workbook)?;
        if !batch.is_success() {
            return Err(IngestError::NoValidTrades {
                skipped: batch.skipped.len(),
                open: batch.open,
            });
        }

        let symbol = candidate.settings.symbol.clone();
        let key = self.config.ticker.lookup_key(&symbol);
        let ticker_id = self
            .store
            .find_ticker(&key)
            .await
            .map_err(IngestError::Lookup)?
            .ok_or_else(|| IngestError::TickerNotFound {
                symbol: symbol.clone(),
                key: key.clone(),
            })?;
        debug!(symbol = %symbol, key = %key, ticker_id, "Ticker resolved");

        let run = candidate.resolve(ticker_id);
        let run_id = self
            .store
            .insert_run(&run)
            .await
            .map_err(IngestError::RunInsert)?;

        let trades_inserted = self
            .store
            .insert_trades(run_id, &batch.trades)
            .await
            .map_err(|source| IngestError::TradeInsert { run_id, source })?;

        info!(
            file = %path.display(),
            run_id,
            trades = trades_inserted,
            skipped = batch.skipped.len(),
            open = batch.open,
            "Backtest ingested"
        );

        Ok(FileReport {
            run_id,
            symbol,
            strategy,
            trades_inserted,
            skipped_rows: batch.skipped.len(),
            open_rows: batch.open,
            processed_path: None,
        })
    }

    /// Expand archives, then ingest every workbook currently in the inbox.
    ///
    /// Only directory setup and inbox listing can fail the batch as a whole.
    pub async fn run_batch(&mut self) -> Result<BatchSummary, IngestError> {
        self.layout
            .ensure()
            .map_err(|e| IngestError::fs(&self.layout.root, e))?;

        let archives = match files::unzip_all_and_backup(&self.layout) {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Archive expansion failed: {}", e);
                self.audit
                    .record(&format!("Archive expansion failed in {}: {}", self.layout.inbox.display(), e));
                UnzipSummary::default()
            }
        };

        let workbooks = files::discover_workbooks(&self.layout.inbox)
            .map_err(|e| IngestError::fs(&self.layout.inbox, e))?;

        let mut summary = BatchSummary {
            archives,
            files: Vec::with_capacity(workbooks.len()),
        };

        if workbooks.is_empty() {
            info!(inbox = %self.layout.inbox.display(), "Nothing to process");
            return Ok(summary);
        }
        info!(count = workbooks.len(), "Found workbooks to ingest");

        for path in workbooks {
            let result = self.process_one(&path).await;
            summary.files.push(FileOutcome { path, result });
        }

        Ok(summary)
    }

    async fn process_one(&mut self, path: &Path) -> Result<FileReport, IngestError> {
        let name = display_name(path);

        let mut report = match self.ingest_file(path).await {
            Ok(report) => report,
            Err(e) => {
                if e.after_commit() {
                    error!(file = %name, "Ingest failed after the run was committed: {}", e);
                } else {
                    error!(file = %name, "Ingest failed: {}", e);
                }
                self.audit.record(&format!("{}: {}", name, e));
                return Err(e);
            }
        };

        // The rows are committed at this point; a failed move is reported but not undone
        match files::move_file(path, &self.layout.processed) {
            Ok(dest) => report.processed_path = Some(dest),
            Err(e) => {
                error!(file = %name, run_id = report.run_id, "Failed to move to processed: {}", e);
                self.audit.record(&format!(
                    "{}: ingested as backtesting id {} but could not be moved to {}: {}",
                    name,
                    report.run_id,
                    self.layout.processed.display(),
                    e
                ));
            }
        }

        Ok(report)
    }
}
