//! Backtest ingestion batch job
//!
//! One pass over the inbox: expand archives, ingest every workbook, move the
//! ingested files to `processed`. Takes no flags; everything comes from
//! `INGEST_CONFIG_PATH` (default `config/ingest.yaml`) and `INGEST_*` variables.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use backtest_ingest::config::IngestConfig;
use backtest_ingest::db::PgStore;
use backtest_ingest::pipeline::{BatchSummary, Ingestor};

#[derive(Parser, Debug)]
#[command(name = "backtest-ingest")]
#[command(about = "Ingest backtest workbooks from the inbox into PostgreSQL")]
struct Args {}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _args = Args::parse();

    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,backtest_ingest=debug".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&log_filter))
        .with_target(true)
        .init();

    let config_path = PathBuf::from(
        std::env::var("INGEST_CONFIG_PATH").unwrap_or_else(|_| "config/ingest.yaml".to_string()),
    );
    let config = IngestConfig::load_with_env(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    info!(config = %config_path.display(), "Configuration loaded");

    println!("🔌 Connecting to database...");
    let store = PgStore::connect(&config.database)
        .await
        .context("Failed to connect to database")?;

    println!("📋 Running migrations...");
    if let Err(e) = store.run_migrations().await {
        store.close().await;
        return Err(e).context("Failed to run migrations");
    }

    let mut ingestor = Ingestor::new(store, config);
    println!("\n📥 Scanning {}...", ingestor.layout().inbox.display());
    let outcome = ingestor.run_batch().await;

    // Close on every path, including a failed batch
    ingestor.into_store().close().await;

    let summary = outcome.context("Batch aborted")?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    if summary.archives.archives > 0 {
        println!(
            "🗜  Archives expanded ({}/{}), {} workbooks extracted",
            summary.archives.backed_up,
            summary.archives.archives,
            summary.archives.extracted.len()
        );
    }

    if summary.nothing_to_process() {
        println!("📭 Nothing to process.");
        return;
    }

    for file in &summary.files {
        match &file.result {
            Ok(report) => {
                println!(
                    "  ✅ {} → backtesting #{} ({} {}), {} trades inserted",
                    file.file_name(),
                    report.run_id,
                    report.strategy,
                    report.symbol,
                    report.trades_inserted
                );
                if report.skipped_rows > 0 {
                    println!("     ⚠️  {} malformed trade rows skipped", report.skipped_rows);
                }
                if report.processed_path.is_none() {
                    println!("     ⚠️  could not move file to processed, see audit log");
                }
            }
            Err(e) => {
                error!(file = %file.file_name(), "{}", e);
                println!("  ❌ {}: {}", file.file_name(), e);
            }
        }
    }

    let ingested = summary.ingested().count();
    let failed = summary.failed().count();
    println!(
        "\n📊 {} ingested, {} failed, {} trades inserted",
        ingested,
        failed,
        summary.trades_inserted()
    );
}
