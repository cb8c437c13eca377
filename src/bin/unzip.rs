//! Expand every archive in the inbox and move it to the backup directory.
//!
//! The batch job does this itself before ingesting; this binary runs the step
//! on its own.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use backtest_ingest::config::IngestConfig;
use backtest_ingest::files::{self, DirLayout};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = PathBuf::from(
        std::env::var("INGEST_CONFIG_PATH").unwrap_or_else(|_| "config/ingest.yaml".to_string()),
    );
    let config = IngestConfig::load_with_env(&config_path)?;

    let layout = DirLayout::from_config(&config.directories);
    layout
        .ensure()
        .with_context(|| format!("Failed to create directories under {}", layout.root.display()))?;

    let summary = files::unzip_all_and_backup(&layout)
        .with_context(|| format!("Failed to scan {}", layout.inbox.display()))?;

    if summary.archives == 0 {
        println!("📭 No archives in {}", layout.inbox.display());
        return Ok(());
    }

    for path in &summary.extracted {
        println!("  📄 {}", path.display());
    }
    println!(
        "✅ Unzipped and backed up ({}/{})",
        summary.backed_up, summary.archives
    );
    Ok(())
}
