use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::db::DbConfig;

/// Ingestion configuration loaded from YAML
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub database: DbConfig,
    pub directories: DirConfig,
    pub ticker: TickerConfig,
    pub strategy: StrategyConfig,
    /// Append-only audit log of file-level failures
    pub audit_log: AuditConfig,
}

/// Working directories. Relative `inbox`/`processed`/`backup` paths are
/// resolved against `root`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirConfig {
    pub root: PathBuf,
    pub inbox: PathBuf,
    pub processed: PathBuf,
    pub backup: PathBuf,
}

impl Default for DirConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/backtesting"),
            inbox: PathBuf::from("new"),
            processed: PathBuf::from("processed"),
            backup: PathBuf::from("backup"),
        }
    }
}

impl DirConfig {
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }

    pub fn inbox_dir(&self) -> PathBuf {
        self.resolve(&self.inbox)
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.resolve(&self.processed)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.resolve(&self.backup)
    }
}

/// How a workbook's symbol becomes the lookup key in `exchange_tickers`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TickerConfig {
    /// Drop an `EXCHANGE:` prefix ("BINANCE:BTCUSDT" → "BTCUSDT")
    pub strip_exchange_prefix: bool,
    /// Uppercase the key before lookup
    pub uppercase: bool,
}

impl TickerConfig {
    pub fn lookup_key(&self, symbol: &str) -> String {
        let mut key = symbol.trim();
        if self.strip_exchange_prefix {
            if let Some((_, rest)) = key.split_once(':') {
                key = rest.trim();
            }
        }
        if self.uppercase {
            key.to_uppercase()
        } else {
            key.to_string()
        }
    }
}

/// Where the run's strategy label comes from
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Fixed label for every run. When unset the label is taken from the file name.
    pub label: Option<String>,
    /// Used when the file name yields nothing usable
    pub fallback: String,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            label: None,
            fallback: "Custom_Signal".to_string(),
        }
    }
}

impl StrategyConfig {
    /// Strategy label for a source file: the configured label, or the part of
    /// the file stem before the first `_` ("RSI-Divergence_BTCUSDT_1h.xlsx" →
    /// "RSI-Divergence").
    pub fn label_for(&self, path: &Path) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        path.file_stem()
            .and_then(|s| s.to_str())
            .and_then(|stem| stem.split('_').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("logs/db/transactions.log"),
        }
    }
}

impl IngestConfig {
    /// Load configuration from YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: IngestConfig = serde_yaml::from_str(&contents)
            .with_context(|| "Failed to parse YAML configuration")?;

        Ok(config)
    }

    /// Load the file if it exists (defaults otherwise), then apply environment overrides
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override settings from environment-style variables
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        let db = &mut self.database;
        if let Some(val) = var("INGEST_DB_HOST") {
            db.host = val;
        }
        if let Some(val) = var("INGEST_DB_PORT") {
            db.port = val
                .parse()
                .with_context(|| format!("INGEST_DB_PORT is not a port number: {}", val))?;
        }
        if let Some(val) = var("INGEST_DB_USER") {
            db.user = val;
        }
        if let Some(val) = var("INGEST_DB_PASSWORD") {
            db.password = val;
        }
        if let Some(val) = var("INGEST_DB_NAME") {
            db.database = val;
        }
        if let Some(val) = var("INGEST_DB_CHARSET") {
            db.charset = val;
        }
        if let Some(val) = var("INGEST_DB_TLS") {
            db.use_tls = matches!(val.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(val) = var("INGEST_ROOT_DIR") {
            self.directories.root = PathBuf::from(val);
        }
        if let Some(val) = var("INGEST_AUDIT_LOG") {
            self.audit_log.path = PathBuf::from(val);
        }
        if let Some(val) = var("INGEST_STRATEGY") {
            self.strategy.label = Some(val);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_yaml_with_defaults() {
        let yaml = r#"
database:
  host: db.example.com
  password: secret
directories:
  root: /srv/backtests
ticker:
  strip_exchange_prefix: true
"#;
        let config: IngestConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.database.host, "db.example.com");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.charset, "UTF8");
        assert_eq!(config.directories.inbox_dir(), PathBuf::from("/srv/backtests/new"));
        assert_eq!(config.directories.backup_dir(), PathBuf::from("/srv/backtests/backup"));
        assert!(config.ticker.strip_exchange_prefix);
        assert_eq!(config.audit_log.path, PathBuf::from("logs/db/transactions.log"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("INGEST_DB_HOST", "10.0.0.5"),
            ("INGEST_DB_PORT", "6543"),
            ("INGEST_DB_TLS", "true"),
            ("INGEST_ROOT_DIR", "/tmp/bt"),
        ]
        .into_iter()
        .collect();

        let mut config = IngestConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database.host, "10.0.0.5");
        assert_eq!(config.database.port, 6543);
        assert!(config.database.use_tls);
        assert_eq!(config.directories.processed_dir(), PathBuf::from("/tmp/bt/processed"));

        let mut config = IngestConfig::default();
        let bad = config.apply_env(|k| (k == "INGEST_DB_PORT").then(|| "abc".to_string()));
        assert!(bad.is_err());
    }

    #[test]
    fn test_ticker_lookup_key() {
        let verbatim = TickerConfig::default();
        assert_eq!(verbatim.lookup_key(" BINANCE:BTCUSDT "), "BINANCE:BTCUSDT");

        let stripped = TickerConfig {
            strip_exchange_prefix: true,
            uppercase: true,
        };
        assert_eq!(stripped.lookup_key("binance:btcusdt.p"), "BTCUSDT.P");
        assert_eq!(stripped.lookup_key("ethusdt"), "ETHUSDT");
    }

    #[test]
    fn test_strategy_label() {
        let config = StrategyConfig::default();
        assert_eq!(
            config.label_for(Path::new("inbox/RSI-Divergence_BTCUSDT_1h.xlsx")),
            "RSI-Divergence"
        );
        assert_eq!(config.label_for(Path::new("inbox/_x.xlsx")), "Custom_Signal");

        let fixed = StrategyConfig {
            label: Some("Grid".to_string()),
            ..Default::default()
        };
        assert_eq!(fixed.label_for(Path::new("whatever.xlsx")), "Grid");
    }
}
