use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_postgres::types::Json;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::models::{NewBacktestRun, NewTrade};

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Client character set, sent as `client_encoding`
    pub charset: String,
    pub use_tls: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "backtesting".to_string(),
            charset: "UTF8".to_string(),
            use_tls: false,
        }
    }
}

impl DbConfig {
    fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .password(&self.password)
            .dbname(&self.database)
            .options(&format!("-c client_encoding={}", self.charset));
        config
    }
}

/// What the ingestion pipeline needs from the datastore.
///
/// Each insert is atomic: either every row of the call is committed or none is.
#[async_trait]
pub trait RunStore: Send {
    /// Exact-match lookup of a ticker key, returning the ticker row id
    async fn find_ticker(&mut self, key: &str) -> Result<Option<i64>, StoreError>;

    /// Insert one backtest run in its own transaction and return its id
    async fn insert_run(&mut self, run: &NewBacktestRun) -> Result<i64, StoreError>;

    /// Insert all trades of a run in one transaction; returns rows written
    async fn insert_trades(&mut self, run_id: i64, trades: &[NewTrade]) -> Result<u64, StoreError>;
}

/// PostgreSQL store over a single, non-pooled connection
pub struct PgStore {
    client: Client,
    connection: JoinHandle<()>,
}

impl PgStore {
    /// Connect to the PostgreSQL database
    pub async fn connect(config: &DbConfig) -> Result<Self, StoreError> {
        let pg_config = config.pg_config();

        let connection = if config.use_tls {
            let connector = TlsConnector::builder()
                .build()
                .map_err(|e| StoreError::Connectivity(format!("TLS setup failed: {}", e)))?;
            let connector = MakeTlsConnector::new(connector);

            let (client, connection) = pg_config.connect(connector).await?;
            let handle = tokio::spawn(async move {
                if let Err(e) = connection.await {
                    warn!("Database connection error: {}", e);
                }
            });
            (client, handle)
        } else {
            let (client, connection) = pg_config.connect(NoTls).await?;
            let handle = tokio::spawn(async move {
                if let Err(e) = connection.await {
                    warn!("Database connection error: {}", e);
                }
            });
            (client, handle)
        };

        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Connected to PostgreSQL"
        );

        Ok(Self {
            client: connection.0,
            connection: connection.1,
        })
    }

    /// Create the tables if they do not exist yet
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        let migration = include_str!("../migrations/001_backtesting.sql");
        self.client.batch_execute(migration).await?;
        info!("Database migrations complete");
        Ok(())
    }

    /// Close the connection and wait for the connection task to finish
    pub async fn close(self) {
        drop(self.client);
        if let Err(e) = self.connection.await {
            warn!("Database connection task ended abnormally: {}", e);
        }
        info!("Database connection closed");
    }
}

#[async_trait]
impl RunStore for PgStore {
    async fn find_ticker(&mut self, key: &str) -> Result<Option<i64>, StoreError> {
        let row = self
            .client
            .query_opt("SELECT id FROM exchange_tickers WHERE ticker_id = $1", &[&key])
            .await?;
        Ok(row.map(|r| r.get(0)))
    }

    async fn insert_run(&mut self, run: &NewBacktestRun) -> Result<i64, StoreError> {
        let s = &run.settings;
        let tx = self.client.transaction().await?;

        let row = tx
            .query_one(
                r#"
                INSERT INTO backtesting (
                    ticker_id, performance, trades_analysis, risk_performance_ratios, strategy,
                    trading_range_start, trading_range_end, backtesting_range_start, backtesting_range_end,
                    symbol, timeframe, point_value, chart_type, currency, tick_size, precision_setting,
                    start_date, initial_capital, order_size, pyramiding, commission, slippage,
                    verify_price_ticks, long_margin, short_margin, recalculate_after_order,
                    recalculate_every_tick, recalculate_on_bar_close, use_bar_magnifier
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
                    $21, $22, $23, $24, $25, $26, $27, $28, $29
                )
                RETURNING id
                "#,
                &[
                    &run.ticker_id,
                    &Json(&run.performance),
                    &Json(&run.trades_analysis),
                    &Json(&run.risk_performance_ratios),
                    &run.strategy,
                    &s.trading_range_start,
                    &s.trading_range_end,
                    &s.backtesting_range_start,
                    &s.backtesting_range_end,
                    &s.symbol,
                    &s.timeframe,
                    &s.point_value,
                    &s.chart_type,
                    &s.currency,
                    &s.tick_size,
                    &s.precision,
                    &s.start_date,
                    &s.initial_capital,
                    &s.order_size,
                    &s.pyramiding,
                    &s.commission,
                    &s.slippage,
                    &s.verify_price_ticks,
                    &s.long_margin,
                    &s.short_margin,
                    &s.recalculate_after_order.as_str(),
                    &s.recalculate_every_tick.as_str(),
                    &s.recalculate_on_bar_close.as_str(),
                    &s.use_bar_magnifier.as_str(),
                ],
            )
            .await?;

        let id: i64 = row.get(0);
        tx.commit().await?;

        info!("Recorded backtesting run #{} ({})", id, s.symbol);
        Ok(id)
    }

    async fn insert_trades(&mut self, run_id: i64, trades: &[NewTrade]) -> Result<u64, StoreError> {
        let tx = self.client.transaction().await?;

        let stmt = tx
            .prepare(
                r#"
                INSERT INTO trades (
                    backtesting_id, trade_id, trade_type, signal_type, exec_time, exec_price, quantity,
                    pnl_absolute, pnl_percent, runup_absolute, runup_percent,
                    drawdown_absolute, drawdown_percent, cumulative_pnl_absolute, cumulative_pnl_percent
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .await?;

        let mut written = 0u64;
        for trade in trades {
            written += tx
                .execute(
                    &stmt,
                    &[
                        &run_id,
                        &trade.trade_no,
                        &trade.direction.as_str(),
                        &trade.signal,
                        &trade.exec_time,
                        &trade.exec_price,
                        &trade.quantity,
                        &trade.pnl_absolute,
                        &trade.pnl_percent,
                        &trade.runup_absolute,
                        &trade.runup_percent,
                        &trade.drawdown_absolute,
                        &trade.drawdown_percent,
                        &trade.cumulative_pnl_absolute,
                        &trade.cumulative_pnl_percent,
                    ],
                )
                .await?;
        }

        tx.commit().await?;
        debug!(run_id, written, "Committed trade batch");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.charset, "UTF8");
        assert!(!config.use_tls);
    }

    #[test]
    fn test_pg_config_carries_charset() {
        let config = DbConfig {
            host: "db.internal".to_string(),
            database: "research".to_string(),
            charset: "LATIN1".to_string(),
            ..Default::default()
        };
        let pg = config.pg_config();
        assert_eq!(pg.get_dbname(), Some("research"));
        assert_eq!(pg.get_options(), Some("-c client_encoding=LATIN1"));
        assert_eq!(pg.get_ports(), &[5432]);
    }
}
