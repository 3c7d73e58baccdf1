use crate::domain::market::RawObservation;
use crate::domain::ports::{HistoricalDataSource, HistoryQuery};
use crate::infrastructure::market_data::shape_series;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

/// Daily bars imported into sqlite, served through the same shaping path as CSV files
pub struct SqliteObservationSource {
    pool: SqlitePool,
}

impl SqliteObservationSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upserts daily bars. Indicator columns are not stored; they are derived on fetch.
    pub async fn save_batch(&self, bars: &[RawObservation]) -> Result<usize> {
        if bars.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for bar in bars {
            sqlx::query(
                r#"
                INSERT INTO observations (ticker, date, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(ticker, date) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume
                "#,
            )
            .bind(&bar.ticker)
            .bind(bar.date.format("%Y-%m-%d").to_string())
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .execute(&mut *tx)
            .await
            .context("Failed to save observation")?;
        }
        tx.commit().await?;

        info!("Persisted {} observations", bars.len());
        Ok(bars.len())
    }

    pub async fn count(&self, ticker: &str) -> Result<usize> {
        let count: i64 = sqlx::query("SELECT COUNT(*) as count FROM observations WHERE ticker = ?")
            .bind(ticker)
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;
        Ok(count as usize)
    }

    async fn load_daily(&self, ticker: &str, query: &HistoryQuery) -> Result<Vec<RawObservation>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM observations
            WHERE ticker = ? AND date >= ? AND date <= ?
            ORDER BY date ASC
            "#,
        )
        .bind(ticker)
        .bind(query.range.start.format("%Y-%m-%d").to_string())
        .bind(query.range.end.format("%Y-%m-%d").to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load observations")?;

        rows.iter()
            .map(|row| {
                let date: String = row.try_get("date")?;
                let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                    .with_context(|| format!("Stored date '{}' is malformed", date))?;
                Ok(RawObservation::new(
                    ticker,
                    date,
                    row.try_get("open")?,
                    row.try_get("high")?,
                    row.try_get("low")?,
                    row.try_get("close")?,
                    row.try_get("volume")?,
                ))
            })
            .collect()
    }
}

#[async_trait]
impl HistoricalDataSource for SqliteObservationSource {
    async fn fetch(&self, query: &HistoryQuery) -> Result<Vec<RawObservation>> {
        let mut out = Vec::new();
        for ticker in &query.tickers {
            let daily = self.load_daily(ticker, query).await?;
            debug!("Loaded {} daily bars for {}", daily.len(), ticker);
            out.extend(shape_series(daily, query)?);
        }
        Ok(out)
    }
}
