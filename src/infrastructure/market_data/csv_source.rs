use super::shape_series;
use crate::domain::market::RawObservation;
use crate::domain::ports::{HistoricalDataSource, HistoryQuery};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct CsvBar {
    #[serde(default)]
    ticker: Option<String>,
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Reads daily bars from `{dir}/{TICKER}.csv` with a header row of
/// `date,open,high,low,close,volume` (an optional `ticker` column is ignored).
pub struct CsvObservationSource {
    dir: PathBuf,
}

impl CsvObservationSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", ticker))
    }

    /// Parses every daily bar for `ticker`.
    pub async fn read_daily(&self, ticker: &str) -> Result<Vec<RawObservation>> {
        let path = self.path_for(ticker);
        if !path.exists() {
            warn!("No CSV file for {} at {:?}", ticker, path);
            return Ok(Vec::new());
        }
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        parse_bars(ticker, &bytes, &path)
    }

    /// Tickers with a CSV file in the directory
    pub fn tickers(&self) -> Result<Vec<String>> {
        let mut tickers = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list {:?}", self.dir))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "csv")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                tickers.push(stem.to_string());
            }
        }
        tickers.sort();
        Ok(tickers)
    }
}

fn parse_bars(ticker: &str, bytes: &[u8], path: &Path) -> Result<Vec<RawObservation>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let mut bars = Vec::new();
    for (line, result) in rdr.deserialize::<CsvBar>().enumerate() {
        let bar = result.with_context(|| format!("Bad row {} in {:?}", line + 2, path))?;
        if let Some(t) = &bar.ticker
            && t != ticker
        {
            debug!("Row for {} found in {}'s file", t, ticker);
        }
        bars.push(RawObservation::new(
            ticker, bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume,
        ));
    }
    Ok(bars)
}

#[async_trait]
impl HistoricalDataSource for CsvObservationSource {
    async fn fetch(&self, query: &HistoryQuery) -> Result<Vec<RawObservation>> {
        let mut out = Vec::new();
        for ticker in &query.tickers {
            let daily = self.read_daily(ticker).await?;
            out.extend(shape_series(daily, query)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::{DateRange, Interval};
    use crate::domain::ports::IndicatorRequest;

    #[tokio::test]
    async fn test_fetch_filters_range_and_adds_indicators() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("AAA.csv"),
            "date,open,high,low,close,volume\n\
             2024-01-02,1,2,0.5,1.5,100\n\
             2024-01-03,1.5,2.5,1,2,120\n\
             2024-01-04,2,3,1.5,2.5,90\n",
        )
        .unwrap();

        let source = CsvObservationSource::new(dir.path());
        assert_eq!(source.tickers().unwrap(), vec!["AAA".to_string()]);

        let query = HistoryQuery {
            tickers: vec!["AAA".into(), "MISSING".into()],
            range: DateRange::new(
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            )
            .unwrap(),
            interval: Interval::Daily,
            indicators: IndicatorRequest {
                sma: true,
                rsi: false,
                ema: false,
            },
        };
        let bars = source.fetch(&query).await.unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 2.0);
        assert!(bars[1].extra.contains_key("sma5"));
        assert!(!bars[1].extra.contains_key("rsi14"));
    }

    #[tokio::test]
    async fn test_non_finite_rows_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("BBB.csv"),
            "date,open,high,low,close,volume\n\
             2024-01-02,1,2,0.5,1.5,100\n\
             2024-01-03,1.5,2.5,1,NaN,120\n\
             2024-01-04,2,inf,1.5,2.5,90\n\
             2024-01-05,2.5,3,2,2.8,80\n",
        )
        .unwrap();

        let source = CsvObservationSource::new(dir.path());
        assert_eq!(source.read_daily("BBB").await.unwrap().len(), 4);

        let query = HistoryQuery {
            tickers: vec!["BBB".into()],
            range: DateRange::new(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            )
            .unwrap(),
            interval: Interval::Daily,
            indicators: IndicatorRequest::all(),
        };
        let bars = source.fetch(&query).await.unwrap();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![1.5, 2.8]);
        assert!(bars.iter().all(RawObservation::is_finite));
    }
}
