pub mod csv_source;
pub mod indicators;
pub mod resample;

pub use csv_source::CsvObservationSource;
pub use indicators::attach_indicators;
pub use resample::resample;

use crate::domain::market::RawObservation;
use crate::domain::ports::HistoryQuery;
use anyhow::Result;
use tracing::warn;

/// Turns one ticker's ascending daily bars into the series a query asks for:
/// clipped to the range, resampled, with baseline indicators attached.
/// Bars carrying NaN or infinite values are dropped.
pub fn shape_series(mut daily: Vec<RawObservation>, query: &HistoryQuery) -> Result<Vec<RawObservation>> {
    daily.retain(|bar| query.range.contains(bar.date));
    let before = daily.len();
    daily.retain(RawObservation::is_finite);
    if daily.len() < before {
        warn!(
            "Dropped {} bar(s) with non-finite values",
            before - daily.len()
        );
    }
    daily.sort_by_key(|bar| bar.date);
    let mut series = resample(&daily, query.interval);
    attach_indicators(&mut series, query.indicators)?;
    Ok(series)
}
