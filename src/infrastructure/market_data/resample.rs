use crate::domain::market::{Interval, RawObservation};

/// Aggregates ascending daily bars of one ticker into `interval` bars.
///
/// Open comes from the first bar of the period, close from the last, high and
/// low are extremes, volume is summed. The bar is dated with the period's
/// last trading day.
pub fn resample(daily: &[RawObservation], interval: Interval) -> Vec<RawObservation> {
    if interval == Interval::Daily {
        return daily.to_vec();
    }

    let mut out: Vec<RawObservation> = Vec::new();
    let mut current_key = None;
    for bar in daily {
        let key = interval.period_key(bar.date);
        match out.last_mut() {
            Some(agg) if current_key == Some(key) => {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
                agg.date = bar.date;
            }
            _ => {
                let mut agg = bar.clone();
                agg.interval = interval;
                agg.extra.clear();
                out.push(agg);
                current_key = Some(key);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_weekly_bars() {
        // 2024-01-01 is a Monday
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let daily: Vec<RawObservation> = (0..10)
            .map(|i| {
                let c = 10.0 + i as f64;
                RawObservation::new("X", start + chrono::Days::new(i), c, c + 1.0, c - 1.0, c, 1.0)
            })
            .collect();

        let weekly = resample(&daily, Interval::Weekly);
        assert_eq!(weekly.len(), 2);
        assert_eq!(weekly[0].open, 10.0);
        assert_eq!(weekly[0].close, 16.0);
        assert_eq!(weekly[0].high, 17.0);
        assert_eq!(weekly[0].low, 9.0);
        assert_eq!(weekly[0].volume, 7.0);
        assert_eq!(weekly[0].date, NaiveDate::from_ymd_opt(2024, 1, 7).unwrap());
        assert_eq!(weekly[1].interval, Interval::Weekly);
    }

    #[test]
    fn test_daily_is_identity() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let daily = vec![RawObservation::new("X", d, 1.0, 1.0, 1.0, 1.0, 1.0)];
        assert_eq!(resample(&daily, Interval::Daily), daily);
    }
}
