use crate::domain::market::RawObservation;
use crate::domain::ports::IndicatorRequest;
use anyhow::{Result, anyhow};
use ta::Next;
use ta::indicators::{ExponentialMovingAverage, RelativeStrengthIndex, SimpleMovingAverage};

pub const SMA_PERIODS: [usize; 3] = [5, 10, 20];
pub const EMA_PERIODS: [usize; 2] = [12, 26];
pub const RSI_PERIOD: usize = 14;

/// Attaches the requested baseline indicators to one ticker's ascending series.
/// Keys are `sma{n}`, `ema{n}` and `rsi{n}`.
pub fn attach_indicators(series: &mut [RawObservation], request: IndicatorRequest) -> Result<()> {
    if !request.any() {
        return Ok(());
    }

    if request.sma {
        for period in SMA_PERIODS {
            let mut sma = SimpleMovingAverage::new(period)
                .map_err(|e| anyhow!("Invalid SMA period {}: {:?}", period, e))?;
            let key = format!("sma{}", period);
            for obs in series.iter_mut() {
                obs.extra.insert(key.clone(), sma.next(obs.close));
            }
        }
    }

    if request.ema {
        for period in EMA_PERIODS {
            let mut ema = ExponentialMovingAverage::new(period)
                .map_err(|e| anyhow!("Invalid EMA period {}: {:?}", period, e))?;
            let key = format!("ema{}", period);
            for obs in series.iter_mut() {
                obs.extra.insert(key.clone(), ema.next(obs.close));
            }
        }
    }

    if request.rsi {
        let mut rsi = RelativeStrengthIndex::new(RSI_PERIOD)
            .map_err(|e| anyhow!("Invalid RSI period {}: {:?}", RSI_PERIOD, e))?;
        let key = format!("rsi{}", RSI_PERIOD);
        for obs in series.iter_mut() {
            obs.extra.insert(key.clone(), rsi.next(obs.close));
        }
    }

    Ok(())
}
