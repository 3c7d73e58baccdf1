use crate::domain::dataset::{CompareResult, Direction};
use crate::domain::errors::BacktestError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_INITIAL_BALANCE: f64 = 10_000.0;

/// Realized price move of one simulated step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepChange {
    pub date: NaiveDate,
    pub change: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub date: NaiveDate,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitCurves {
    pub always_buy: Vec<CurvePoint>,
    pub predicted: Vec<CurvePoint>,
    /// Trades only on realized up moves; the ceiling for any signal
    pub oracle: Vec<CurvePoint>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestReport {
    pub initial_balance: f64,
    pub steps: usize,
    pub accuracy_rate: f64,
    /// Share of up steps, i.e. the accuracy of always predicting up
    pub baseline_rate: f64,
    pub curves: ProfitCurves,
    pub compare: CompareResult,
}

impl BacktestReport {
    pub fn final_balances(&self) -> (f64, f64, f64) {
        let last = |c: &[CurvePoint]| c.last().map_or(self.initial_balance, |p| p.balance);
        (
            last(&self.curves.always_buy),
            last(&self.curves.predicted),
            last(&self.curves.oracle),
        )
    }
}

/// Replays the three strategies over `steps`. A strategy applies a step's
/// change only when its signal for that step is up.
pub fn simulate(
    compare: CompareResult,
    steps: &[StepChange],
    initial_balance: f64,
) -> Result<BacktestReport, BacktestError> {
    if compare.predicted.len() != steps.len() {
        return Err(BacktestError::PredictionCountMismatch {
            predictions: compare.predicted.len(),
            steps: steps.len(),
        });
    }

    let real: Vec<Direction> = compare.real.iter().map(Direction::from_label).collect();
    let predicted: Vec<Direction> = compare
        .predicted
        .iter()
        .map(Direction::from_probabilities)
        .collect();

    let mut curves = ProfitCurves::default();
    let (mut buy, mut pred, mut oracle) = (initial_balance, initial_balance, initial_balance);
    for (k, step) in steps.iter().enumerate() {
        buy += buy * step.change;
        if predicted[k].is_up() {
            pred += pred * step.change;
        }
        if real.get(k).is_some_and(Direction::is_up) {
            oracle += oracle * step.change;
        }
        let point = |balance| CurvePoint {
            date: step.date,
            balance,
        };
        curves.always_buy.push(point(buy));
        curves.predicted.push(point(pred));
        curves.oracle.push(point(oracle));
    }

    let scored = real.len().min(predicted.len());
    let (accuracy_rate, baseline_rate) = if scored == 0 {
        (0.0, 0.0)
    } else {
        let hits = (0..scored).filter(|&k| real[k] == predicted[k]).count();
        let ups = real[..scored].iter().filter(|d| d.is_up()).count();
        (hits as f64 / scored as f64, ups as f64 / scored as f64)
    };

    Ok(BacktestReport {
        initial_balance,
        steps: steps.len(),
        accuracy_rate,
        baseline_rate,
        curves,
        compare,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(changes: &[f64]) -> Vec<StepChange> {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        changes
            .iter()
            .enumerate()
            .map(|(i, &change)| StepChange {
                date: d + chrono::Days::new(i as u64),
                change,
            })
            .collect()
    }

    fn labels(changes: &[f64]) -> Vec<[f64; 2]> {
        changes
            .iter()
            .map(|c| if *c > 0.0 { [0.0, 1.0] } else { [1.0, 0.0] })
            .collect()
    }

    #[test]
    fn test_always_up_matches_always_buy() {
        let changes = [0.01, -0.02, 0.03];
        let compare = CompareResult {
            real: labels(&changes),
            predicted: vec![[0.1, 0.9]; 3],
        };
        let report = simulate(compare, &steps(&changes), DEFAULT_INITIAL_BALANCE).unwrap();

        assert_eq!(report.curves.predicted, report.curves.always_buy);
        let expected = 10_000.0 * 1.01 * 0.98 * 1.03;
        assert!((report.final_balances().0 - expected).abs() < 1e-9);
        assert!((report.baseline_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.accuracy_rate - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_oracle_skips_down_steps() {
        let changes = [0.01, -0.02, 0.03];
        let compare = CompareResult {
            real: labels(&changes),
            predicted: vec![[0.9, 0.1]; 3],
        };
        let report = simulate(compare, &steps(&changes), 100.0).unwrap();
        let (_, predicted, oracle) = report.final_balances();
        assert_eq!(predicted, 100.0);
        assert!((oracle - 100.0 * 1.01 * 1.03).abs() < 1e-9);
    }

    #[test]
    fn test_tie_is_not_a_buy() {
        let compare = CompareResult {
            real: vec![[0.0, 1.0]],
            predicted: vec![[0.5, 0.5]],
        };
        let report = simulate(compare, &steps(&[0.05]), 100.0).unwrap();
        assert_eq!(report.curves.predicted[0].balance, 100.0);
        assert_eq!(report.accuracy_rate, 0.0);
    }

    #[test]
    fn test_count_mismatch() {
        let compare = CompareResult {
            real: vec![],
            predicted: vec![[0.5, 0.5]],
        };
        assert_eq!(
            simulate(compare, &[], 100.0).unwrap_err(),
            BacktestError::PredictionCountMismatch {
                predictions: 1,
                steps: 0
            }
        );
    }
}
