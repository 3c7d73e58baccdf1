use super::program::{BinaryOp, Expr, FactorProgram, RollingFn, ScalarFn};
use crate::domain::errors::FactorError;
use crate::domain::market::{FACTOR_KEY_PREFIX, RawObservation};
use statrs::statistics::{Data, Distribution};
use std::collections::HashMap;

/// Anything that maps a series to a same-length series with extra `$f_` keys.
pub trait SeriesTransform: Send + Sync {
    fn transform(&self, series: &[RawObservation]) -> Result<Vec<RawObservation>, FactorError>;
}

impl SeriesTransform for FactorProgram {
    fn transform(&self, series: &[RawObservation]) -> Result<Vec<RawObservation>, FactorError> {
        self.apply(series)
    }
}

impl FactorProgram {
    /// Evaluates every assignment column-wise and returns an augmented copy of
    /// `series`. Undefined values (warm-up bars, division by zero) are written as `0`.
    pub fn apply(&self, series: &[RawObservation]) -> Result<Vec<RawObservation>, FactorError> {
        if series.is_empty() {
            return Ok(Vec::new());
        }

        let mut frame = SeriesFrame::new(series);
        let mut outputs: Vec<(String, Vec<f64>)> = Vec::new();

        for assignment in &self.assignments {
            let values = frame.eval(&assignment.expr)?;
            frame.computed.insert(assignment.target.clone(), values.clone());
            match outputs.iter_mut().find(|(k, _)| *k == assignment.target) {
                Some(slot) => slot.1 = values,
                None => outputs.push((assignment.target.clone(), values)),
            }
        }

        Ok(series
            .iter()
            .enumerate()
            .map(|(i, obs)| {
                let mut out = obs.clone();
                for (key, values) in &outputs {
                    let v = values[i];
                    out.extra
                        .insert(key.clone(), if v.is_finite() { v } else { 0.0 });
                }
                out
            })
            .collect())
    }
}

/// Checks that `output` honours the factor contract relative to `input`:
/// same length, identical key sets across records, and every added key prefixed `$f_`.
pub fn validate_output(
    input: &[RawObservation],
    output: &[RawObservation],
) -> Result<(), FactorError> {
    if input.len() != output.len() {
        return Err(FactorError::LengthMismatch {
            expected: input.len(),
            found: output.len(),
        });
    }
    let Some(first) = output.first() else {
        return Ok(());
    };

    let reference = first.field_names();
    for (index, record) in output.iter().enumerate().skip(1) {
        if record.field_names() != reference {
            return Err(FactorError::InconsistentKeys { index });
        }
    }

    let before = input[0].field_names();
    if let Some(added) = reference
        .iter()
        .find(|k| !before.contains(k) && !k.starts_with(FACTOR_KEY_PREFIX))
    {
        return Err(FactorError::InvalidTarget(added.clone()));
    }
    Ok(())
}

struct SeriesFrame<'a> {
    series: &'a [RawObservation],
    computed: HashMap<String, Vec<f64>>,
}

impl<'a> SeriesFrame<'a> {
    fn new(series: &'a [RawObservation]) -> Self {
        Self {
            series,
            computed: HashMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.series.len()
    }

    fn column(&self, name: &str) -> Result<Vec<f64>, FactorError> {
        if let Some(values) = self.computed.get(name) {
            return Ok(values.clone());
        }
        let values: Vec<Option<f64>> = self.series.iter().map(|o| o.number(name)).collect();
        if values.iter().all(Option::is_none) {
            return Err(FactorError::UnknownField(name.to_string()));
        }
        Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }

    fn eval(&self, expr: &Expr) -> Result<Vec<f64>, FactorError> {
        match expr {
            Expr::Number(v) => Ok(vec![*v; self.len()]),
            Expr::Field(name) => self.column(name),
            Expr::Neg(inner) => Ok(self.eval(inner)?.into_iter().map(|v| -v).collect()),
            Expr::Binary { op, lhs, rhs } => {
                let a = self.eval(lhs)?;
                let b = self.eval(rhs)?;
                Ok(a.iter()
                    .zip(b.iter())
                    .map(|(&x, &y)| match op {
                        BinaryOp::Add => x + y,
                        BinaryOp::Sub => x - y,
                        BinaryOp::Mul => x * y,
                        BinaryOp::Div => {
                            if y == 0.0 {
                                f64::NAN
                            } else {
                                x / y
                            }
                        }
                    })
                    .collect())
            }
            Expr::Call { function, args } => self.call(*function, args),
            Expr::Rolling {
                function,
                input,
                window,
            } => {
                let values = self.eval(input)?;
                Ok(rolling(*function, &values, *window))
            }
        }
    }

    fn call(&self, function: ScalarFn, args: &[Expr]) -> Result<Vec<f64>, FactorError> {
        let x = self.eval(&args[0])?;
        let out = match function {
            ScalarFn::Abs => x.into_iter().map(f64::abs).collect(),
            ScalarFn::Sign => x
                .into_iter()
                .map(|v| if v.is_nan() || v == 0.0 { v } else { v.signum() })
                .collect(),
            ScalarFn::Log => x
                .into_iter()
                .map(|v| if v > 0.0 { v.ln() } else { f64::NAN })
                .collect(),
            ScalarFn::Sqrt => x
                .into_iter()
                .map(|v| if v >= 0.0 { v.sqrt() } else { f64::NAN })
                .collect(),
            ScalarFn::Min | ScalarFn::Max => {
                let y = self.eval(&args[1])?;
                x.into_iter()
                    .zip(y)
                    .map(|(a, b)| {
                        if a.is_nan() || b.is_nan() {
                            f64::NAN
                        } else if function == ScalarFn::Min {
                            a.min(b)
                        } else {
                            a.max(b)
                        }
                    })
                    .collect()
            }
            ScalarFn::Fill => {
                let fallback = match args[1] {
                    Expr::Number(v) => v,
                    _ => 0.0,
                };
                x.into_iter()
                    .map(|v| if v.is_finite() { v } else { fallback })
                    .collect()
            }
        };
        Ok(out)
    }
}

fn rolling(function: RollingFn, values: &[f64], window: usize) -> Vec<f64> {
    match function {
        RollingFn::Delta | RollingFn::Delay | RollingFn::PctChange => {
            lagged(function, values, window)
        }
        _ => (0..values.len())
            .map(|i| {
                if i + 1 < window {
                    return f64::NAN;
                }
                let slice = &values[i + 1 - window..=i];
                if slice.iter().any(|v| v.is_nan()) {
                    return f64::NAN;
                }
                window_stat(function, slice)
            })
            .collect(),
    }
}

fn window_stat(function: RollingFn, slice: &[f64]) -> f64 {
    match function {
        RollingFn::Mean => Data::new(slice.to_vec()).mean().unwrap_or(f64::NAN),
        RollingFn::Std => Data::new(slice.to_vec()).std_dev().unwrap_or(f64::NAN),
        RollingFn::Sum => slice.iter().sum(),
        RollingFn::Max => slice.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        RollingFn::Min => slice.iter().copied().fold(f64::INFINITY, f64::min),
        RollingFn::Rank => {
            // Share of the window at or below the latest value
            let last = slice[slice.len() - 1];
            slice.iter().filter(|&&v| v <= last).count() as f64 / slice.len() as f64
        }
        RollingFn::Delta | RollingFn::Delay | RollingFn::PctChange => f64::NAN,
    }
}

fn lagged(function: RollingFn, values: &[f64], periods: usize) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            if i < periods {
                return f64::NAN;
            }
            let prev = values[i - periods];
            let curr = values[i];
            match function {
                RollingFn::Delta => curr - prev,
                RollingFn::Delay => prev,
                _ => {
                    if prev == 0.0 {
                        f64::NAN
                    } else {
                        (curr - prev) / prev
                    }
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(closes: &[f64]) -> Vec<RawObservation> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                RawObservation::new(
                    "NDX",
                    start + chrono::Days::new(i as u64),
                    c - 1.0,
                    c + 2.0,
                    c - 2.0,
                    c,
                    1000.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_range_factor() {
        let program = FactorProgram::parse("$f_range = high - low").unwrap();
        let out = program.apply(&series(&[10.0, 11.0])).unwrap();
        assert_eq!(out[0].extra["$f_range"], 4.0);
        assert_eq!(out[1].extra["$f_range"], 4.0);
    }

    #[test]
    fn test_rolling_mean_warmup_is_zero_filled() {
        let program = FactorProgram::parse("$f_ma = ts_mean(close, 3)").unwrap();
        let out = program.apply(&series(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        let values: Vec<f64> = out.iter().map(|o| o.extra["$f_ma"]).collect();
        assert_eq!(values, vec![0.0, 0.0, 2.0, 3.0]);
    }

    #[test]
    fn test_later_assignment_reads_earlier_output() {
        let src = "$f_ret = ts_pct_change(close, 1)\n$f_ret2 = $f_ret * 2";
        let program = FactorProgram::parse(src).unwrap();
        let out = program.apply(&series(&[100.0, 110.0])).unwrap();
        assert!((out[1].extra["$f_ret2"] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_existing_factor_column_is_readable() {
        let input: Vec<RawObservation> = series(&[1.0, 2.0])
            .into_iter()
            .map(|o| o.with_extra("$f_prev", 5.0))
            .collect();
        let program = FactorProgram::parse("$f_next = $f_prev + close").unwrap();
        let out = program.apply(&input).unwrap();
        assert_eq!(out[1].extra["$f_next"], 7.0);
    }

    #[test]
    fn test_division_by_zero_and_fill() {
        let src = "$f_bad = close / 0\n$f_filled = fill(close / 0, -1)";
        let program = FactorProgram::parse(src).unwrap();
        let out = program.apply(&series(&[3.0])).unwrap();
        assert_eq!(out[0].extra["$f_bad"], 0.0);
        assert_eq!(out[0].extra["$f_filled"], -1.0);
    }

    #[test]
    fn test_unknown_field_is_error() {
        let program = FactorProgram::parse("$f_x = vwap * 2").unwrap();
        let err = program.apply(&series(&[1.0])).unwrap_err();
        assert_eq!(err, FactorError::UnknownField("vwap".to_string()));
    }

    #[test]
    fn test_rank_and_std() {
        let program =
            FactorProgram::parse("$f_rank = ts_rank(close, 3)\n$f_sd = ts_std(close, 3)").unwrap();
        let out = program.apply(&series(&[3.0, 1.0, 2.0])).unwrap();
        assert!((out[2].extra["$f_rank"] - 2.0 / 3.0).abs() < 1e-12);
        assert!((out[2].extra["$f_sd"] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_input_is_not_mutated() {
        let input = series(&[1.0, 2.0]);
        let snapshot = input.clone();
        let program = FactorProgram::parse("$f_x = close").unwrap();
        let _ = program.apply(&input).unwrap();
        assert_eq!(input, snapshot);
    }

    #[test]
    fn test_validate_output_length() {
        let input = series(&[1.0, 2.0]);
        let err = validate_output(&input, &input[..1]).unwrap_err();
        assert_eq!(
            err,
            FactorError::LengthMismatch {
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn test_validate_output_key_uniformity() {
        let input = series(&[1.0, 2.0]);
        let mut output = input.clone();
        output[1].extra.insert("$f_only_here".to_string(), 1.0);
        assert_eq!(
            validate_output(&input, &output).unwrap_err(),
            FactorError::InconsistentKeys { index: 1 }
        );
    }

    #[test]
    fn test_validate_output_rejects_unprefixed_key() {
        let input = series(&[1.0]);
        let output: Vec<RawObservation> = input
            .iter()
            .cloned()
            .map(|o| o.with_extra("spread", 1.0))
            .collect();
        assert_eq!(
            validate_output(&input, &output).unwrap_err(),
            FactorError::InvalidTarget("spread".to_string())
        );
    }
}
