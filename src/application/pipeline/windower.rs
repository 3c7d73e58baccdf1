use crate::domain::dataset::{AlignedRecord, Direction, Normalizer, Window, WindowedDataset};
use crate::domain::errors::PipelineError;
use crate::domain::task::OutputKind;

/// Suffix of the optional validity-mask feature columns
pub const VALID_SUFFIX: &str = "__valid";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowSpec {
    pub window_length: usize,
    pub input_keys: Vec<String>,
    pub output_key: Option<String>,
    pub output_kind: Option<OutputKind>,
    /// Appends one 0/1 column per input key carrying its validity flag
    pub include_validity_mask: bool,
}

/// Slices `records` into sliding windows and min-max normalizes features.
///
/// Windows start at every `i` in `[0, len - window_length)`. When
/// `len == window_length` a single unlabeled window is produced so the most
/// recent history can be scored.
pub fn window(records: &[AlignedRecord], spec: &WindowSpec) -> Result<WindowedDataset, PipelineError> {
    let w = spec.window_length;
    if w == 0 {
        return Err(PipelineError::WindowLengthZero);
    }
    if spec.output_kind.is_some() && spec.output_key.is_none() {
        return Err(PipelineError::MissingOutputKey);
    }

    let mut feature_names = spec.input_keys.clone();
    if spec.include_validity_mask {
        feature_names.extend(spec.input_keys.iter().map(|k| format!("{}{}", k, VALID_SUFFIX)));
    }

    if records.len() < w {
        return Ok(WindowedDataset {
            windows: Vec::new(),
            feature_names,
            normalizer: Normalizer::default(),
        });
    }

    let rows = records
        .iter()
        .map(|r| feature_row(r, spec))
        .collect::<Result<Vec<_>, _>>()?;

    let targets = match (&spec.output_kind, &spec.output_key) {
        (Some(_), Some(key)) => Some(
            records
                .iter()
                .map(|r| numeric(r, key))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        _ => None,
    };

    let starts: Vec<usize> = if records.len() == w {
        vec![0]
    } else {
        (0..records.len() - w).collect()
    };

    // Fit only over the rows covered by some window
    let covered = starts.last().map_or(0, |last| last + w);
    let width = feature_names.len();
    let normalizer = Normalizer::fit(&rows[..covered], width);

    let windows = starts
        .into_iter()
        .map(|i| {
            let features = rows[i..i + w]
                .iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .map(|(j, &v)| normalizer.scale(j, v))
                        .collect()
                })
                .collect();
            let label = targets.as_ref().and_then(|t| {
                let next = i + w;
                (next < t.len()).then(|| Direction::label(t[next - 1], t[next]).one_hot())
            });
            Window { features, label }
        })
        .collect();

    Ok(WindowedDataset {
        windows,
        feature_names,
        normalizer,
    })
}

fn feature_row(record: &AlignedRecord, spec: &WindowSpec) -> Result<Vec<f64>, PipelineError> {
    let mut row = spec
        .input_keys
        .iter()
        .map(|k| numeric(record, k))
        .collect::<Result<Vec<_>, _>>()?;
    if spec.include_validity_mask {
        for key in &spec.input_keys {
            let valid = record.get(key).is_some_and(|c| c.valid);
            row.push(if valid { 1.0 } else { 0.0 });
        }
    }
    Ok(row)
}

fn numeric(record: &AlignedRecord, key: &str) -> Result<f64, PipelineError> {
    let cell = record
        .get(key)
        .ok_or_else(|| PipelineError::MissingInputKey(key.to_string()))?;
    cell.value
        .as_f64()
        .ok_or_else(|| PipelineError::NonNumericField(key.to_string()))
}
