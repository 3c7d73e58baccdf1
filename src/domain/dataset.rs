use crate::domain::market::FieldValue;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A merged cell. `valid == false` marks a zero-filled value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedValue {
    pub value: FieldValue,
    pub valid: bool,
}

impl AlignedValue {
    pub fn present(value: FieldValue) -> Self {
        Self { value, valid: true }
    }

    pub fn filled() -> Self {
        Self {
            value: FieldValue::zero(),
            valid: false,
        }
    }
}

/// One row of the merged multi-ticker stream
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlignedRecord {
    pub fields: BTreeMap<String, AlignedValue>,
}

impl AlignedRecord {
    pub fn get(&self, key: &str) -> Option<&AlignedValue> {
        self.fields.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn is_fully_valid(&self) -> bool {
        self.fields.values().all(|v| v.valid)
    }
}

/// Two-class one-hot label: `[down_or_flat, up]`
pub type Label = [f64; 2];

/// Direction of the next step relative to the current one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    DownOrFlat,
    Up,
}

impl Direction {
    /// `current >= next` is down-or-flat.
    pub fn label(current: f64, next: f64) -> Self {
        if current >= next {
            Direction::DownOrFlat
        } else {
            Direction::Up
        }
    }

    pub fn one_hot(&self) -> Label {
        match self {
            Direction::DownOrFlat => [1.0, 0.0],
            Direction::Up => [0.0, 1.0],
        }
    }

    pub fn from_label(label: &Label) -> Self {
        Self::from_probabilities(label)
    }

    /// Argmax of rounded probabilities; ties resolve to down-or-flat.
    pub fn from_probabilities(p: &[f64; 2]) -> Self {
        if p[1].round() > p[0].round() {
            Direction::Up
        } else {
            Direction::DownOrFlat
        }
    }

    pub fn is_up(&self) -> bool {
        *self == Direction::Up
    }
}

/// A `window_length x features` matrix with an optional label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub features: Vec<Vec<f64>>,
    pub label: Option<Label>,
}

impl Window {
    pub fn shape(&self) -> (usize, usize) {
        (
            self.features.len(),
            self.features.first().map_or(0, Vec::len),
        )
    }
}

/// Per-feature min/max fitted over every time step of every window
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Normalizer {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl Normalizer {
    pub fn fit(rows: &[Vec<f64>], width: usize) -> Self {
        let mut min = vec![f64::INFINITY; width];
        let mut max = vec![f64::NEG_INFINITY; width];
        for row in rows {
            for (j, &v) in row.iter().enumerate().take(width) {
                min[j] = min[j].min(v);
                max[j] = max[j].max(v);
            }
        }
        Self { min, max }
    }

    /// Degenerate features (max == min) map to `0.0`.
    pub fn scale(&self, feature: usize, value: f64) -> f64 {
        let (lo, hi) = (self.min[feature], self.max[feature]);
        if hi > lo { (value - lo) / (hi - lo) } else { 0.0 }
    }
}

/// Output of the windowing stage
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WindowedDataset {
    pub windows: Vec<Window>,
    pub feature_names: Vec<String>,
    pub normalizer: Normalizer,
}

impl WindowedDataset {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn is_labeled(&self) -> bool {
        !self.windows.is_empty() && self.windows.iter().all(|w| w.label.is_some())
    }

    pub fn labeled(&self) -> impl Iterator<Item = (&Window, &Label)> {
        self.windows
            .iter()
            .filter_map(|w| w.label.as_ref().map(|l| (w, l)))
    }

    /// `(window_length, feature_count)` of the first window
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.windows.first().map(Window::shape)
    }
}

/// Per-epoch training metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
}

/// Realized labels next to predicted probabilities, one per step
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompareResult {
    pub real: Vec<Label>,
    pub predicted: Vec<[f64; 2]>,
}

/// Primary-ticker bar used for profit simulation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(Direction::label(100.0, 100.0), Direction::DownOrFlat);
        assert_eq!(Direction::label(100.0, 101.0), Direction::Up);
        assert_eq!(Direction::label(100.0, 99.0).one_hot(), [1.0, 0.0]);
        assert_eq!(Direction::Up.one_hot(), [0.0, 1.0]);
    }

    #[test]
    fn test_ties_resolve_down() {
        assert_eq!(
            Direction::from_probabilities(&[0.5, 0.5]),
            Direction::DownOrFlat
        );
        assert_eq!(Direction::from_probabilities(&[0.3, 0.7]), Direction::Up);
        // 0.51 rounds up while 0.49 rounds down
        assert_eq!(Direction::from_probabilities(&[0.49, 0.51]), Direction::Up);
    }

    #[test]
    fn test_normalizer_degenerate_feature() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let n = Normalizer::fit(&rows, 2);
        assert_eq!(n.scale(0, 2.0), 0.5);
        assert_eq!(n.scale(1, 5.0), 0.0);
    }
}
