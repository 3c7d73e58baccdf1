use crate::domain::errors::PipelineError;
use crate::domain::market::{DateRange, Interval};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Model topology a task trains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ModelKind {
    #[default]
    #[serde(rename = "classic_lstm")]
    ClassicLstm,
    #[serde(rename = "classic_dense")]
    ClassicDense,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::ClassicLstm => "classic_lstm",
            ModelKind::ClassicDense => "classic_dense",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "classic_lstm" | "lstm" => Ok(ModelKind::ClassicLstm),
            "classic_dense" | "dense" => Ok(ModelKind::ClassicDense),
            _ => anyhow::bail!("Unknown model kind: {}", s),
        }
    }
}

/// What the label of a window encodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputKind {
    #[serde(rename = "probabilityTrendPredict")]
    ProbabilityTrend,
}

/// A user-defined training job definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingTask {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub tickers: Vec<String>,
    #[serde(default)]
    pub interval: Interval,
    pub date_range: DateRange,
    #[serde(default)]
    pub factor_ids: Vec<i64>,
    pub primary_ticker: String,
    pub primary_key: String,
    pub reserved_keys: Vec<String>,
    #[serde(default)]
    pub model_kind: ModelKind,
    pub window_length: usize,
    pub input_keys: Vec<String>,
    #[serde(default)]
    pub output_key: Option<String>,
    #[serde(default)]
    pub output_kind: Option<OutputKind>,
    pub epochs: usize,
    pub batch_size: usize,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub artifact_ref: Option<String>,
}

impl TrainingTask {
    /// Structural checks that do not need any data.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidTask(msg));

        if self.name.trim().is_empty() {
            return invalid("name must not be empty".into());
        }
        if self.tickers.is_empty() {
            return invalid("at least one ticker is required".into());
        }
        if !self.tickers.contains(&self.primary_ticker) {
            return invalid(format!(
                "primary ticker '{}' is not among the task tickers",
                self.primary_ticker
            ));
        }
        if self.window_length == 0 {
            return Err(PipelineError::WindowLengthZero);
        }
        if self.input_keys.is_empty() {
            return invalid("input keys must not be empty".into());
        }
        if let Some(missing) = self
            .input_keys
            .iter()
            .find(|k| !self.reserved_keys.contains(k))
        {
            return Err(PipelineError::MissingInputKey(missing.clone()));
        }
        if self.output_kind.is_some() {
            match &self.output_key {
                None => return Err(PipelineError::MissingOutputKey),
                Some(key) if !self.reserved_keys.contains(key) => {
                    return Err(PipelineError::MissingInputKey(key.clone()));
                }
                Some(_) => {}
            }
        }
        if self.epochs == 0 || self.batch_size == 0 {
            return invalid("epochs and batch size must be positive".into());
        }
        Ok(())
    }

    pub fn is_labeled(&self) -> bool {
        self.output_kind.is_some() && self.output_key.is_some()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::task;
    use super::*;

    #[test]
    fn test_valid_task() {
        assert!(task().validate().is_ok());
        assert!(task().is_labeled());
    }

    #[test]
    fn test_rejects_zero_window() {
        let mut t = task();
        t.window_length = 0;
        assert_eq!(t.validate().unwrap_err(), PipelineError::WindowLengthZero);
    }

    #[test]
    fn test_input_keys_must_be_reserved() {
        let mut t = task();
        t.input_keys.push("B_volume".into());
        assert_eq!(
            t.validate().unwrap_err(),
            PipelineError::MissingInputKey("B_volume".into())
        );
    }

    #[test]
    fn test_output_kind_requires_key() {
        let mut t = task();
        t.output_key = None;
        assert_eq!(t.validate().unwrap_err(), PipelineError::MissingOutputKey);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_value(task()).unwrap();
        assert_eq!(json["modelKind"], "classic_lstm");
        assert_eq!(json["outputKind"], "probabilityTrendPredict");
        assert_eq!(json["windowLength"], 3);
        let back: TrainingTask = serde_json::from_value(json).unwrap();
        assert_eq!(back, task());
    }
}
