use super::simulation::{BacktestReport, StepChange, simulate};
use crate::application::ml::{SequenceClassifier, restore};
use crate::application::pipeline::{DatasetBuilder, window};
use crate::domain::dataset::{CompareResult, Direction, Window};
use crate::domain::errors::{BacktestError, TrainingError};
use crate::domain::market::DateRange;
use crate::domain::ports::ModelArtifactStore;
use crate::domain::task::TrainingTask;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Up/down probabilities for the bar after the latest available window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPrediction {
    pub task_name: String,
    /// Date of the last record in the scored window
    pub as_of: NaiveDate,
    pub probabilities: [f64; 2],
    pub direction: Direction,
}

pub struct BacktestEngine {
    builder: Arc<DatasetBuilder>,
    artifacts: Arc<dyn ModelArtifactStore>,
    initial_balance: f64,
}

impl BacktestEngine {
    pub fn new(
        builder: Arc<DatasetBuilder>,
        artifacts: Arc<dyn ModelArtifactStore>,
        initial_balance: f64,
    ) -> Self {
        Self {
            builder,
            artifacts,
            initial_balance,
        }
    }

    async fn load_model(&self, task: &TrainingTask) -> Result<Box<dyn SequenceClassifier>> {
        let artifact = self
            .artifacts
            .load(&task.name)
            .await
            .with_context(|| format!("Failed to load model for task {}", task.name))?
            .ok_or_else(|| BacktestError::ModelNotFound(task.name.clone()))?;
        Ok(restore(&artifact)?)
    }

    /// Replays the task's model over `range`.
    pub async fn backtest(&self, task: &TrainingTask, range: DateRange) -> Result<BacktestReport> {
        let w = task.window_length;
        let data = self.builder.generate(task, range).await?;
        if data.len() <= w {
            return Err(BacktestError::RangeShorterThanWindow {
                records: data.len(),
                window_length: w,
            }
            .into());
        }

        let dataset = self.builder.windows(task, &data)?;
        let model = self.load_model(task).await?;
        let windows = dataset.windows;
        let prices = data.prices;
        let initial_balance = self.initial_balance;

        let report = tokio::task::spawn_blocking(move || -> Result<BacktestReport> {
            let predicted = infer(model.as_ref(), &windows)?;

            let steps: Vec<StepChange> = (0..windows.len())
                .map(|k| {
                    let next = prices[k + w];
                    let prev = prices[k + w - 1].close;
                    let change = if prev == 0.0 {
                        0.0
                    } else {
                        (next.close - prev) / prev
                    };
                    StepChange {
                        date: next.date,
                        change,
                    }
                })
                .collect();

            let real = windows
                .iter()
                .enumerate()
                .map(|(k, win)| {
                    win.label.unwrap_or_else(|| {
                        Direction::label(prices[k + w - 1].close, prices[k + w].close).one_hot()
                    })
                })
                .collect();

            Ok(simulate(CompareResult { real, predicted }, &steps, initial_balance)?)
        })
        .await
        .context("Backtest worker panicked")??;

        let (buy, predicted, oracle) = report.final_balances();
        info!(
            "Backtest {} over {}: {} steps, accuracy {:.3} (baseline {:.3}), balances buy={:.2} predicted={:.2} oracle={:.2}",
            task.name,
            range,
            report.steps,
            report.accuracy_rate,
            report.baseline_rate,
            buy,
            predicted,
            oracle
        );
        Ok(report)
    }

    /// Scores the most recent `window_length` records in `range`.
    pub async fn predict_current(
        &self,
        task: &TrainingTask,
        range: DateRange,
    ) -> Result<CurrentPrediction> {
        let w = task.window_length;
        let data = self.builder.generate(task, range).await?;
        if data.len() < w || w == 0 {
            return Err(BacktestError::RangeShorterThanWindow {
                records: data.len(),
                window_length: w,
            }
            .into());
        }

        let tail = &data.records[data.len() - w..];
        let mut spec = self.builder.window_spec(task);
        spec.output_kind = None;
        let dataset = window(tail, &spec)?;
        let model = self.load_model(task).await?;
        let probabilities = infer(model.as_ref(), &dataset.windows)?
            .first()
            .copied()
            .ok_or(TrainingError::EmptyDataset)?;

        let as_of = data
            .prices
            .last()
            .map(|p| p.date)
            .unwrap_or(range.end);
        Ok(CurrentPrediction {
            task_name: task.name.clone(),
            as_of,
            probabilities,
            direction: Direction::from_probabilities(&probabilities),
        })
    }
}

/// Window-by-window inference, parallel across windows.
pub fn infer(
    model: &dyn SequenceClassifier,
    windows: &[Window],
) -> Result<Vec<[f64; 2]>, TrainingError> {
    let expected = model.input_shape();
    windows
        .par_iter()
        .map(|win| {
            let found = win.shape();
            if found != expected {
                return Err(TrainingError::ShapeMismatch { expected, found });
            }
            let flat: Vec<f64> = win.features.iter().flatten().copied().collect();
            let input = Array2::from_shape_vec(expected, flat)
                .map_err(|_| TrainingError::ShapeMismatch { expected, found })?;
            Ok(model.predict(&input))
        })
        .collect()
}
