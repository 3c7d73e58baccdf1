use super::aligner::align;
use super::factor_evaluator::FactorEvaluator;
use super::windower::{WindowSpec, window};
use crate::domain::dataset::{AlignedRecord, PricePoint, WindowedDataset};
use crate::domain::market::{DateRange, RawObservation};
use crate::domain::ports::{HistoricalDataSource, HistoryQuery, IndicatorRequest};
use crate::domain::task::TrainingTask;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Aligned records for a task plus the primary ticker's close series
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedData {
    pub records: Vec<AlignedRecord>,
    /// Primary-ticker bars in backbone order, one per record
    pub prices: Vec<PricePoint>,
}

impl GeneratedData {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Fetch, evaluate factors, align. Shared by training, backtest and prediction.
pub struct DatasetBuilder {
    source: Arc<dyn HistoricalDataSource>,
    evaluator: FactorEvaluator,
    include_validity_mask: bool,
}

impl DatasetBuilder {
    pub fn new(source: Arc<dyn HistoricalDataSource>, evaluator: FactorEvaluator) -> Self {
        Self {
            source,
            evaluator,
            include_validity_mask: false,
        }
    }

    pub fn with_validity_mask(mut self, enabled: bool) -> Self {
        self.include_validity_mask = enabled;
        self
    }

    pub fn window_spec(&self, task: &TrainingTask) -> WindowSpec {
        WindowSpec {
            window_length: task.window_length,
            input_keys: task.input_keys.clone(),
            output_key: task.output_key.clone(),
            output_kind: task.output_kind,
            include_validity_mask: self.include_validity_mask,
        }
    }

    /// Builds aligned records for `task` over `range`.
    pub async fn generate(&self, task: &TrainingTask, range: DateRange) -> Result<GeneratedData> {
        let query = HistoryQuery {
            tickers: task.tickers.clone(),
            range,
            interval: task.interval,
            indicators: IndicatorRequest::all(),
        };
        let raw = self
            .source
            .fetch(&query)
            .await
            .with_context(|| format!("Failed to fetch history for task {}", task.name))?;
        debug!("Fetched {} raw records for {}", raw.len(), task.name);

        let mut evaluated = Vec::with_capacity(raw.len());
        for ticker in &task.tickers {
            let series: Vec<RawObservation> =
                raw.iter().filter(|r| &r.ticker == ticker).cloned().collect();
            if series.is_empty() {
                continue;
            }
            evaluated.extend(self.evaluator.apply(&task.factor_ids, &series).await?);
        }

        let prices: Vec<PricePoint> = evaluated
            .iter()
            .filter(|r| r.ticker == task.primary_ticker)
            .map(|r| PricePoint {
                date: r.date,
                close: r.close,
            })
            .collect();
        let records = align(
            &evaluated,
            &task.primary_ticker,
            &task.primary_key,
            &task.reserved_keys,
        );

        info!(
            "Generated {} aligned records for task {} ({})",
            records.len(),
            task.name,
            range
        );
        Ok(GeneratedData { records, prices })
    }

    /// Windows previously generated records with the task's settings.
    pub fn windows(&self, task: &TrainingTask, data: &GeneratedData) -> Result<WindowedDataset> {
        window(&data.records, &self.window_spec(task))
            .with_context(|| format!("Failed to window data for task {}", task.name))
    }
}
