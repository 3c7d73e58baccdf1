//! Task and factor definitions loaded from TOML files.
//!
//! ```toml
//! [[factors]]
//! name = "range"
//! transform = "$f_range = high - low"
//!
//! [[tasks]]
//! name = "ndx-trend"
//! tickers = ["NDX", "SPX"]
//! dateRange = { start = "2020-01-01", end = "2023-12-31" }
//! primaryTicker = "NDX"
//! primaryKey = "date"
//! reservedKeys = ["NDX_close", "SPX_close"]
//! windowLength = 20
//! inputKeys = ["NDX_close", "SPX_close"]
//! outputKey = "NDX_close"
//! outputKind = "probabilityTrendPredict"
//! epochs = 10
//! batchSize = 32
//! ```

use crate::domain::factor::NewFactor;
use crate::domain::task::TrainingTask;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Definitions {
    #[serde(default)]
    pub factors: Vec<NewFactor>,
    #[serde(default)]
    pub tasks: Vec<TrainingTask>,
}

impl Definitions {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid definitions file")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        Self::parse(&text).with_context(|| format!("In {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::{ModelKind, OutputKind};

    #[test]
    fn test_parse_definitions() {
        let defs = Definitions::parse(
            r#"
            [[factors]]
            name = "range"
            transform = "$f_range = high - low"
            chartHint = "bar"

            [[tasks]]
            name = "ndx-trend"
            tickers = ["NDX", "SPX"]
            dateRange = { start = "2020-01-01", end = "2023-12-31" }
            primaryTicker = "NDX"
            primaryKey = "date"
            reservedKeys = ["NDX_close", "SPX_close"]
            modelKind = "classic_dense"
            windowLength = 20
            inputKeys = ["NDX_close", "SPX_close"]
            outputKey = "NDX_close"
            outputKind = "probabilityTrendPredict"
            epochs = 10
            batchSize = 32
            "#,
        )
        .unwrap();

        assert_eq!(defs.factors.len(), 1);
        let task = &defs.tasks[0];
        assert_eq!(task.model_kind, ModelKind::ClassicDense);
        assert_eq!(task.output_kind, Some(OutputKind::ProbabilityTrend));
        assert!(task.validate().is_ok());
    }
}
