pub mod eval;
pub mod program;

pub use eval::{SeriesTransform, validate_output};
pub use program::FactorProgram;

use crate::domain::errors::FactorError;
use crate::domain::market::RawObservation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a factor's output is meant to be charted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChartHint {
    #[default]
    Line,
    Bar,
    Scatter,
}

impl std::str::FromStr for ChartHint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "line" => Ok(ChartHint::Line),
            "bar" => Ok(ChartHint::Bar),
            "scatter" => Ok(ChartHint::Scatter),
            _ => anyhow::bail!("Invalid chart hint: {}", s),
        }
    }
}

impl std::fmt::Display for ChartHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ChartHint::Line => "line",
            ChartHint::Bar => "bar",
            ChartHint::Scatter => "scatter",
        })
    }
}

/// A stored, user-authored factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Factor {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Source text of the factor program
    pub transform: String,
    #[serde(default)]
    pub chart_hint: ChartHint,
    pub created_at: DateTime<Utc>,
}

impl Factor {
    pub fn compile(&self) -> Result<FactorProgram, FactorError> {
        FactorProgram::parse(&self.transform)
    }
}

/// Payload for creating or updating a factor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFactor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub transform: String,
    #[serde(default)]
    pub chart_hint: ChartHint,
}

/// Runs `program` over `sample` and checks the output contract.
/// Returns the keys the program adds on success.
pub fn validate_factor(
    program: &FactorProgram,
    sample: &[RawObservation],
) -> Result<Vec<String>, FactorError> {
    if sample.is_empty() {
        return Err(FactorError::EmptySample);
    }
    let output = program.transform(sample)?;
    validate_output(sample, &output)?;

    let before = sample[0].field_names();
    Ok(output[0]
        .field_names()
        .into_iter()
        .filter(|k| !before.contains(k))
        .collect())
}
