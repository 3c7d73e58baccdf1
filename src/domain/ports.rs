use crate::domain::market::{DateRange, Interval, RawObservation};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Baseline indicators a caller wants attached to fetched bars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndicatorRequest {
    pub sma: bool,
    pub rsi: bool,
    pub ema: bool,
}

impl IndicatorRequest {
    pub fn all() -> Self {
        Self {
            sma: true,
            rsi: true,
            ema: true,
        }
    }

    pub fn any(&self) -> bool {
        self.sma || self.rsi || self.ema
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub tickers: Vec<String>,
    pub range: DateRange,
    pub interval: Interval,
    #[serde(default)]
    pub indicators: IndicatorRequest,
}

/// Source of historical bars. Results are ascending by date per ticker.
#[async_trait]
pub trait HistoricalDataSource: Send + Sync {
    async fn fetch(&self, query: &HistoryQuery) -> Result<Vec<RawObservation>>;
}

/// Persisted model in two separately addressable parts
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    /// JSON description of the topology
    pub topology: String,
    /// Little-endian f32 weights in topology order
    pub weights: Vec<u8>,
}

/// Storage for trained models keyed by task name
#[async_trait]
pub trait ModelArtifactStore: Send + Sync {
    /// Saves the artifact and returns a reference to it
    async fn save(&self, name: &str, artifact: &ModelArtifact) -> Result<String>;

    async fn load(&self, name: &str) -> Result<Option<ModelArtifact>>;
}
