#![allow(dead_code)]

use chrono::{Days, NaiveDate};
use factorlab::application::worker::{JobSettings, WorkerContext};
use factorlab::domain::market::{DateRange, Interval, RawObservation};
use factorlab::domain::task::{ModelKind, OutputKind, TrainingTask};
use factorlab::infrastructure::{
    InMemoryFactorRepository, InMemoryModelArtifactStore, InMemoryObservationSource,
    InMemoryTaskRepository,
};
use std::sync::Arc;

pub fn day(n: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Days::new(n)
}

pub fn bar(ticker: &str, n: u64, close: f64) -> RawObservation {
    RawObservation::new(ticker, day(n), close, close + 1.0, close - 1.0, close, 1_000.0)
}

/// Consecutive daily bars following `closes`
pub fn series(ticker: &str, closes: &[f64]) -> Vec<RawObservation> {
    closes
        .iter()
        .enumerate()
        .map(|(i, c)| bar(ticker, i as u64, *c))
        .collect()
}

/// A zig-zag close path long enough to train on
pub fn wave(ticker: &str, len: usize, base: f64) -> Vec<RawObservation> {
    let closes: Vec<f64> = (0..len)
        .map(|i| base + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1)
        .collect();
    series(ticker, &closes)
}

pub fn two_ticker_task(name: &str, window_length: usize) -> TrainingTask {
    TrainingTask {
        id: None,
        name: name.into(),
        description: String::new(),
        tickers: vec!["A".into(), "B".into()],
        interval: Interval::Daily,
        date_range: DateRange::new(day(0), day(365)).unwrap(),
        factor_ids: vec![],
        primary_ticker: "A".into(),
        primary_key: "date".into(),
        reserved_keys: vec!["A_close".into(), "B_close".into()],
        model_kind: ModelKind::ClassicLstm,
        window_length,
        input_keys: vec!["A_close".into(), "B_close".into()],
        output_key: Some("A_close".into()),
        output_kind: Some(OutputKind::ProbabilityTrend),
        epochs: 2,
        batch_size: 8,
        finished: false,
        artifact_ref: None,
    }
}

pub struct Ports {
    pub source: Arc<InMemoryObservationSource>,
    pub factors: Arc<InMemoryFactorRepository>,
    pub tasks: Arc<InMemoryTaskRepository>,
    pub artifacts: Arc<InMemoryModelArtifactStore>,
}

impl Ports {
    pub fn with_bars(bars: Vec<RawObservation>) -> Self {
        Self {
            source: Arc::new(InMemoryObservationSource::with_bars(bars)),
            factors: Arc::new(InMemoryFactorRepository::new()),
            tasks: Arc::new(InMemoryTaskRepository::new()),
            artifacts: Arc::new(InMemoryModelArtifactStore::new()),
        }
    }

    pub fn context(&self) -> WorkerContext {
        WorkerContext {
            source: self.source.clone(),
            factors: self.factors.clone(),
            tasks: self.tasks.clone(),
            artifacts: self.artifacts.clone(),
            settings: JobSettings::default(),
        }
    }
}
