mod common;

use common::{Ports, day, series, two_ticker_task};
use factorlab::application::backtest::BacktestEngine;
use factorlab::application::ml::{build_classifier, to_artifact};
use factorlab::application::pipeline::{DatasetBuilder, FactorEvaluator};
use factorlab::domain::errors::BacktestError;
use factorlab::domain::market::DateRange;
use factorlab::domain::ports::ModelArtifactStore;
use factorlab::domain::task::TrainingTask;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;

const W: usize = 3;

async fn engine_with_model(ports: &Ports, task: &TrainingTask) -> BacktestEngine {
    let mut rng = StdRng::seed_from_u64(3);
    let model = build_classifier(task.model_kind, (W, task.input_keys.len()), &mut rng);
    let artifact = to_artifact(model.as_ref()).unwrap();
    ports.artifacts.save(&task.name, &artifact).await.unwrap();

    let builder = Arc::new(DatasetBuilder::new(
        ports.source.clone(),
        FactorEvaluator::new(ports.factors.clone()),
    ));
    BacktestEngine::new(builder, ports.artifacts.clone(), 10_000.0)
}

fn bars(len: usize) -> Vec<factorlab::domain::market::RawObservation> {
    let a: Vec<f64> = (0..len).map(|i| 100.0 + i as f64).collect();
    let b: Vec<f64> = (0..len).map(|i| 50.0 - i as f64 * 0.5).collect();
    let mut out = series("A", &a);
    out.extend(series("B", &b));
    out
}

#[tokio::test]
async fn test_exactly_window_length_records_is_rejected() {
    let ports = Ports::with_bars(bars(W));
    let task = two_ticker_task("short", W);
    let engine = engine_with_model(&ports, &task).await;

    let err = engine
        .backtest(&task, DateRange::new(day(0), day(30)).unwrap())
        .await
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<BacktestError>(),
        Some(&BacktestError::RangeShorterThanWindow {
            records: W,
            window_length: W,
        })
    );
}

#[tokio::test]
async fn test_one_more_record_yields_one_step() {
    let ports = Ports::with_bars(bars(W + 1));
    let task = two_ticker_task("one-step", W);
    let engine = engine_with_model(&ports, &task).await;

    let report = engine
        .backtest(&task, DateRange::new(day(0), day(30)).unwrap())
        .await
        .unwrap();
    assert_eq!(report.steps, 1);
    assert_eq!(report.compare.real.len(), 1);
    assert_eq!(report.compare.predicted.len(), 1);
    // A rises every day, so the realized label is up
    assert_eq!(report.compare.real[0], [0.0, 1.0]);
    assert_eq!(report.baseline_rate, 1.0);
    assert_eq!(report.curves.always_buy.len(), 1);
    assert_eq!(report.curves.always_buy[0].date, day(W as u64));
    assert!((report.curves.oracle[0].balance - 10_000.0 * (1.0 + 1.0 / 102.0)).abs() < 1e-6);
}

#[tokio::test]
async fn test_missing_model_is_named() {
    let ports = Ports::with_bars(bars(10));
    let task = two_ticker_task("untrained", W);
    let builder = Arc::new(DatasetBuilder::new(
        ports.source.clone(),
        FactorEvaluator::new(ports.factors.clone()),
    ));
    let engine = BacktestEngine::new(builder, ports.artifacts.clone(), 10_000.0);

    let err = engine.backtest(&task, task.date_range).await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<BacktestError>(),
        Some(&BacktestError::ModelNotFound("untrained".into()))
    );
}

#[tokio::test]
async fn test_predict_current_scores_latest_window() {
    let ports = Ports::with_bars(bars(8));
    let task = two_ticker_task("live", W);
    let engine = engine_with_model(&ports, &task).await;

    let prediction = engine
        .predict_current(&task, task.date_range)
        .await
        .unwrap();
    assert_eq!(prediction.as_of, day(7));
    assert!((prediction.probabilities[0] + prediction.probabilities[1] - 1.0).abs() < 1e-9);
}
