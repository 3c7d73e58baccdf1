use crate::application::ml::{Adam, SequenceClassifier};
use crate::domain::dataset::{Direction, Label, ProgressEvent, WindowedDataset};
use crate::domain::errors::TrainingError;
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

/// Converts labeled windows to model inputs, checking every shape.
pub fn prepare_examples(
    dataset: &WindowedDataset,
    expected: (usize, usize),
) -> Result<Vec<(Array2<f64>, Label)>, TrainingError> {
    if dataset.is_empty() {
        return Err(TrainingError::EmptyDataset);
    }
    let examples = dataset
        .labeled()
        .map(|(window, label)| {
            let found = window.shape();
            if found != expected {
                return Err(TrainingError::ShapeMismatch { expected, found });
            }
            let flat: Vec<f64> = window.features.iter().flatten().copied().collect();
            let input = Array2::from_shape_vec(expected, flat)
                .map_err(|_| TrainingError::ShapeMismatch { expected, found })?;
            Ok((input, *label))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if examples.is_empty() {
        return Err(TrainingError::UnlabeledDataset);
    }
    Ok(examples)
}

/// Runs the epoch loop. One `ProgressEvent` is sent per completed epoch;
/// cancellation is honoured between epochs.
pub fn fit(
    model: &mut dyn SequenceClassifier,
    dataset: &WindowedDataset,
    config: FitConfig,
    progress: &UnboundedSender<ProgressEvent>,
    cancel: &CancellationToken,
) -> Result<Vec<ProgressEvent>, TrainingError> {
    if config.epochs == 0 || config.batch_size == 0 {
        return Err(TrainingError::InvalidConfig(
            "epochs and batch size must be positive".into(),
        ));
    }
    let examples = prepare_examples(dataset, model.input_shape())?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut optimizer = Adam::new(config.learning_rate);
    let mut order: Vec<usize> = (0..examples.len()).collect();
    let mut history = Vec::with_capacity(config.epochs);

    info!(
        "Fitting {:?} on {} examples ({} parameters)",
        model.kind(),
        examples.len(),
        model.parameter_count()
    );

    for epoch in 1..=config.epochs {
        if cancel.is_cancelled() {
            return Err(TrainingError::Cancelled {
                completed_epochs: epoch - 1,
            });
        }
        order.shuffle(&mut rng);

        let mut loss_sum = 0.0;
        let mut correct = 0usize;
        for batch in order.chunks(config.batch_size) {
            model.zero_grad();
            for &idx in batch {
                let (input, label) = &examples[idx];
                let (loss, p) = model.accumulate(input, label, &mut rng);
                loss_sum += loss;
                if Direction::from_probabilities(&p) == Direction::from_label(label) {
                    correct += 1;
                }
            }
            let scale = 1.0 / batch.len() as f64;
            let mut params = model.params_mut();
            for p in params.iter_mut() {
                p.grad *= scale;
            }
            optimizer.update(&mut params);
        }

        let event = ProgressEvent {
            epoch,
            loss: loss_sum / examples.len() as f64,
            accuracy: correct as f64 / examples.len() as f64,
        };
        if !event.loss.is_finite() {
            return Err(TrainingError::NonFiniteLoss { epoch });
        }
        debug!(
            "Epoch {}: loss={:.5} acc={:.3}",
            event.epoch, event.loss, event.accuracy
        );
        // A dropped receiver only means nobody is watching
        let _ = progress.send(event);
        history.push(event);
    }

    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ml::build_classifier;
    use crate::domain::dataset::Window;
    use crate::domain::task::ModelKind;
    use tokio::sync::mpsc;

    /// Rising windows are labeled up, falling ones down.
    fn separable(n: usize) -> WindowedDataset {
        let windows = (0..n)
            .map(|i| {
                let up = i % 2 == 0;
                let features = (0..3)
                    .map(|t| {
                        let v = if up { t as f64 / 2.0 } else { 1.0 - t as f64 / 2.0 };
                        vec![v, 1.0 - v]
                    })
                    .collect();
                let label = if up { [0.0, 1.0] } else { [1.0, 0.0] };
                Window {
                    features,
                    label: Some(label),
                }
            })
            .collect();
        WindowedDataset {
            windows,
            ..Default::default()
        }
    }

    fn config(epochs: usize) -> FitConfig {
        FitConfig {
            epochs,
            batch_size: 4,
            learning_rate: 0.01,
            seed: 42,
        }
    }

    #[test]
    fn test_progress_per_epoch_and_loss_decreases() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut model = build_classifier(ModelKind::ClassicDense, (3, 2), &mut rng);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let history = fit(
            model.as_mut(),
            &separable(16),
            config(30),
            &tx,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(history.len(), 30);
        let mut epochs = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            epochs.push(ev.epoch);
        }
        assert_eq!(epochs, (1..=30).collect::<Vec<_>>());
        assert!(history[29].loss < history[0].loss);
    }

    #[test]
    fn test_cancelled_before_first_epoch() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut model = build_classifier(ModelKind::ClassicLstm, (3, 2), &mut rng);
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = fit(model.as_mut(), &separable(4), config(5), &tx, &cancel).unwrap_err();
        assert_eq!(err, TrainingError::Cancelled { completed_epochs: 0 });
    }

    #[test]
    fn test_non_finite_inputs_fail_instead_of_reporting_nan() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut model = build_classifier(ModelKind::ClassicLstm, (3, 2), &mut rng);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut poisoned = separable(4);
        poisoned.windows[0].features[1][0] = f64::NAN;

        let err = fit(
            model.as_mut(),
            &poisoned,
            config(3),
            &tx,
            &CancellationToken::new(),
        )
        .unwrap_err();
        assert_eq!(err, TrainingError::NonFiniteLoss { epoch: 1 });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_rejects_unlabeled_and_mismatched() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut model = build_classifier(ModelKind::ClassicLstm, (3, 2), &mut rng);
        let (tx, _rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let mut unlabeled = separable(2);
        unlabeled.windows.iter_mut().for_each(|w| w.label = None);
        assert_eq!(
            fit(model.as_mut(), &unlabeled, config(1), &tx, &token).unwrap_err(),
            TrainingError::UnlabeledDataset
        );

        let mut other = build_classifier(ModelKind::ClassicLstm, (4, 2), &mut rng);
        assert!(matches!(
            fit(other.as_mut(), &separable(2), config(1), &tx, &token).unwrap_err(),
            TrainingError::ShapeMismatch { .. }
        ));

        assert_eq!(
            fit(model.as_mut(), &WindowedDataset::default(), config(1), &tx, &token).unwrap_err(),
            TrainingError::EmptyDataset
        );
    }
}
