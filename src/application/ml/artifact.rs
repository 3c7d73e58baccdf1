use super::dense::DenseClassifier;
use super::lstm::LstmClassifier;
use super::predictor::SequenceClassifier;
use crate::domain::errors::TrainingError;
use crate::domain::ports::ModelArtifact;
use crate::domain::task::ModelKind;
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

pub const ARTIFACT_FORMAT: &str = "factorlab-sequential/1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSpec {
    pub name: String,
    pub shape: [usize; 2],
    pub dtype: String,
}

/// JSON half of a model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    pub format: String,
    pub kind: ModelKind,
    pub input_shape: [usize; 2],
    /// Hidden layer widths in layer order
    pub units: Vec<usize>,
    pub dropout: f64,
    pub weights: Vec<WeightSpec>,
}

/// Builds a freshly initialised classifier for `kind`.
pub fn build_classifier(
    kind: ModelKind,
    input_shape: (usize, usize),
    rng: &mut StdRng,
) -> Box<dyn SequenceClassifier> {
    build_with_units(kind, input_shape, &[], super::DROPOUT_RATE, rng)
}

fn build_with_units(
    kind: ModelKind,
    input_shape: (usize, usize),
    units: &[usize],
    dropout: f64,
    rng: &mut StdRng,
) -> Box<dyn SequenceClassifier> {
    let unit = |i: usize, fallback: usize| units.get(i).copied().unwrap_or(fallback);
    match kind {
        ModelKind::ClassicLstm => Box::new(LstmClassifier::new(
            input_shape,
            unit(0, super::lstm::LSTM_UNITS),
            dropout,
            rng,
        )),
        ModelKind::ClassicDense => Box::new(DenseClassifier::new(
            input_shape,
            unit(0, super::dense::DENSE_HIDDEN),
            unit(1, super::dense::DENSE_PROJECTION),
            dropout,
            rng,
        )),
    }
}

/// Serializes topology and weights. Weights are little-endian f32 in
/// parameter order.
pub fn to_artifact(model: &dyn SequenceClassifier) -> Result<ModelArtifact, TrainingError> {
    let params = model.params();
    let (steps, features) = model.input_shape();
    let topology = Topology {
        format: ARTIFACT_FORMAT.to_string(),
        kind: model.kind(),
        input_shape: [steps, features],
        units: model.hidden_units(),
        dropout: model.dropout_rate(),
        weights: params
            .iter()
            .map(|p| {
                let (r, c) = p.shape();
                WeightSpec {
                    name: p.name.clone(),
                    shape: [r, c],
                    dtype: "float32".to_string(),
                }
            })
            .collect(),
    };

    let mut weights = Vec::with_capacity(model.parameter_count() * 4);
    for p in params {
        for v in p.value.iter() {
            weights.extend_from_slice(&(*v as f32).to_le_bytes());
        }
    }

    let topology = serde_json::to_string(&topology)
        .map_err(|e| TrainingError::CorruptArtifact(e.to_string()))?;
    Ok(ModelArtifact { topology, weights })
}

/// Rebuilds a classifier from an artifact, checking every weight shape.
pub fn restore(artifact: &ModelArtifact) -> Result<Box<dyn SequenceClassifier>, TrainingError> {
    let topology: Topology = serde_json::from_str(&artifact.topology)
        .map_err(|e| TrainingError::CorruptArtifact(format!("invalid topology: {}", e)))?;
    if topology.format != ARTIFACT_FORMAT {
        return Err(TrainingError::CorruptArtifact(format!(
            "unsupported format '{}'",
            topology.format
        )));
    }

    let shape = (topology.input_shape[0], topology.input_shape[1]);
    let mut rng = StdRng::seed_from_u64(0);
    let mut model = build_with_units(topology.kind, shape, &topology.units, topology.dropout, &mut rng);

    let expected_len: usize = topology
        .weights
        .iter()
        .map(|w| w.shape[0] * w.shape[1] * 4)
        .sum();
    if artifact.weights.len() != expected_len {
        return Err(TrainingError::CorruptArtifact(format!(
            "expected {} weight bytes, found {}",
            expected_len,
            artifact.weights.len()
        )));
    }

    let mut offset = 0;
    let mut params = model.params_mut();
    if params.len() != topology.weights.len() {
        return Err(TrainingError::CorruptArtifact(format!(
            "expected {} weight tensors, found {}",
            params.len(),
            topology.weights.len()
        )));
    }
    for (param, spec) in params.iter_mut().zip(&topology.weights) {
        let shape = (spec.shape[0], spec.shape[1]);
        if param.shape() != shape || param.name != spec.name {
            return Err(TrainingError::CorruptArtifact(format!(
                "weight '{}' has shape {:?}, model expects '{}' {:?}",
                spec.name,
                shape,
                param.name,
                param.shape()
            )));
        }
        let count = shape.0 * shape.1;
        let values: Vec<f64> = artifact.weights[offset..offset + count * 4]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect();
        param.value = Array2::from_shape_vec(shape, values)
            .map_err(|e| TrainingError::CorruptArtifact(e.to_string()))?;
        offset += count * 4;
    }
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_reproduces_predictions() {
        let mut rng = StdRng::seed_from_u64(9);
        for kind in [ModelKind::ClassicLstm, ModelKind::ClassicDense] {
            let model = build_classifier(kind, (3, 2), &mut rng);
            let artifact = to_artifact(model.as_ref()).unwrap();
            assert_eq!(artifact.weights.len(), model.parameter_count() * 4);

            let restored = restore(&artifact).unwrap();
            let x = Array2::from_elem((3, 2), 0.25);
            let (a, b) = (model.predict(&x), restored.predict(&x));
            assert!((a[0] - b[0]).abs() < 1e-5);
            assert_eq!(restored.kind(), kind);
        }
    }

    #[test]
    fn test_truncated_weights_are_rejected() {
        let mut rng = StdRng::seed_from_u64(9);
        let model = build_classifier(ModelKind::ClassicDense, (2, 2), &mut rng);
        let mut artifact = to_artifact(model.as_ref()).unwrap();
        artifact.weights.truncate(8);
        assert!(matches!(
            restore(&artifact),
            Err(TrainingError::CorruptArtifact(_))
        ));
    }
}
