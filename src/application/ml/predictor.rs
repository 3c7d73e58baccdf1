use super::params::Param;
use crate::domain::dataset::Label;
use crate::domain::task::ModelKind;
use ndarray::Array2;
use rand::rngs::StdRng;

/// Two-class sequence classifier over a `(steps, features)` window
pub trait SequenceClassifier: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// `(steps, features)` the model was built for
    fn input_shape(&self) -> (usize, usize);

    /// Hidden layer widths in layer order
    fn hidden_units(&self) -> Vec<usize>;

    fn dropout_rate(&self) -> f64;

    /// Inference pass, dropout disabled. Returns `[p_down_or_flat, p_up]`.
    fn predict(&self, input: &Array2<f64>) -> [f64; 2];

    /// Training pass for one example. Adds this example's gradients to every
    /// parameter and returns its loss and predicted probabilities.
    fn accumulate(&mut self, input: &Array2<f64>, label: &Label, rng: &mut StdRng) -> (f64, [f64; 2]);

    /// Parameters in serialization order
    fn params(&self) -> Vec<&Param>;

    fn params_mut(&mut self) -> Vec<&mut Param>;

    fn zero_grad(&mut self) {
        for p in self.params_mut() {
            p.zero_grad();
        }
    }

    fn parameter_count(&self) -> usize {
        self.params().iter().map(|p| p.value.len()).sum()
    }
}
