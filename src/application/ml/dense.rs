//! Time-distributed dense classifier: dense(64, sigmoid) and dense(32, relu)
//! applied to every step, flattened, dropout, dense(2) softmax.

use super::params::{Param, cross_entropy, dropout_mask, outer, relu, sigmoid, softmax2};
use super::predictor::SequenceClassifier;
use crate::domain::dataset::Label;
use crate::domain::task::ModelKind;
use ndarray::{Array1, Array2, Axis, s};
use rand::Rng;
use rand::rngs::StdRng;

pub const DENSE_HIDDEN: usize = 64;
pub const DENSE_PROJECTION: usize = 32;

pub struct DenseClassifier {
    steps: usize,
    features: usize,
    hidden: usize,
    projection: usize,
    dropout: f64,
    w1: Param,
    b1: Param,
    w2: Param,
    b2: Param,
    w3: Param,
    b3: Param,
}

struct Activations {
    a1: Array2<f64>,
    z2: Array2<f64>,
    a2: Array2<f64>,
}

impl DenseClassifier {
    pub fn new<R: Rng + ?Sized>(
        (steps, features): (usize, usize),
        hidden: usize,
        projection: usize,
        dropout: f64,
        rng: &mut R,
    ) -> Self {
        Self {
            steps,
            features,
            hidden,
            projection,
            dropout,
            w1: Param::glorot_normal("dense_1/kernel", features, hidden, rng),
            b1: Param::zeros("dense_1/bias", 1, hidden),
            w2: Param::glorot_normal("dense_2/kernel", hidden, projection, rng),
            b2: Param::zeros("dense_2/bias", 1, projection),
            w3: Param::glorot_normal("dense_3/kernel", steps * projection, 2, rng),
            b3: Param::zeros("dense_3/bias", 1, 2),
        }
    }

    fn hidden_layers(&self, input: &Array2<f64>) -> Activations {
        let a1 = (input.dot(&self.w1.value) + &self.b1.value).mapv(sigmoid);
        let z2 = a1.dot(&self.w2.value) + &self.b2.value;
        let a2 = z2.mapv(relu);
        Activations { a1, z2, a2 }
    }

    /// Output logits from the flattened (optionally masked) projection
    fn logits(&self, flat: &Array2<f64>) -> Array1<f64> {
        let mut z = self.b3.row().to_owned();
        for (t, row) in flat.rows().into_iter().enumerate() {
            let block = self
                .w3
                .value
                .slice(s![t * self.projection..(t + 1) * self.projection, ..]);
            z += &row.dot(&block);
        }
        z
    }
}

impl SequenceClassifier for DenseClassifier {
    fn kind(&self) -> ModelKind {
        ModelKind::ClassicDense
    }

    fn input_shape(&self) -> (usize, usize) {
        (self.steps, self.features)
    }

    fn hidden_units(&self) -> Vec<usize> {
        vec![self.hidden, self.projection]
    }

    fn dropout_rate(&self) -> f64 {
        self.dropout
    }

    fn predict(&self, input: &Array2<f64>) -> [f64; 2] {
        let acts = self.hidden_layers(input);
        softmax2(&self.logits(&acts.a2))
    }

    fn accumulate(&mut self, input: &Array2<f64>, label: &Label, rng: &mut StdRng) -> (f64, [f64; 2]) {
        let acts = self.hidden_layers(input);
        let proj = self.projection;
        let mask = dropout_mask(self.steps * proj, self.dropout, rng);
        let mask = mask
            .into_shape((self.steps, proj))
            .unwrap_or_else(|_| Array2::ones((self.steps, proj)));
        let dropped = &acts.a2 * &mask;
        let p = softmax2(&self.logits(&dropped));
        let loss = cross_entropy(&p, label);

        let dz3 = Array1::from(vec![p[0] - label[0], p[1] - label[1]]);
        let mut d_a2 = Array2::<f64>::zeros((self.steps, proj));
        for t in 0..self.steps {
            let grad = outer(&dropped.row(t), &dz3.view());
            let mut block = self.w3.grad.slice_mut(s![t * proj..(t + 1) * proj, ..]);
            block += &grad;
            let back = self
                .w3
                .value
                .slice(s![t * proj..(t + 1) * proj, ..])
                .dot(&dz3);
            d_a2.row_mut(t).assign(&back);
        }
        self.b3.add_row_grad(&dz3);

        let dz2 = d_a2 * &mask * &acts.z2.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
        self.w2.grad += &acts.a1.t().dot(&dz2);
        self.b2.add_row_grad(&dz2.sum_axis(Axis(0)));

        let dz1 = dz2.dot(&self.w2.value.t()) * &acts.a1.mapv(|v| v * (1.0 - v));
        self.w1.grad += &input.t().dot(&dz1);
        self.b1.add_row_grad(&dz1.sum_axis(Axis(0)));

        (loss, p)
    }

    fn params(&self) -> Vec<&Param> {
        vec![&self.w1, &self.b1, &self.w2, &self.b2, &self.w3, &self.b3]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![
            &mut self.w1,
            &mut self.b1,
            &mut self.w2,
            &mut self.b2,
            &mut self.w3,
            &mut self.b3,
        ]
    }
}
