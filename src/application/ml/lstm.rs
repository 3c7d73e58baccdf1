//! LSTM classifier: LSTM(units, sigmoid cell activation) on the full
//! sequence, last hidden state, dropout, dense(2) softmax.
//!
//! Gate layout inside the fused kernels is `[input, forget, cell, output]`.

use super::params::{Param, cross_entropy, dropout_mask, outer, sigmoid, softmax2};
use super::predictor::SequenceClassifier;
use crate::domain::dataset::Label;
use crate::domain::task::ModelKind;
use ndarray::{Array1, Array2, s};
use rand::Rng;
use rand::rngs::StdRng;

pub const LSTM_UNITS: usize = 64;

pub struct LstmClassifier {
    steps: usize,
    features: usize,
    units: usize,
    dropout: f64,
    kernel: Param,
    recurrent: Param,
    bias: Param,
    out_kernel: Param,
    out_bias: Param,
}

struct StepCache {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    c: Array1<f64>,
}

impl LstmClassifier {
    pub fn new<R: Rng + ?Sized>(
        (steps, features): (usize, usize),
        units: usize,
        dropout: f64,
        rng: &mut R,
    ) -> Self {
        let mut bias = Param::zeros("lstm/bias", 1, 4 * units);
        // Forget gate starts open
        bias.value.slice_mut(s![0, units..2 * units]).fill(1.0);
        Self {
            steps,
            features,
            units,
            dropout,
            kernel: Param::glorot_normal("lstm/kernel", features, 4 * units, rng),
            recurrent: Param::glorot_normal("lstm/recurrent_kernel", units, 4 * units, rng),
            bias,
            out_kernel: Param::glorot_normal("dense/kernel", units, 2, rng),
            out_bias: Param::zeros("dense/bias", 1, 2),
        }
    }

    fn forward(&self, input: &Array2<f64>) -> (Array1<f64>, Vec<StepCache>) {
        let h_units = self.units;
        let mut h = Array1::<f64>::zeros(h_units);
        let mut c = Array1::<f64>::zeros(h_units);
        let mut caches = Vec::with_capacity(input.nrows());

        for x in input.rows() {
            let z = x.dot(&self.kernel.value) + h.dot(&self.recurrent.value) + self.bias.row();
            let i = z.slice(s![0..h_units]).mapv(sigmoid);
            let f = z.slice(s![h_units..2 * h_units]).mapv(sigmoid);
            let g = z.slice(s![2 * h_units..3 * h_units]).mapv(sigmoid);
            let o = z.slice(s![3 * h_units..4 * h_units]).mapv(sigmoid);
            let c_next = &f * &c + &i * &g;
            let h_next = &o * &c_next.mapv(sigmoid);
            caches.push(StepCache {
                x: x.to_owned(),
                h_prev: std::mem::replace(&mut h, h_next),
                c_prev: c.clone(),
                i,
                f,
                g,
                o,
                c: c_next.clone(),
            });
            c = c_next;
        }
        (h, caches)
    }

    fn head(&self, h: &Array1<f64>) -> [f64; 2] {
        softmax2(&(h.dot(&self.out_kernel.value) + self.out_bias.row()))
    }
}

impl SequenceClassifier for LstmClassifier {
    fn kind(&self) -> ModelKind {
        ModelKind::ClassicLstm
    }

    fn input_shape(&self) -> (usize, usize) {
        (self.steps, self.features)
    }

    fn hidden_units(&self) -> Vec<usize> {
        vec![self.units]
    }

    fn dropout_rate(&self) -> f64 {
        self.dropout
    }

    fn predict(&self, input: &Array2<f64>) -> [f64; 2] {
        let (h, _) = self.forward(input);
        self.head(&h)
    }

    fn accumulate(&mut self, input: &Array2<f64>, label: &Label, rng: &mut StdRng) -> (f64, [f64; 2]) {
        let h_units = self.units;
        let (h_last, caches) = self.forward(input);
        let mask = dropout_mask(h_units, self.dropout, rng);
        let h_drop = &h_last * &mask;
        let p = self.head(&h_drop);
        let loss = cross_entropy(&p, label);

        let dz_out = Array1::from(vec![p[0] - label[0], p[1] - label[1]]);
        self.out_kernel.grad += &outer(&h_drop.view(), &dz_out.view());
        self.out_bias.add_row_grad(&dz_out);

        let mut dh = self.out_kernel.value.dot(&dz_out) * &mask;
        let mut dc = Array1::<f64>::zeros(h_units);

        for step in caches.iter().rev() {
            let tc = step.c.mapv(sigmoid);
            let d_o = &dh * &tc;
            dc = dc + &dh * &step.o * &tc.mapv(|v| v * (1.0 - v));

            let dz_i = &dc * &step.g * &step.i.mapv(|v| v * (1.0 - v));
            let dz_f = &dc * &step.c_prev * &step.f.mapv(|v| v * (1.0 - v));
            let dz_g = &dc * &step.i * &step.g.mapv(|v| v * (1.0 - v));
            let dz_o = d_o * &step.o.mapv(|v| v * (1.0 - v));

            let mut dz = Array1::<f64>::zeros(4 * h_units);
            dz.slice_mut(s![0..h_units]).assign(&dz_i);
            dz.slice_mut(s![h_units..2 * h_units]).assign(&dz_f);
            dz.slice_mut(s![2 * h_units..3 * h_units]).assign(&dz_g);
            dz.slice_mut(s![3 * h_units..4 * h_units]).assign(&dz_o);

            self.kernel.grad += &outer(&step.x.view(), &dz.view());
            self.recurrent.grad += &outer(&step.h_prev.view(), &dz.view());
            self.bias.add_row_grad(&dz);

            dh = self.recurrent.value.dot(&dz);
            dc = dc * &step.f;
        }

        (loss, p)
    }

    fn params(&self) -> Vec<&Param> {
        vec![
            &self.kernel,
            &self.recurrent,
            &self.bias,
            &self.out_kernel,
            &self.out_bias,
        ]
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![
            &mut self.kernel,
            &mut self.recurrent,
            &mut self.bias,
            &mut self.out_kernel,
            &mut self.out_bias,
        ]
    }
}
