use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// A trainable matrix and its accumulated gradient. Biases are `1 x n`.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub value: Array2<f64>,
    pub grad: Array2<f64>,
}

impl Param {
    pub fn new(name: impl Into<String>, value: Array2<f64>) -> Self {
        let grad = Array2::zeros(value.raw_dim());
        Self {
            name: name.into(),
            value,
            grad,
        }
    }

    pub fn zeros(name: impl Into<String>, rows: usize, cols: usize) -> Self {
        Self::new(name, Array2::zeros((rows, cols)))
    }

    /// Glorot-normal kernel: `N(0, sqrt(2 / (fan_in + fan_out)))`
    pub fn glorot_normal<R: Rng + ?Sized>(
        name: impl Into<String>,
        rows: usize,
        cols: usize,
        rng: &mut R,
    ) -> Self {
        let std = (2.0 / (rows + cols).max(1) as f64).sqrt();
        let value = match Normal::new(0.0, std) {
            Ok(dist) => Array2::from_shape_fn((rows, cols), |_| dist.sample(rng)),
            Err(_) => Array2::zeros((rows, cols)),
        };
        Self::new(name, value)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.value.dim()
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    /// Bias row as a vector view
    pub fn row(&self) -> ArrayView1<'_, f64> {
        self.value.row(0)
    }

    pub fn add_row_grad(&mut self, delta: &Array1<f64>) {
        let mut row = self.grad.row_mut(0);
        row += delta;
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn relu(x: f64) -> f64 {
    x.max(0.0)
}

pub fn softmax2(z: &Array1<f64>) -> [f64; 2] {
    let m = z[0].max(z[1]);
    let a = (z[0] - m).exp();
    let b = (z[1] - m).exp();
    let s = a + b;
    [a / s, b / s]
}

pub fn cross_entropy(p: &[f64; 2], y: &[f64; 2]) -> f64 {
    const EPS: f64 = 1e-7;
    -(y[0] * p[0].clamp(EPS, 1.0).ln() + y[1] * p[1].clamp(EPS, 1.0).ln())
}

/// `a^T b` for column vector `a` and row vector `b`
pub fn outer(a: &ArrayView1<'_, f64>, b: &ArrayView1<'_, f64>) -> Array2<f64> {
    let col = a.view().insert_axis(Axis(1));
    let row = b.view().insert_axis(Axis(0));
    col.dot(&row)
}

/// Inverted dropout mask: kept units are scaled by `1 / (1 - rate)`.
pub fn dropout_mask<R: Rng + ?Sized>(len: usize, rate: f64, rng: &mut R) -> Array1<f64> {
    if rate <= 0.0 {
        return Array1::ones(len);
    }
    let keep = 1.0 / (1.0 - rate);
    Array1::from_shape_fn(len, |_| {
        if rng.random::<f64>() < rate {
            0.0
        } else {
            keep
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_softmax_and_loss() {
        let p = softmax2(&array![0.0, 0.0]);
        assert!((p[0] - 0.5).abs() < 1e-12);
        let loss = cross_entropy(&p, &[1.0, 0.0]);
        assert!((loss - 2f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_outer_shape() {
        let a = array![1.0, 2.0];
        let b = array![3.0, 4.0, 5.0];
        let m = outer(&a.view(), &b.view());
        assert_eq!(m.dim(), (2, 3));
        assert_eq!(m[[1, 2]], 10.0);
    }

    #[test]
    fn test_glorot_is_seeded() {
        let mut r1 = StdRng::seed_from_u64(7);
        let mut r2 = StdRng::seed_from_u64(7);
        let a = Param::glorot_normal("k", 4, 3, &mut r1);
        let b = Param::glorot_normal("k", 4, 3, &mut r2);
        assert_eq!(a, b);
        assert!(a.value.iter().any(|v| *v != 0.0));
    }

    #[test]
    fn test_dropout_mask_values() {
        let mut rng = StdRng::seed_from_u64(1);
        let mask = dropout_mask(100, 0.2, &mut rng);
        assert!(mask.iter().all(|v| *v == 0.0 || (*v - 1.25).abs() < 1e-12));
        assert!(dropout_mask(3, 0.0, &mut rng).iter().all(|v| *v == 1.0));
    }
}
