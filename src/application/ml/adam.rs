use super::params::Param;
use ndarray::Array2;

/// Adam optimizer with bias-corrected moments
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
    m: Vec<Array2<f64>>,
    v: Vec<Array2<f64>>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Applies one update from the gradients currently held in `params`.
    /// Parameter order must be stable across calls.
    pub fn update(&mut self, params: &mut [&mut Param]) {
        if self.m.len() != params.len() {
            self.m = params.iter().map(|p| Array2::zeros(p.value.raw_dim())).collect();
            self.v = params.iter().map(|p| Array2::zeros(p.value.raw_dim())).collect();
            self.step = 0;
        }
        self.step += 1;
        let bc1 = 1.0 - self.beta1.powi(self.step);
        let bc2 = 1.0 - self.beta2.powi(self.step);
        let (b1, b2, lr, eps) = (self.beta1, self.beta2, self.learning_rate, self.epsilon);

        for ((param, m), v) in params.iter_mut().zip(&mut self.m).zip(&mut self.v) {
            ndarray::Zip::from(&mut param.value)
                .and(&param.grad)
                .and(m)
                .and(v)
                .for_each(|w, &g, m, v| {
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    let m_hat = *m / bc1;
                    let v_hat = *v / bc2;
                    *w -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let mut p = Param::new("w", array![[1.0, -1.0]]);
        p.grad = array![[0.5, -2.0]];
        let mut adam = Adam::new(0.002);
        adam.update(&mut [&mut p]);
        // First bias-corrected step has magnitude ~lr regardless of gradient scale
        assert!((p.value[[0, 0]] - (1.0 - 0.002)).abs() < 1e-6);
        assert!((p.value[[0, 1]] - (-1.0 + 0.002)).abs() < 1e-6);
    }
}
