use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

use crate::agent::network::QNetwork;

/// Adam with bias-corrected moment estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    steps: u64,
    first_moment: Vec<ArrayD<f64>>,
    second_moment: Vec<ArrayD<f64>>,
}

impl Adam {
    pub const BETA1: f64 = 0.9;
    pub const BETA2: f64 = 0.999;
    pub const EPSILON: f64 = 1e-7;

    pub fn new(learning_rate: f64, params: &QNetwork) -> Self {
        let zeros = || -> Vec<ArrayD<f64>> {
            params
                .tensors()
                .iter()
                .map(|t| ArrayD::zeros(t.raw_dim()))
                .collect()
        };
        Self {
            learning_rate,
            beta1: Self::BETA1,
            beta2: Self::BETA2,
            epsilon: Self::EPSILON,
            steps: 0,
            first_moment: zeros(),
            second_moment: zeros(),
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Applies one update of `params` against `grads`.
    pub fn step(&mut self, params: &mut QNetwork, grads: &QNetwork) {
        self.steps += 1;
        let t = self.steps.min(i32::MAX as u64) as i32;
        let (b1, b2, lr, eps) = (self.beta1, self.beta2, self.learning_rate, self.epsilon);
        let bc1 = 1.0 - b1.powi(t);
        let bc2 = 1.0 - b2.powi(t);

        let layers = params
            .tensors_mut()
            .into_iter()
            .zip(grads.tensors())
            .zip(self.first_moment.iter_mut())
            .zip(self.second_moment.iter_mut());

        for (((mut p, g), m), v) in layers {
            Zip::from(&mut p)
                .and(&g)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    let m_hat = *m / bc1;
                    let v_hat = *v / bc2;
                    *p -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
    }
}
