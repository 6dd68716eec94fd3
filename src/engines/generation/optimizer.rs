//! Adam (Adaptive Moment Estimation) over the policy's tensor list.

use super::policy::PolicyParams;
use ndarray::{ArrayD, Zip};

#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    t: i32,
    m: Vec<ArrayD<f64>>,
    v: Vec<ArrayD<f64>>,
}

impl Adam {
    pub fn new(learning_rate: f64, params: &PolicyParams) -> Self {
        let zeros: Vec<ArrayD<f64>> = params
            .tensors()
            .iter()
            .map(|t| ArrayD::zeros(t.raw_dim()))
            .collect();
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            t: 0,
            m: zeros.clone(),
            v: zeros,
        }
    }

    pub fn steps(&self) -> i32 {
        self.t
    }

    pub fn step(&mut self, params: &mut PolicyParams, grads: &PolicyParams) {
        self.t += 1;
        let (beta1, beta2, eps, lr) = (self.beta1, self.beta2, self.epsilon, self.learning_rate);
        let bias1 = 1.0 - beta1.powi(self.t);
        let bias2 = 1.0 - beta2.powi(self.t);

        let grads = grads.tensors();
        for (((p, g), m), v) in params
            .tensors_mut()
            .into_iter()
            .zip(grads.iter())
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            Zip::from(p)
                .and(g)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / bias1;
                    let v_hat = *v / bias2;
                    *p -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
    }
}
