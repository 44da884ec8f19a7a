use ndarray::{Array1, Array2, ArrayView1, ArrayViewD, ArrayViewMutD, s};
use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::EnumCount;

use crate::{
    agent::{
        config::{InputDims, NetworkShape},
        layers::{Conv1d, Dense, Recurrent, dropout_mask, relu},
    },
    error::{AgentError, TraderResult},
    gym::trading::{action::Action, state::State},
};

/// Intermediate values of a learning forward pass.
#[derive(Debug, Clone)]
pub struct ForwardCache {
    conv_z: Array2<f64>,
    hidden_states: Array2<f64>,
    fused: Array1<f64>,
    hidden_z: Array1<f64>,
    mask: Option<Array1<f64>>,
    hidden_out: Array1<f64>,
}

/// Q-function approximator: `(MarketWindow, AccountState) -> [Q; Action::COUNT]`.
///
/// ```text
/// window ─┬─ Conv1d ─ ReLU ─ mean over time ─┐
///         └─ Recurrent (tanh) ─ last state ──┼─ concat ─ Dense ─ ReLU ─ Dropout ─ Dense ─ Q
/// account ───────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QNetwork {
    dims: InputDims,
    shape: NetworkShape,
    conv: Conv1d,
    recurrent: Recurrent,
    hidden: Dense,
    output: Dense,
}

impl QNetwork {
    pub fn new<R: Rng + ?Sized>(dims: InputDims, shape: NetworkShape, rng: &mut R) -> Self {
        let conv = Conv1d::new(dims.feature_count, shape.conv_filters, shape.kernel_size, rng);
        let recurrent = Recurrent::new(dims.feature_count, shape.recurrent_units, rng);
        let fused = shape.conv_filters + shape.recurrent_units + dims.account_len;
        let hidden = Dense::new(fused, shape.hidden_units, rng);
        let output = Dense::new(shape.hidden_units, Action::COUNT, rng);
        Self {
            dims,
            shape,
            conv,
            recurrent,
            hidden,
            output,
        }
    }

    /// Same architecture with every parameter set to zero, used as a gradient
    /// accumulator.
    pub fn zeros_like(&self) -> Self {
        Self {
            dims: self.dims,
            shape: self.shape,
            conv: self.conv.zeros_like(),
            recurrent: self.recurrent.zeros_like(),
            hidden: self.hidden.zeros_like(),
            output: self.output.zeros_like(),
        }
    }

    pub fn dims(&self) -> InputDims {
        self.dims
    }

    pub fn shape(&self) -> NetworkShape {
        self.shape
    }

    pub fn output_layer(&self) -> &Dense {
        &self.output
    }

    pub fn output_layer_mut(&mut self) -> &mut Dense {
        &mut self.output
    }

    pub fn parameter_count(&self) -> usize {
        self.tensors().iter().map(|t| t.len()).sum()
    }

    pub fn check_input(&self, state: &State) -> TraderResult<()> {
        let got = (state.market.len(), state.market.feature_count());
        let want = (self.dims.window_size, self.dims.feature_count);
        if got != want {
            return Err(AgentError::ShapeMismatch {
                expected: format!("{want:?}"),
                actual: format!("{got:?}"),
            }
            .into());
        }
        Ok(())
    }

    // ============================================================================================
    // Forward
    // ============================================================================================

    /// Inference pass, dropout disabled.
    pub fn forward(&self, state: &State) -> TraderResult<Array1<f64>> {
        self.check_input(state)?;
        let window = state.market.view();
        let fused = self.fuse(
            self.conv.forward(window).view(),
            self.recurrent.forward(window).view(),
            state,
        );
        let hidden = self.hidden.forward(fused.view()).mapv(relu);
        Ok(self.output.forward(hidden.view()))
    }

    /// Learning pass with dropout drawn from `rng`.
    pub fn forward_train<R: Rng + ?Sized>(
        &self,
        state: &State,
        rng: &mut R,
    ) -> TraderResult<(Array1<f64>, ForwardCache)> {
        self.check_input(state)?;
        let window = state.market.view();

        let conv_z = self.conv.pre_activation(window);
        let hidden_states = self.recurrent.hidden_states(window);
        let last = hidden_states.row(hidden_states.nrows() - 1);
        let fused = self.fuse(Conv1d::pool(&conv_z).view(), last, state);

        let hidden_z = self.hidden.forward(fused.view());
        let mut hidden_out = hidden_z.mapv(relu);
        let mask = (self.shape.dropout > 0.0)
            .then(|| dropout_mask(hidden_out.len(), self.shape.dropout, rng));
        if let Some(m) = &mask {
            hidden_out *= m;
        }

        let q = self.output.forward(hidden_out.view());
        Ok((
            q,
            ForwardCache {
                conv_z,
                hidden_states,
                fused,
                hidden_z,
                mask,
                hidden_out,
            },
        ))
    }

    fn fuse(
        &self,
        conv: ArrayView1<'_, f64>,
        recurrent: ArrayView1<'_, f64>,
        state: &State,
    ) -> Array1<f64> {
        let account = state.account.to_array();
        conv.iter()
            .chain(recurrent.iter())
            .chain(account.iter())
            .copied()
            .collect()
    }

    // ============================================================================================
    // Backward
    // ============================================================================================

    /// Accumulates `dL/dθ` for one sample into `grads`, given `dq = dL/dQ`.
    pub fn backward(
        &self,
        state: &State,
        cache: &ForwardCache,
        dq: ArrayView1<'_, f64>,
        grads: &mut QNetwork,
    ) {
        let window = state.market.view();

        let mut d_hidden = self
            .output
            .backward(cache.hidden_out.view(), dq, &mut grads.output);
        if let Some(m) = &cache.mask {
            d_hidden *= m;
        }
        let d_hidden_z = ndarray::Zip::from(&d_hidden)
            .and(&cache.hidden_z)
            .map_collect(|d, z| if *z > 0.0 { *d } else { 0.0 });

        let d_fused = self
            .hidden
            .backward(cache.fused.view(), d_hidden_z.view(), &mut grads.hidden);

        let c = self.shape.conv_filters;
        let r = self.shape.recurrent_units;
        self.conv.backward(
            window,
            &cache.conv_z,
            d_fused.slice(s![..c]),
            &mut grads.conv,
        );
        self.recurrent.backward(
            window,
            &cache.hidden_states,
            d_fused.slice(s![c..c + r]),
            &mut grads.recurrent,
        );
    }

    // ============================================================================================
    // Parameters
    // ============================================================================================

    /// Every trainable tensor, in a fixed order shared with [`Self::tensors_mut`].
    pub fn tensors(&self) -> Vec<ArrayViewD<'_, f64>> {
        let mut out = Vec::with_capacity(9);
        out.extend(self.conv.tensors());
        out.extend(self.recurrent.tensors());
        out.extend(self.hidden.tensors());
        out.extend(self.output.tensors());
        out
    }

    pub fn tensors_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        let mut out = Vec::with_capacity(9);
        out.extend(self.conv.tensors_mut());
        out.extend(self.recurrent.tensors_mut());
        out.extend(self.hidden.tensors_mut());
        out.extend(self.output.tensors_mut());
        out
    }

    /// `θ ← τ·θ_source + (1 − τ)·θ`. `τ = 1` is a hard copy.
    pub fn soft_update(&mut self, source: &QNetwork, tau: f64) {
        for (mut dst, src) in self.tensors_mut().into_iter().zip(source.tensors()) {
            dst.zip_mut_with(&src, |d, s| *d = tau * s + (1.0 - tau) * *d);
        }
    }

    pub fn global_norm(&self) -> f64 {
        self.tensors()
            .iter()
            .flat_map(|t| t.iter())
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt()
    }

    /// Rescales all tensors so their joint L2 norm is at most `max_norm`.
    /// Returns the norm before clipping.
    pub fn clip_global_norm(&mut self, max_norm: f64) -> f64 {
        let norm = self.global_norm();
        if norm.is_finite() && norm > max_norm {
            let factor = max_norm / norm;
            for mut t in self.tensors_mut() {
                t.mapv_inplace(|v| v * factor);
            }
        } else if !norm.is_finite() {
            for mut t in self.tensors_mut() {
                t.fill(0.0);
            }
        }
        norm
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::gym::trading::state::{AccountState, MarketWindow};

    fn dims() -> InputDims {
        InputDims::new(6, 3)
    }

    fn shape(dropout: f64) -> NetworkShape {
        NetworkShape {
            conv_filters: 4,
            kernel_size: 3,
            recurrent_units: 5,
            hidden_units: 8,
            dropout,
        }
    }

    fn state(seed: u64) -> State {
        let mut rng = StdRng::seed_from_u64(seed);
        let window = Array2::from_shape_fn((6, 3), |_| rng.random::<f64>());
        State::new(
            MarketWindow::new(window),
            AccountState {
                position: 1.0,
                unrealized_pnl_ratio: 0.02,
                relative_entry_offset: -0.01,
            },
        )
    }

    #[test]
    fn outputs_one_value_per_action() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = QNetwork::new(dims(), shape(0.2), &mut rng);
        let q = net.forward(&state(1)).unwrap();
        assert_eq!(q.len(), 4);
        assert!(q.iter().all(|v| v.is_finite()));
        assert_eq!(net.tensors().len(), 9);
        assert_eq!(net.parameter_count(), net.zeros_like().parameter_count());
    }

    #[test]
    fn rejects_wrong_window_shape() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = QNetwork::new(dims(), shape(0.0), &mut rng);
        let bad = State::new(MarketWindow::new(Array2::zeros((5, 3))), AccountState::flat());
        assert!(net.forward(&bad).is_err());
    }

    #[test]
    fn training_pass_without_dropout_matches_inference() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = QNetwork::new(dims(), shape(0.0), &mut rng);
        let s = state(2);
        let (q, _) = net.forward_train(&s, &mut rng).unwrap();
        let q_inf = net.forward(&s).unwrap();
        for (a, b) in q.iter().zip(q_inf.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn gradients_match_finite_differences() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut net = QNetwork::new(dims(), shape(0.0), &mut rng);
        let s = state(5);
        // L = Σ w_a · Q_a
        let w = Array1::from_vec(vec![0.3, -1.2, 0.7, 0.5]);
        let loss = |n: &QNetwork| n.forward(&s).unwrap().dot(&w);

        let (_, cache) = net.forward_train(&s, &mut rng).unwrap();
        let mut grads = net.zeros_like();
        net.backward(&s, &cache, w.view(), &mut grads);
        let analytic: Vec<Vec<f64>> = grads
            .tensors()
            .iter()
            .map(|t| t.iter().copied().collect())
            .collect();

        let eps = 1e-6;
        for (ti, tensor) in analytic.iter().enumerate() {
            for j in [0, tensor.len() / 2, tensor.len() - 1] {
                let original = net.tensors()[ti].iter().nth(j).copied().unwrap();

                set_param(&mut net, ti, j, original + eps);
                let up = loss(&net);
                set_param(&mut net, ti, j, original - eps);
                let down = loss(&net);
                set_param(&mut net, ti, j, original);

                let numeric = (up - down) / (2.0 * eps);
                let diff = (numeric - tensor[j]).abs();
                assert!(
                    diff < 1e-5 + 1e-3 * numeric.abs(),
                    "tensor {ti} index {j}: numeric {numeric}, analytic {}",
                    tensor[j]
                );
            }
        }
    }

    fn set_param(net: &mut QNetwork, tensor: usize, index: usize, value: f64) {
        let mut tensors = net.tensors_mut();
        if let Some(v) = tensors[tensor].iter_mut().nth(index) {
            *v = value;
        }
    }

    #[test]
    fn soft_update_blends_and_hard_copies() {
        let mut rng = StdRng::seed_from_u64(3);
        let main = QNetwork::new(dims(), shape(0.2), &mut rng);
        let original = QNetwork::new(dims(), shape(0.2), &mut rng);

        let mut half = original.clone();
        half.soft_update(&main, 0.5);
        let expected = main.output_layer().weights[[0, 0]] * 0.5
            + original.output_layer().weights[[0, 0]] * 0.5;
        assert!((half.output_layer().weights[[0, 0]] - expected).abs() < 1e-12);

        let mut copy = original.clone();
        copy.soft_update(&main, 1.0);
        assert_eq!(copy, main);
    }

    #[test]
    fn clipping_bounds_the_global_norm() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut net = QNetwork::new(dims(), shape(0.0), &mut rng);
        let before = net.clip_global_norm(0.5);
        assert!(before > 0.5);
        assert!((net.global_norm() - 0.5).abs() < 1e-9);
    }
}
