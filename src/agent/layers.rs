//! Trainable building blocks of the Q-network.
//!
//! Every layer exposes an inference `forward`, a cached forward for learning
//! and a `backward` that *accumulates* parameter gradients into a zeroed layer
//! of the same shape.

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayViewD, ArrayViewMutD, Axis, s};
use rand::Rng;
use serde::{Deserialize, Serialize};

// ================================================================================================
// Helpers
// ================================================================================================

pub fn relu(x: f64) -> f64 {
    x.max(0.0)
}

fn uniform_array2<R: Rng + ?Sized>(dim: (usize, usize), limit: f64, rng: &mut R) -> Array2<f64> {
    Array2::from_shape_fn(dim, |_| rng.random_range(-limit..=limit))
}

/// `a ⊗ b` as an `(a.len(), b.len())` matrix.
pub fn outer(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> Array2<f64> {
    a.insert_axis(Axis(1)).dot(&b.insert_axis(Axis(0)))
}

/// Inverted-dropout mask: each unit is kept with probability `1 - p` and
/// rescaled by `1 / (1 - p)`.
pub fn dropout_mask<R: Rng + ?Sized>(len: usize, p: f64, rng: &mut R) -> Array1<f64> {
    let keep = 1.0 - p;
    Array1::from_shape_fn(len, |_| {
        if rng.random::<f64>() < keep {
            1.0 / keep
        } else {
            0.0
        }
    })
}

// ================================================================================================
// Dense
// ================================================================================================

/// Fully connected layer, `y = W x + b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    /// `(outputs, inputs)`
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl Dense {
    /// Glorot-uniform weights, zero bias.
    pub fn new<R: Rng + ?Sized>(inputs: usize, outputs: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        Self {
            weights: uniform_array2((outputs, inputs), limit, rng),
            bias: Array1::zeros(outputs),
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            weights: Array2::zeros(self.weights.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        }
    }

    pub fn inputs(&self) -> usize {
        self.weights.ncols()
    }

    pub fn outputs(&self) -> usize {
        self.weights.nrows()
    }

    pub fn forward(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        self.weights.dot(&x) + &self.bias
    }

    /// Returns `dL/dx`.
    pub fn backward(
        &self,
        x: ArrayView1<'_, f64>,
        dy: ArrayView1<'_, f64>,
        grads: &mut Dense,
    ) -> Array1<f64> {
        grads.weights += &outer(dy, x);
        grads.bias += &dy;
        self.weights.t().dot(&dy)
    }

    pub fn tensors(&self) -> [ArrayViewD<'_, f64>; 2] {
        [self.weights.view().into_dyn(), self.bias.view().into_dyn()]
    }

    pub fn tensors_mut(&mut self) -> [ArrayViewMutD<'_, f64>; 2] {
        [
            self.weights.view_mut().into_dyn(),
            self.bias.view_mut().into_dyn(),
        ]
    }
}

// ================================================================================================
// Conv1d
// ================================================================================================

/// Valid 1-D convolution over the time axis with ReLU and global average
/// pooling. Detects short-range patterns anywhere in the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv1d {
    /// `(kernel, filters, features)`
    pub weights: Array3<f64>,
    pub bias: Array1<f64>,
}

impl Conv1d {
    /// He-uniform weights, zero bias.
    pub fn new<R: Rng + ?Sized>(
        features: usize,
        filters: usize,
        kernel: usize,
        rng: &mut R,
    ) -> Self {
        let limit = (6.0 / (kernel * features) as f64).sqrt();
        Self {
            weights: Array3::from_shape_fn((kernel, filters, features), |_| {
                rng.random_range(-limit..=limit)
            }),
            bias: Array1::zeros(filters),
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            weights: Array3::zeros(self.weights.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        }
    }

    pub fn kernel(&self) -> usize {
        self.weights.dim().0
    }

    pub fn filters(&self) -> usize {
        self.weights.dim().1
    }

    /// Pre-activations, `(positions, filters)`. Requires `x.nrows() >= kernel`.
    pub fn pre_activation(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let k = self.kernel();
        let positions = x.nrows() + 1 - k;
        let mut z = Array2::from_shape_fn((positions, self.filters()), |(_, j)| self.bias[j]);
        for i in 0..k {
            let xs = x.slice(s![i..i + positions, ..]);
            let w = self.weights.index_axis(Axis(0), i);
            z += &xs.dot(&w.t());
        }
        z
    }

    /// Pooled activations from pre-activations.
    pub fn pool(z: &Array2<f64>) -> Array1<f64> {
        z.mapv(relu)
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(z.ncols()))
    }

    pub fn forward(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        Self::pool(&self.pre_activation(x))
    }

    pub fn backward(
        &self,
        x: ArrayView2<'_, f64>,
        z: &Array2<f64>,
        dout: ArrayView1<'_, f64>,
        grads: &mut Conv1d,
    ) {
        let positions = z.nrows();
        let scale = 1.0 / positions.max(1) as f64;
        let dz = Array2::from_shape_fn(z.dim(), |(t, j)| {
            if z[[t, j]] > 0.0 {
                dout[j] * scale
            } else {
                0.0
            }
        });
        grads.bias += &dz.sum_axis(Axis(0));
        for i in 0..self.kernel() {
            let xs = x.slice(s![i..i + positions, ..]);
            let mut gw = grads.weights.index_axis_mut(Axis(0), i);
            gw += &dz.t().dot(&xs);
        }
    }

    pub fn tensors(&self) -> [ArrayViewD<'_, f64>; 2] {
        [self.weights.view().into_dyn(), self.bias.view().into_dyn()]
    }

    pub fn tensors_mut(&mut self) -> [ArrayViewMutD<'_, f64>; 2] {
        [
            self.weights.view_mut().into_dyn(),
            self.bias.view_mut().into_dyn(),
        ]
    }
}

// ================================================================================================
// Recurrent
// ================================================================================================

/// Elman recurrent layer, `h_t = tanh(W_x x_t + W_h h_{t-1} + b)`, returning
/// the final hidden state. Summarizes the whole window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrent {
    /// `(units, features)`
    pub input_weights: Array2<f64>,
    /// `(units, units)`
    pub recurrent_weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl Recurrent {
    pub fn new<R: Rng + ?Sized>(features: usize, units: usize, rng: &mut R) -> Self {
        let input_limit = (6.0 / (features + units) as f64).sqrt();
        let recurrent_limit = (1.0 / units as f64).sqrt();
        Self {
            input_weights: uniform_array2((units, features), input_limit, rng),
            recurrent_weights: uniform_array2((units, units), recurrent_limit, rng),
            bias: Array1::zeros(units),
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            input_weights: Array2::zeros(self.input_weights.raw_dim()),
            recurrent_weights: Array2::zeros(self.recurrent_weights.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        }
    }

    pub fn units(&self) -> usize {
        self.bias.len()
    }

    /// All hidden states, `(steps + 1, units)`, starting with the zero state.
    pub fn hidden_states(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut hs = Array2::zeros((x.nrows() + 1, self.units()));
        for t in 0..x.nrows() {
            let a = self.input_weights.dot(&x.row(t))
                + self.recurrent_weights.dot(&hs.row(t))
                + &self.bias;
            hs.row_mut(t + 1).assign(&a.mapv(f64::tanh));
        }
        hs
    }

    pub fn forward(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        let hs = self.hidden_states(x);
        hs.row(hs.nrows() - 1).to_owned()
    }

    /// Backpropagation through time from the final hidden state.
    pub fn backward(
        &self,
        x: ArrayView2<'_, f64>,
        hs: &Array2<f64>,
        dout: ArrayView1<'_, f64>,
        grads: &mut Recurrent,
    ) {
        let mut dh = dout.to_owned();
        for t in (0..x.nrows()).rev() {
            let h = hs.row(t + 1);
            let da = &dh * &h.mapv(|v| 1.0 - v * v);
            grads.input_weights += &outer(da.view(), x.row(t));
            grads.recurrent_weights += &outer(da.view(), hs.row(t));
            grads.bias += &da;
            dh = self.recurrent_weights.t().dot(&da);
        }
    }

    pub fn tensors(&self) -> [ArrayViewD<'_, f64>; 3] {
        [
            self.input_weights.view().into_dyn(),
            self.recurrent_weights.view().into_dyn(),
            self.bias.view().into_dyn(),
        ]
    }

    pub fn tensors_mut(&mut self) -> [ArrayViewMutD<'_, f64>; 3] {
        [
            self.input_weights.view_mut().into_dyn(),
            self.recurrent_weights.view_mut().into_dyn(),
            self.bias.view_mut().into_dyn(),
        ]
    }
}
