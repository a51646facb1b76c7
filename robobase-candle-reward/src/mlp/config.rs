use crate::Activation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Mlp`](super::Mlp).
pub struct MlpConfig {
    pub(super) in_dim: usize,
    pub(super) units: Vec<usize>,
    pub(super) out_dim: usize,
    pub(super) activation_out: Activation,
}

impl MlpConfig {
    /// Creates configuration of MLP.
    ///
    /// * `activation_out` - Activation applied to the final layer.
    pub fn new(in_dim: usize, units: Vec<usize>, out_dim: usize, activation_out: Activation) -> Self {
        Self {
            in_dim,
            units,
            out_dim,
            activation_out,
        }
    }

    /// Returns the output dimension.
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }
}
