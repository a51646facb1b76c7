//! Multilayer perceptron.
mod base;
mod config;
use crate::Activation;
use anyhow::Result;
pub use base::Mlp;
use candle_core::Tensor;
use candle_nn::{Linear, Module};
pub use config::MlpConfig;

fn mlp_forward(xs: Tensor, layers: &[Linear], final_act: &Activation) -> Result<Tensor> {
    let n_layers = layers.len();
    let mut xs = xs;

    for layer in &layers[..n_layers - 1] {
        xs = layer.forward(&xs)?.relu()?;
    }

    let xs = layers[n_layers - 1].forward(&xs)?;
    Ok(final_act.forward(&xs)?)
}
