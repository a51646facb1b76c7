//! Modules fusing features of multiple camera views.
use crate::{
    mlp::{Mlp, MlpConfig},
    model::ViewFusion,
    Activation,
};
use anyhow::Result;
use candle_core::Tensor;
use candle_nn::VarBuilder;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
/// Configuration of [`FlattenFusion`].
pub struct FlattenFusionConfig {}

/// Concatenates the features of all views. It has no parameters.
pub struct FlattenFusion {
    output_dim: usize,
}

impl ViewFusion for FlattenFusion {
    type Config = FlattenFusionConfig;

    fn build(_vb: VarBuilder, _config: Self::Config, input_shape: [usize; 2]) -> Result<Self> {
        Ok(Self {
            output_dim: input_shape[0] * input_shape[1],
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        Ok(xs.flatten_from(1)?)
    }

    fn output_dim(&self) -> usize {
        self.output_dim
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`MlpFusion`].
pub struct MlpFusionConfig {
    /// Hidden units.
    pub units: Vec<usize>,

    /// Dimension of the fused vector.
    pub out_dim: usize,
}

impl Default for MlpFusionConfig {
    fn default() -> Self {
        Self {
            units: vec![256],
            out_dim: 256,
        }
    }
}

impl MlpFusionConfig {
    /// Sets hidden units.
    pub fn units(mut self, v: Vec<usize>) -> Self {
        self.units = v;
        self
    }

    /// Sets the dimension of the fused vector.
    pub fn out_dim(mut self, v: usize) -> Self {
        self.out_dim = v;
        self
    }
}

/// Learned fusion: an MLP applied to the concatenated view features.
pub struct MlpFusion {
    mlp: Mlp,
}

impl ViewFusion for MlpFusion {
    type Config = MlpFusionConfig;

    fn build(vb: VarBuilder, config: Self::Config, input_shape: [usize; 2]) -> Result<Self> {
        let mlp_config = MlpConfig::new(
            input_shape[0] * input_shape[1],
            config.units,
            config.out_dim,
            Activation::ReLU,
        );
        Ok(Self {
            mlp: Mlp::build(vb, mlp_config)?,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.mlp.forward(&xs.flatten_from(1)?)
    }

    fn output_dim(&self) -> usize {
        self.mlp.out_dim()
    }
}
