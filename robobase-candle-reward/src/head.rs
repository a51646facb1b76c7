//! Reward heads.
use crate::{
    mlp::{Mlp, MlpConfig},
    model::{RewardHead, RewardHeadInput, RewardInputShapes},
    Activation,
};
use anyhow::Result;
use candle_core::{Tensor, D};
use candle_nn::VarBuilder;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`MlpRewardHead`].
pub struct MlpRewardHeadConfig {
    /// Hidden units.
    pub units: Vec<usize>,
}

impl Default for MlpRewardHeadConfig {
    fn default() -> Self {
        Self {
            units: vec![256, 256],
        }
    }
}

impl MlpRewardHeadConfig {
    /// Sets hidden units.
    pub fn units(mut self, v: Vec<usize>) -> Self {
        self.units = v;
        self
    }
}

/// Reward head concatenating its inputs and applying an MLP.
///
/// Inputs are concatenated in the order low-dimensional state, fused vision latent,
/// action and time.
pub struct MlpRewardHead {
    mlp: Mlp,
}

impl RewardHead for MlpRewardHead {
    type Config = MlpRewardHeadConfig;

    fn build(
        vb: VarBuilder,
        config: Self::Config,
        input_shapes: &RewardInputShapes,
        out_dim: usize,
    ) -> Result<Self> {
        let mlp_config =
            MlpConfig::new(input_shapes.total(), config.units, out_dim, Activation::None);
        Ok(Self {
            mlp: Mlp::build(vb, mlp_config)?,
        })
    }

    fn forward(&self, input: &RewardHeadInput) -> Result<Tensor> {
        let xs: Vec<&Tensor> = [input.low_dim, input.fused_view_feats]
            .into_iter()
            .flatten()
            .chain(std::iter::once(input.action))
            .chain(input.time)
            .collect();
        let xs = Tensor::cat(&xs, D::Minus1)?;
        self.mlp.forward(&xs)
    }
}
