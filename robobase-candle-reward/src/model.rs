//! Interface of neural networks used in reward models.
//!
//! Each trait is a capability with a fixed forward signature. Implementors do not own
//! a [`VarMap`]; variables are created through the [`VarBuilder`] given to `build`,
//! so the owner decides which optimizer trains them.
//!
//! [`VarMap`]: candle_nn::VarMap
use anyhow::Result;
use candle_core::Tensor;
use candle_nn::VarBuilder;
use serde::{de::DeserializeOwned, Serialize};

/// Encodes each camera view into a feature vector.
pub trait ViewEncoder {
    /// Configuration from which [`ViewEncoder`] is constructed.
    type Config: Clone + Serialize + DeserializeOwned;

    /// Builds the encoder for inputs of shape `[views, channels, height, width]`.
    fn build(vb: VarBuilder, config: Self::Config, input_shape: [usize; 4]) -> Result<Self>
    where
        Self: Sized;

    /// Maps `(N, views, C, H, W)` pixels in `0..=255` to `(N, views, features)`.
    fn forward(&self, xs: &Tensor) -> Result<Tensor>;

    /// Returns `[views, features]`.
    fn output_shape(&self) -> [usize; 2];
}

/// Fuses per-view features into one vector.
pub trait ViewFusion {
    /// Configuration from which [`ViewFusion`] is constructed.
    type Config: Clone + Serialize + DeserializeOwned;

    /// Builds the fusion module for inputs of shape `[views, features]`.
    fn build(vb: VarBuilder, config: Self::Config, input_shape: [usize; 2]) -> Result<Self>
    where
        Self: Sized;

    /// Maps `(N, views, features)` to `(N, output_dim)`.
    fn forward(&self, xs: &Tensor) -> Result<Tensor>;

    /// Dimension of the fused vector.
    fn output_dim(&self) -> usize;
}

/// Dimensions of the inputs of a [`RewardHead`]. Absent modalities are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardInputShapes {
    /// Low-dimensional state.
    pub low_dim: Option<usize>,

    /// Fused vision latent.
    pub fused_view_feats: Option<usize>,

    /// Flattened action.
    pub action: usize,

    /// Time index feature.
    pub time: Option<usize>,
}

impl RewardInputShapes {
    /// Sum of the dimensions of all present inputs.
    pub fn total(&self) -> usize {
        self.low_dim.unwrap_or(0)
            + self.fused_view_feats.unwrap_or(0)
            + self.action
            + self.time.unwrap_or(0)
    }
}

/// Per-timestep inputs of a [`RewardHead`], each with `N` rows.
pub struct RewardHeadInput<'a> {
    /// Low-dimensional state, `(N, low_dim)`.
    pub low_dim: Option<&'a Tensor>,

    /// Fused vision latent, `(N, fused)`.
    pub fused_view_feats: Option<&'a Tensor>,

    /// Flattened action, `(N, action)`.
    pub action: &'a Tensor,

    /// Time index feature, `(N, time)`.
    pub time: Option<&'a Tensor>,
}

impl RewardHeadInput<'_> {
    /// Returns the rows `start..start + len` of all inputs.
    pub fn narrow(&self, start: usize, len: usize) -> Result<RewardHeadRows> {
        let narrow = |t: Option<&Tensor>| -> Result<Option<Tensor>> {
            Ok(match t {
                Some(t) => Some(t.narrow(0, start, len)?),
                None => None,
            })
        };
        Ok(RewardHeadRows {
            low_dim: narrow(self.low_dim)?,
            fused_view_feats: narrow(self.fused_view_feats)?,
            action: self.action.narrow(0, start, len)?,
            time: narrow(self.time)?,
        })
    }
}

/// Owned counterpart of [`RewardHeadInput`].
pub struct RewardHeadRows {
    /// Low-dimensional state.
    pub low_dim: Option<Tensor>,

    /// Fused vision latent.
    pub fused_view_feats: Option<Tensor>,

    /// Flattened action.
    pub action: Tensor,

    /// Time index feature.
    pub time: Option<Tensor>,
}

impl RewardHeadRows {
    /// Borrows the rows as [`RewardHeadInput`].
    pub fn as_input(&self) -> RewardHeadInput<'_> {
        RewardHeadInput {
            low_dim: self.low_dim.as_ref(),
            fused_view_feats: self.fused_view_feats.as_ref(),
            action: &self.action,
            time: self.time.as_ref(),
        }
    }
}

/// A reward network consuming state, fused vision latent, action and time.
pub trait RewardHead {
    /// Configuration from which [`RewardHead`] is constructed.
    type Config: Clone + Serialize + DeserializeOwned;

    /// Builds the head with `out_dim` outputs, one per preference label.
    fn build(
        vb: VarBuilder,
        config: Self::Config,
        input_shapes: &RewardInputShapes,
        out_dim: usize,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Returns `(N, out_dim)` rewards.
    fn forward(&self, input: &RewardHeadInput) -> Result<Tensor>;
}
