//! Preference-based reward models implemented with [candle](https://crates.io/crates/candle-core).
//!
//! The main entry point is [`MarkovianReward`](markovian::MarkovianReward), a per-timestep
//! reward function trained from pairwise preferences over trajectory segments. Its
//! building blocks are capability traits in [`model`], with default implementations
//! in [`encoder`], [`fusion`] and [`head`].
pub mod encoder;
mod error;
pub mod fusion;
pub mod head;
pub mod markovian;
pub mod mlp;
pub mod model;
pub mod opt;
mod reward_method;
pub mod util;
pub use error::RewardError;
pub use reward_method::{Member, RewardMethod, RewardOutput, RewardSeq};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dictionary of tensors, keyed by modality or batch field name.
pub type TensorDict = BTreeMap<String, candle_core::Tensor>;

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The main GPU device.
    Cuda(usize),
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

impl TryFrom<Device> for candle_core::Device {
    type Error = candle_core::Error;

    fn try_from(device: Device) -> Result<Self, Self::Error> {
        match device {
            Device::Cpu => Ok(candle_core::Device::Cpu),
            Device::Cuda(n) => candle_core::Device::new_cuda(n),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
/// Activation applied to the output of a network.
pub enum Activation {
    /// No activation.
    None,

    /// ReLU.
    ReLU,

    /// Hyperbolic tangent.
    Tanh,
}

impl Default for Activation {
    fn default() -> Self {
        Self::None
    }
}

impl Activation {
    /// Applies the activation.
    pub fn forward(&self, xs: &candle_core::Tensor) -> candle_core::Result<candle_core::Tensor> {
        match self {
            Self::None => Ok(xs.clone()),
            Self::ReLU => xs.relu(),
            Self::Tanh => xs.tanh(),
        }
    }
}
