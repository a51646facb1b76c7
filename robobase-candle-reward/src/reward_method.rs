//! Interface of learned reward functions.
use crate::TensorDict;
use anyhow::Result;
use candle_core::Tensor;
use robobase_core::{record::Record, Transition};

/// Input of [`RewardMethod::compute_reward`].
///
/// Rewards can be computed for a single rollout, a list of transitions with a flat
/// time axis, or for a batch of trajectories stored as a dictionary of tensors with
/// leading `(batch, sequence)` dimensions. The batch form carries the action under the
/// `action` key and observation modalities under their observation-space keys.
pub enum RewardSeq<'a> {
    /// Transitions of a rollout.
    Rollout(&'a mut [Transition]),

    /// Dictionary of batched trajectories.
    Batch(&'a mut TensorDict),
}

/// Selects which ensemble member computes the reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Member {
    /// Mean over all members.
    Mean,

    /// A single member.
    Index(usize),
}

/// Output of [`RewardMethod::compute_reward`].
#[derive(Debug)]
pub enum RewardOutput {
    /// The reward method is not activated and the input was left as it was.
    Unchanged,

    /// Rewards were written into the input.
    Written,

    /// Rewards, of shape `(T)` for rollouts or `(B, S)` for batches.
    Reward(Tensor),
}

impl RewardOutput {
    /// Returns the reward tensor if it was requested.
    pub fn reward(self) -> Option<Tensor> {
        match self {
            Self::Reward(t) => Some(t),
            _ => None,
        }
    }
}

/// A learned reward function.
pub trait RewardMethod {
    /// Returns `true` if the reward method replaces environment rewards.
    fn activated(&self) -> bool;

    /// Activates or deactivates the reward method.
    fn set_activated(&mut self, v: bool);

    /// Computes rewards of a sequence.
    ///
    /// If `return_reward` is `false`, rewards are written into `seq`: the `reward`
    /// field of each transition or the `reward` key of the dictionary.
    fn compute_reward(
        &self,
        seq: RewardSeq,
        member: Member,
        return_reward: bool,
    ) -> Result<RewardOutput>;

    /// Performs an optimization step with batches drawn from `batches`.
    fn update(&mut self, batches: &mut dyn Iterator<Item = TensorDict>, step: usize)
        -> Result<Record>;

    /// Resets internal states at the beginning of episodes.
    fn reset(&mut self, _step: usize, _agents_to_reset: &[usize]) {}
}
