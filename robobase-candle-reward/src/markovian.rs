//! Markovian reward model trained from pairwise segment preferences.
//!
//! The reward of a segment is the sum of per-timestep rewards predicted by an
//! ensemble of heads. Given two segments and a label telling which one is
//! preferred, the heads are trained with a soft cross-entropy over the pair of
//! segment returns (Bradley-Terry model).
//!
//! A training batch is a [`TensorDict`](crate::TensorDict) with keys
//!
//! * `seg0_action`, `seg1_action`: `(B, S, action...)`,
//! * `seg{i}_low_dim_state`, `seg{i}_rgb*`, `seg{i}_time`: observations of the segments,
//!   present for the modalities of the observation space,
//! * `label`: `(B)` or `(B, num_labels)`, `0` if segment 0 is preferred, `1` if segment 1
//!   is preferred and any other value (typically `-1`) for no preference.
mod augment;
mod base;
mod config;
mod ensemble;
mod features;
mod loss;
pub use augment::{crop_and_sum, cropping_mask, RandomShiftsAug};
pub use base::MarkovianReward;
pub use config::MarkovianRewardConfig;
pub use ensemble::{RewardEnsemble, RewardEnsembleConfig};
pub use features::{Features, ObsLayout};
pub use loss::{preference_loss, LabelStats, PreferenceLoss};
