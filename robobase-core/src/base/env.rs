//! Environment.
use super::Step;
use crate::{record::Record, BoxSpace, DictSpace};
use anyhow::Result;
use ndarray::ArrayD;
use std::collections::BTreeMap;

/// Dictionary observation, keyed by modality (`low_dim_state`, `rgb`, `time`, ...).
pub type ObsDict = BTreeMap<String, ArrayD<f32>>;

/// Represents an environment with dictionary observations and box actions.
///
/// Wrappers hold another environment as `Box<dyn Env>` and transform its
/// observations, actions or info, so the trait is object safe.
pub trait Env {
    /// Resets the environment, returning the first observation and the info.
    fn reset(&mut self, seed: Option<u64>) -> Result<(ObsDict, Record)>;

    /// Performs an environment step.
    ///
    /// An implementation must never report a step that is both terminated and
    /// truncated.
    fn step(&mut self, act: &ArrayD<f32>) -> Result<Step>;

    /// Observation space.
    fn observation_space(&self) -> &DictSpace;

    /// Action space.
    fn action_space(&self) -> &BoxSpace;

    /// Maximum number of steps in an episode.
    fn max_episode_steps(&self) -> usize;
}

impl<E: Env + ?Sized> Env for Box<E> {
    fn reset(&mut self, seed: Option<u64>) -> Result<(ObsDict, Record)> {
        (**self).reset(seed)
    }

    fn step(&mut self, act: &ArrayD<f32>) -> Result<Step> {
        (**self).step(act)
    }

    fn observation_space(&self) -> &DictSpace {
        (**self).observation_space()
    }

    fn action_space(&self) -> &BoxSpace {
        (**self).action_space()
    }

    fn max_episode_steps(&self) -> usize {
        (**self).max_episode_steps()
    }
}
