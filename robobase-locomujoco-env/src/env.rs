//! Locomotion environment.
use crate::{
    LocoMujocoConfig, LocoMujocoError, LocoSimulator, RewardMode, RewardTermType,
};
use anyhow::Result;
use log::info;
use ndarray::{s, Array1, Array3, ArrayD};
use robobase_core::{
    record::{Record, RecordValue::Scalar},
    BoxSpace, DictSpace, Env, ObsDict, Step,
};
use std::collections::BTreeMap;

/// The only view available for preference queries.
const PIXELS_KEY: &str = "pixels";

/// Reward terms of the environment with their upper bounds.
const REWARD_TERMS: [(&str, f32); 1] = [("Reward/target_velocity", 1e1)];

const MAX_EPISODE_STEPS: usize = 1000;

/// Converts a `(H, W, 3)` frame to `(3, H, W)`.
fn channel_first(img: &Array3<u8>) -> ArrayD<f32> {
    img.view()
        .permuted_axes([2, 0, 1])
        .mapv(|v| v as f32)
        .into_dyn()
}

/// Rotates a `(H, W, 3)` frame by 90 degrees clockwise.
fn rotate_clockwise(img: &Array3<u8>) -> ArrayD<f32> {
    img.view()
        .permuted_axes([1, 0, 2])
        .slice(s![.., ..;-1, ..])
        .mapv(|v| v as f32)
        .into_dyn()
}

fn check_query_keys(config: &LocoMujocoConfig) -> Result<(), LocoMujocoError> {
    match config.query_keys.iter().find(|k| *k != PIXELS_KEY) {
        Some(key) => Err(LocoMujocoError::UnsupportedQueryKey(key.clone())),
        None => Ok(()),
    }
}

/// LocoMuJoCo task as an [`Env`].
///
/// The observation is either the state under `low_dim_state` or the rendered frame
/// under `rgb`, channel first. With `use_rlhf`, the frame rotated 90 degrees clockwise
/// is added under `query_pixels_pixels` for preference queries.
///
/// Each step repeats the action `action_repeat` times, stopping early when the
/// episode ends. The info carries `task_reward` and every selected reward term,
/// summed over the repeats.
pub struct LocoMujoco<S: LocoSimulator> {
    sim: S,
    config: LocoMujocoConfig,
    obs_space: DictSpace,
    act_space: BoxSpace,
    initial_terms: Vec<String>,
    reward_terms: Vec<String>,
    initial_reward_scale: BTreeMap<String, f32>,
}

impl<S: LocoSimulator> LocoMujoco<S> {
    /// Builds the environment and its simulator.
    pub fn build(config: LocoMujocoConfig) -> Result<Self> {
        check_query_keys(&config)?;
        info!(
            "Creating LocoMujoco environment with task name: {}",
            config.task_name
        );
        let sim = S::build(&config)?;
        Self::from_simulator(sim, config)
    }

    /// Wraps a simulator that has already been built.
    pub fn from_simulator(sim: S, config: LocoMujocoConfig) -> Result<Self> {
        check_query_keys(&config)?;
        let (height, width) = config.visual_observation_shape;

        let mut obs_space = DictSpace::new();
        if config.from_pixels {
            obs_space.insert("rgb", BoxSpace::image(&[3, height, width]));
        } else {
            let (low, high) = sim.observation_bounds();
            let dim = low.len();
            obs_space.insert("low_dim_state", BoxSpace::new(low, high, vec![dim])?);
        }
        if config.use_rlhf {
            for key in config.query_keys.iter() {
                obs_space.insert(
                    format!("query_pixels_{}", key),
                    BoxSpace::image(&[width, height, 3]),
                );
            }
        }
        let act_space = {
            let (low, high) = sim.action_bounds();
            let dim = low.len();
            BoxSpace::new(low, high, vec![dim])?
        };

        let all_terms: Vec<String> = REWARD_TERMS.iter().map(|(k, _)| k.to_string()).collect();
        let initial_terms = match config.initial_terms.is_empty() {
            true => all_terms.clone(),
            false => config
                .initial_terms
                .iter()
                .map(|k| {
                    let key = format!("Reward/{}", k);
                    match all_terms.contains(&key) {
                        true => Ok(key),
                        false => Err(LocoMujocoError::UnknownRewardTerm(key)),
                    }
                })
                .collect::<Result<Vec<_>, _>>()?,
        };
        let reward_terms = match config.reward_term_type {
            RewardTermType::All => all_terms,
            RewardTermType::Initial => initial_terms.clone(),
        };
        let initial_reward_scale = REWARD_TERMS
            .iter()
            .filter(|(k, _)| initial_terms.iter().any(|t| t == *k))
            .map(|(k, high)| (k.to_string(), *high))
            .collect();

        Ok(Self {
            sim,
            config,
            obs_space,
            act_space,
            initial_terms,
            reward_terms,
            initial_reward_scale,
        })
    }

    /// Reward terms reported in the info.
    pub fn reward_terms(&self) -> &[String] {
        &self.reward_terms
    }

    /// Renders the current frame rotated 90 degrees clockwise, `(W, H, 3)`.
    pub fn render(&mut self) -> Result<ArrayD<f32>> {
        Ok(rotate_clockwise(&self.sim.render()?))
    }

    /// Mutable access to the simulator.
    pub fn simulator_mut(&mut self) -> &mut S {
        &mut self.sim
    }

    fn get_obs(&mut self, state: Array1<f32>) -> Result<ObsDict> {
        let mut obs = ObsDict::new();
        if self.config.from_pixels || self.config.use_rlhf {
            let frame = self.sim.render()?;
            if self.config.from_pixels {
                obs.insert("rgb".to_string(), channel_first(&frame));
            }
            if self.config.use_rlhf {
                if let Some(key) = self.config.query_keys.first() {
                    obs.insert(format!("query_pixels_{}", key), rotate_clockwise(&frame));
                }
            }
        }
        if !self.config.from_pixels {
            obs.insert("low_dim_state".to_string(), state.into_dyn());
        }
        Ok(obs)
    }

    fn initial_reward(&self, info: &Record) -> Result<f32> {
        let mut reward = 0.0;
        for key in self.initial_terms.iter() {
            let scale = self.initial_reward_scale.get(key).copied().unwrap_or(1.0);
            reward += scale * info.get_scalar(key)?;
        }
        Ok(reward)
    }
}

impl<S: LocoSimulator> Env for LocoMujoco<S> {
    fn reset(&mut self, seed: Option<u64>) -> Result<(ObsDict, Record)> {
        let (state, mut info) = self.sim.reset(seed)?;
        for key in self.reward_terms.iter() {
            info.insert(key.clone(), Scalar(0.0));
        }
        info.insert("task_reward", Scalar(0.0));
        Ok((self.get_obs(state)?, info))
    }

    fn step(&mut self, act: &ArrayD<f32>) -> Result<Step> {
        let mut reward = 0.0;
        let mut task_reward = 0.0;
        let mut term_sums = vec![0f32; self.reward_terms.len()];
        let mut last = None;

        for _ in 0..self.config.action_repeat.max(1) {
            let mut step = self.sim.step(act)?;
            step.info.insert(REWARD_TERMS[0].0, Scalar(step.reward));
            task_reward += step.reward;
            reward += match self.config.reward_mode {
                RewardMode::Initial => self.initial_reward(&step.info)?,
                RewardMode::Dense => step.reward,
            };
            for (sum, key) in term_sums.iter_mut().zip(self.reward_terms.iter()) {
                *sum += step.info.get_scalar(key)?;
            }
            let is_done = step.is_terminated || step.is_truncated;
            last = Some(step);
            if is_done {
                break;
            }
        }

        // action_repeat is at least 1
        let last = last.ok_or_else(|| anyhow::anyhow!("No simulation step was performed"))?;
        let mut info = last.info;
        info.insert("task_reward", Scalar(task_reward));
        for (sum, key) in term_sums.into_iter().zip(self.reward_terms.iter()) {
            info.insert(key.clone(), Scalar(sum));
        }

        let is_terminated = last.is_terminated;
        let is_truncated = last.is_truncated && !is_terminated;
        let obs = self.get_obs(last.obs)?;
        Ok(Step::new(obs, reward, is_terminated, is_truncated, info))
    }

    fn observation_space(&self) -> &DictSpace {
        &self.obs_space
    }

    fn action_space(&self) -> &BoxSpace {
        &self.act_space
    }

    fn max_episode_steps(&self) -> usize {
        MAX_EPISODE_STEPS
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_rotate_clockwise() {
        // 2x3 single-channel pattern
        let img = Array3::from_shape_vec((2, 3, 1), vec![1u8, 2, 3, 4, 5, 6]).unwrap();
        let rot = rotate_clockwise(&img);
        assert_eq!(rot.shape(), &[3, 2, 1]);
        let rows: Vec<f32> = rot.iter().copied().collect();
        assert_eq!(rows, vec![4.0, 1.0, 5.0, 2.0, 6.0, 3.0]);
    }

    #[test]
    fn test_channel_first() {
        let img = Array3::from_shape_fn((2, 2, 3), |(i, j, c)| (i * 100 + j * 10 + c) as u8);
        let chw = channel_first(&img);
        assert_eq!(chw.shape(), &[3, 2, 2]);
        assert_eq!(chw[[2, 1, 0]], 102.0);
    }
}
