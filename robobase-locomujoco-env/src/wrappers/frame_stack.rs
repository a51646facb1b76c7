use anyhow::{ensure, Result};
use ndarray::{stack, ArrayD, ArrayViewD, Axis};
use robobase_core::{record::Record, BoxSpace, DictSpace, Env, ObsDict, Step};
use std::collections::VecDeque;

/// Frames for preference queries are passed through as they are.
fn is_stacked(key: &str) -> bool {
    !key.starts_with("query_pixels")
}

/// Stacks the last `num_frames` observations along a new leading axis.
///
/// At reset the first observation fills the whole stack.
pub struct FrameStack<E: Env> {
    env: E,
    obs_space: DictSpace,
    num_frames: usize,
    frames: VecDeque<ObsDict>,
}

impl<E: Env> FrameStack<E> {
    /// Wraps `env`.
    pub fn new(env: E, num_frames: usize) -> Result<Self> {
        ensure!(num_frames > 0, "FrameStack needs at least one frame");
        let obs_space = env
            .observation_space()
            .iter()
            .map(|(k, s)| -> Result<(String, BoxSpace)> {
                let s = match is_stacked(k) {
                    true => {
                        let mut shape = vec![num_frames];
                        shape.extend(s.shape.iter());
                        BoxSpace::new(s.low.repeat(num_frames), s.high.repeat(num_frames), shape)?
                    }
                    false => s.clone(),
                };
                Ok((k.clone(), s))
            })
            .collect::<Result<DictSpace>>()?;

        Ok(Self {
            env,
            obs_space,
            num_frames,
            frames: VecDeque::with_capacity(num_frames),
        })
    }

    fn stacked_obs(&self, latest: &ObsDict) -> Result<ObsDict> {
        let mut obs = ObsDict::new();
        for (k, v) in latest.iter() {
            let v = match is_stacked(k) {
                true => {
                    let frames = self
                        .frames
                        .iter()
                        .map(|f| f[k].view())
                        .collect::<Vec<ArrayViewD<f32>>>();
                    stack(Axis(0), &frames)?
                }
                false => v.clone(),
            };
            obs.insert(k.clone(), v);
        }
        Ok(obs)
    }
}

impl<E: Env> Env for FrameStack<E> {
    fn reset(&mut self, seed: Option<u64>) -> Result<(ObsDict, Record)> {
        let (obs, info) = self.env.reset(seed)?;
        self.frames.clear();
        for _ in 0..self.num_frames {
            self.frames.push_back(obs.clone());
        }
        Ok((self.stacked_obs(&obs)?, info))
    }

    fn step(&mut self, act: &ArrayD<f32>) -> Result<Step> {
        let mut step = self.env.step(act)?;
        if self.frames.len() == self.num_frames {
            self.frames.pop_front();
        }
        self.frames.push_back(step.obs.clone());
        step.obs = self.stacked_obs(&step.obs)?;
        Ok(step)
    }

    fn observation_space(&self) -> &DictSpace {
        &self.obs_space
    }

    fn action_space(&self) -> &BoxSpace {
        self.env.action_space()
    }

    fn max_episode_steps(&self) -> usize {
        self.env.max_episode_steps()
    }
}
