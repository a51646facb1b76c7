use anyhow::Result;
use ndarray::{Array1, ArrayD};
use robobase_core::{record::Record, BoxSpace, DictSpace, Env, ObsDict, Step};

const TIME_KEY: &str = "time";

/// Adds a one-hot encoding of the step count under `time`.
///
/// The encoding has `episode_length + 1` entries; the count saturates at the last one.
pub struct OnehotTime<E: Env> {
    env: E,
    obs_space: DictSpace,
    episode_length: usize,
    t: usize,
}

impl<E: Env> OnehotTime<E> {
    /// Wraps `env`.
    pub fn new(env: E, episode_length: usize) -> Self {
        let mut obs_space = env.observation_space().clone();
        obs_space.insert(TIME_KEY, BoxSpace::uniform(0.0, 1.0, &[episode_length + 1]));
        Self {
            env,
            obs_space,
            episode_length,
            t: 0,
        }
    }

    fn onehot(&self) -> ArrayD<f32> {
        let mut v = Array1::zeros(self.episode_length + 1);
        v[self.t.min(self.episode_length)] = 1.0;
        v.into_dyn()
    }
}

impl<E: Env> Env for OnehotTime<E> {
    fn reset(&mut self, seed: Option<u64>) -> Result<(ObsDict, Record)> {
        let (mut obs, info) = self.env.reset(seed)?;
        self.t = 0;
        obs.insert(TIME_KEY.to_string(), self.onehot());
        Ok((obs, info))
    }

    fn step(&mut self, act: &ArrayD<f32>) -> Result<Step> {
        let mut step = self.env.step(act)?;
        self.t += 1;
        step.obs.insert(TIME_KEY.to_string(), self.onehot());
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

/// Truncates episodes after `max_episode_steps` steps.
pub struct TimeLimit<E: Env> {
    env: E,
    max_episode_steps: usize,
    elapsed_steps: usize,
}

impl<E: Env> TimeLimit<E> {
    /// Wraps `env`.
    pub fn new(env: E, max_episode_steps: usize) -> Self {
        Self {
            env,
            max_episode_steps,
            elapsed_steps: 0,
        }
    }
}

impl<E: Env> Env for TimeLimit<E> {
    fn reset(&mut self, seed: Option<u64>) -> Result<(ObsDict, Record)> {
        self.elapsed_steps = 0;
        self.env.reset(seed)
    }

    fn step(&mut self, act: &ArrayD<f32>) -> Result<Step> {
        let mut step = self.env.step(act)?;
        self.elapsed_steps += 1;
        if self.elapsed_steps >= self.max_episode_steps && !step.is_terminated {
            step.is_truncated = true;
        }
        Ok(step)
    }

    fn observation_space(&self) -> &DictSpace {
        self.env.observation_space()
    }

    fn action_space(&self) -> &BoxSpace {
        self.env.action_space()
    }

    fn max_episode_steps(&self) -> usize {
        self.max_episode_steps
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wrappers::test_env::CountEnv;
    use ndarray::IxDyn;

    #[test]
    fn test_onehot_time() -> Result<()> {
        let mut env = OnehotTime::new(CountEnv::new(10), 3);
        assert_eq!(env.observation_space().get("time").unwrap().shape, vec![4]);

        let (obs, _) = env.reset(None)?;
        assert_eq!(obs["time"].as_slice().unwrap(), &[1.0, 0.0, 0.0, 0.0]);
        let act = ArrayD::zeros(IxDyn(&[2]));
        for _ in 0..5 {
            env.step(&act)?;
        }
        let step = env.step(&act)?;
        assert_eq!(step.obs["time"].as_slice().unwrap(), &[0.0, 0.0, 0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn test_time_limit() -> Result<()> {
        let mut env = TimeLimit::new(CountEnv::new(10), 3);
        env.reset(None)?;
        let act = ArrayD::zeros(IxDyn(&[2]));
        assert!(!env.step(&act)?.is_done());
        assert!(!env.step(&act)?.is_done());
        let step = env.step(&act)?;
        assert!(step.is_truncated && !step.is_terminated);

        // Termination takes precedence.
        let mut env = TimeLimit::new(CountEnv::new(2), 2);
        env.reset(None)?;
        env.step(&act)?;
        let step = env.step(&act)?;
        assert!(step.is_terminated && !step.is_truncated);
        Ok(())
    }
}
