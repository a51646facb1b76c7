use anyhow::{ensure, Result};
use ndarray::{ArrayD, Axis};
use robobase_core::{record::Record, BoxSpace, DictSpace, Env, ObsDict, Step};

/// Takes a sequence of `sequence_length` actions and executes them one by one.
///
/// Rewards are summed over the executed actions. Execution stops early when the
/// episode ends, and the last step is returned with the summed reward.
pub struct ActionSequence<E: Env> {
    env: E,
    act_space: BoxSpace,
    sequence_length: usize,
}

impl<E: Env> ActionSequence<E> {
    /// Wraps `env`.
    pub fn new(env: E, sequence_length: usize) -> Result<Self> {
        ensure!(sequence_length > 0, "Action sequences must not be empty");
        let inner = env.action_space();
        let mut shape = vec![sequence_length];
        shape.extend(inner.shape.iter());
        let act_space = BoxSpace::new(
            inner.low.repeat(sequence_length),
            inner.high.repeat(sequence_length),
            shape,
        )?;
        Ok(Self {
            env,
            act_space,
            sequence_length,
        })
    }
}

impl<E: Env> Env for ActionSequence<E> {
    fn reset(&mut self, seed: Option<u64>) -> Result<(ObsDict, Record)> {
        self.env.reset(seed)
    }

    fn step(&mut self, act: &ArrayD<f32>) -> Result<Step> {
        ensure!(
            act.shape() == self.act_space.shape.as_slice(),
            "Action of shape {:?} does not match the action sequence {:?}",
            act.shape(),
            self.act_space.shape
        );
        let mut reward = 0.0;
        let mut last = None;
        for a in act.axis_iter(Axis(0)) {
            let step = self.env.step(&a.to_owned())?;
            reward += step.reward;
            let is_done = step.is_done();
            last = Some(step);
            if is_done {
                break;
            }
        }

        let mut step = last.ok_or_else(|| anyhow::anyhow!("Empty action sequence"))?;
        step.reward = reward;
        Ok(step)
    }

    fn observation_space(&self) -> &DictSpace {
        self.env.observation_space()
    }

    fn action_space(&self) -> &BoxSpace {
        &self.act_space
    }

    fn max_episode_steps(&self) -> usize {
        self.env.max_episode_steps() / self.sequence_length
    }
}
