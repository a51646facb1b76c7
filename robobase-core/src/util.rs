//! Utilities for interaction of policies and environments.
use crate::{
    record::{RecordValue, Recorder},
    Env, Policy, Transition,
};
use anyhow::Result;
use log::debug;

/// Runs an episode with a policy and returns its transitions.
///
/// Each step's info is written to `recorder` together with `reward` and
/// `step`. The returned transitions can be scored by a reward model.
pub fn rollout<E, P, R>(
    env: &mut E,
    policy: &mut P,
    seed: Option<u64>,
    recorder: &mut R,
) -> Result<Vec<Transition>>
where
    E: Env + ?Sized,
    P: Policy + ?Sized,
    R: Recorder + ?Sized,
{
    let (mut prev_obs, _) = env.reset(seed)?;
    let mut transitions = Vec::with_capacity(env.max_episode_steps());
    let mut r_total = 0.0;

    loop {
        let act = policy.sample(&prev_obs);
        let step = env.step(&act)?;
        r_total += step.reward;

        let mut record = step.info.clone();
        record.insert("reward", RecordValue::Scalar(step.reward));
        record.insert("step", RecordValue::Scalar(transitions.len() as _));
        recorder.write(record);

        let is_done = step.is_done();
        let next_obs = step.obs.clone();
        transitions.push(Transition::from_step(prev_obs, act, &step));
        if is_done {
            break;
        }
        prev_obs = next_obs;
    }

    debug!(
        "Rollout finished after {} steps, return {}",
        transitions.len(),
        r_total
    );
    Ok(transitions)
}
