use crate::ActionStats;
use anyhow::{ensure, Result};
use ndarray::{ArrayD, IxDyn};
use robobase_core::{record::Record, BoxSpace, DictSpace, Env, ObsDict, Step};

const EPS: f32 = 1e-8;

fn map_action<F>(act: &ArrayD<f32>, space: &BoxSpace, f: F) -> Result<ArrayD<f32>>
where
    F: Fn(f32, f32, f32) -> f32,
{
    ensure!(
        act.shape() == space.shape.as_slice(),
        "Action of shape {:?} does not match the action space {:?}",
        act.shape(),
        space.shape
    );
    let v = act
        .iter()
        .zip(space.low.iter().zip(space.high.iter()))
        .map(|(&a, (&low, &high))| f(a.clamp(-1.0, 1.0), low, high))
        .collect();
    Ok(ArrayD::from_shape_vec(IxDyn(&space.shape), v)?)
}

/// Rescales actions from `[-1, 1]` to the bounds of the wrapped environment.
pub struct RescaleFromTanh<E: Env> {
    env: E,
    act_space: BoxSpace,
}

impl<E: Env> RescaleFromTanh<E> {
    /// Wraps `env`.
    pub fn new(env: E) -> Self {
        let act_space = BoxSpace::uniform(-1.0, 1.0, &env.action_space().shape);
        Self { env, act_space }
    }
}

impl<E: Env> Env for RescaleFromTanh<E> {
    fn reset(&mut self, seed: Option<u64>) -> Result<(ObsDict, Record)> {
        self.env.reset(seed)
    }

    fn step(&mut self, act: &ArrayD<f32>) -> Result<Step> {
        let act = map_action(act, self.env.action_space(), |a, low, high| {
            low + (a + 1.0) / 2.0 * (high - low)
        })?;
        self.env.step(&act)
    }

    fn observation_space(&self) -> &DictSpace {
        self.env.observation_space()
    }

    fn action_space(&self) -> &BoxSpace {
        &self.act_space
    }

    fn max_episode_steps(&self) -> usize {
        self.env.max_episode_steps()
    }
}

/// Rescales actions from `[-1, 1]` to the range of demonstrated actions.
///
/// The range is `[min - |min| * margin, max + |max| * margin]` per dimension, where
/// `min` and `max` come from [`ActionStats`].
pub struct RescaleFromTanhWithMinMax<E: Env> {
    env: E,
    act_space: BoxSpace,
    action_stats: ActionStats,
    min_max_margin: f32,
}

impl<E: Env> RescaleFromTanhWithMinMax<E> {
    /// Wraps `env`.
    pub fn new(env: E, action_stats: ActionStats, min_max_margin: f32) -> Self {
        let act_space = BoxSpace::uniform(-1.0, 1.0, &env.action_space().shape);
        Self {
            env,
            act_space,
            action_stats,
            min_max_margin,
        }
    }

    fn bounds(stats: &ActionStats, margin: f32) -> impl Iterator<Item = (f32, f32)> + '_ {
        stats.min.iter().zip(stats.max.iter()).map(move |(&min, &max)| {
            (min - min.abs() * margin, max + max.abs() * margin)
        })
    }

    /// Maps a raw action into `[-1, 1]`.
    pub fn transform_to_tanh(action: &[f32], stats: &ActionStats, margin: f32) -> Vec<f32> {
        action
            .iter()
            .zip(Self::bounds(stats, margin))
            .map(|(&a, (min, max))| (a - min) / (max - min + EPS) * 2.0 - 1.0)
            .collect()
    }

    /// Maps an action in `[-1, 1]` back to the raw range. Inputs are clipped first.
    pub fn transform_from_tanh(action: &[f32], stats: &ActionStats, margin: f32) -> Vec<f32> {
        action
            .iter()
            .zip(Self::bounds(stats, margin))
            .map(|(&a, (min, max))| (a.clamp(-1.0, 1.0) + 1.0) / 2.0 * (max - min + EPS) + min)
            .collect()
    }
}

impl<E: Env> Env for RescaleFromTanhWithMinMax<E> {
    fn reset(&mut self, seed: Option<u64>) -> Result<(ObsDict, Record)> {
        self.env.reset(seed)
    }

    fn step(&mut self, act: &ArrayD<f32>) -> Result<Step> {
        ensure!(
            act.len() == self.action_stats.min.len(),
            "Action has {} elements, but the action statistics have {}",
            act.len(),
            self.action_stats.min.len()
        );
        let flat: Vec<f32> = act.iter().copied().collect();
        let raw = Self::transform_from_tanh(&flat, &self.action_stats, self.min_max_margin);
        let act = ArrayD::from_shape_vec(act.raw_dim(), raw)?;
        self.env.step(&act)
    }

    fn observation_space(&self) -> &DictSpace {
        self.env.observation_space()
    }

    fn action_space(&self) -> &BoxSpace {
        &self.act_space
    }

    fn max_episode_steps(&self) -> usize {
        self.env.max_episode_steps()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wrappers::test_env::CountEnv;

    fn stats() -> ActionStats {
        ActionStats {
            mean: vec![0.0, 1.0],
            std: vec![1.0, 1.0],
            min: vec![-2.0, 0.5],
            max: vec![3.0, 4.0],
        }
    }

    #[test]
    fn test_rescale_from_tanh() -> Result<()> {
        let mut env = RescaleFromTanh::new(CountEnv::new(10));
        assert_eq!(env.action_space().low, vec![-1.0, -1.0]);
        env.reset(None)?;

        let act = ArrayD::from_shape_vec(IxDyn(&[2]), vec![0.0, 1.5])?;
        let step = env.step(&act)?;
        // Bounds are [-2, 2] and [0, 10]; the second action is clipped.
        assert_eq!(step.info.get_array1("action")?, vec![0.0, 10.0]);
        Ok(())
    }

    #[test]
    fn test_min_max_round_trip() {
        let stats = stats();
        for margin in [0.0, 0.1] {
            for raw in [[-2.0, 0.5], [3.0, 4.0], [0.3, 2.2]] {
                let tanh = RescaleFromTanhWithMinMax::<CountEnv>::transform_to_tanh(&raw, &stats, margin);
                assert!(tanh.iter().all(|v| *v >= -1.0 - 1e-5 && *v <= 1.0 + 1e-5));
                let back = RescaleFromTanhWithMinMax::<CountEnv>::transform_from_tanh(&tanh, &stats, margin);
                for (a, b) in raw.iter().zip(back.iter()) {
                    assert!((a - b).abs() < 1e-4, "{:?} vs {:?}", raw, back);
                }
            }
        }
    }

    #[test]
    fn test_min_max_margin_widens_range() {
        let stats = stats();
        let lo = RescaleFromTanhWithMinMax::<CountEnv>::transform_from_tanh(&[-1.0, -1.0], &stats, 0.5);
        let hi = RescaleFromTanhWithMinMax::<CountEnv>::transform_from_tanh(&[1.0, 1.0], &stats, 0.5);
        assert!((lo[0] + 3.0).abs() < 1e-5);
        assert!((lo[1] - 0.25).abs() < 1e-5);
        assert!((hi[0] - 4.5).abs() < 1e-5);
        assert!((hi[1] - 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_min_max_wrapper_steps_raw_action() -> Result<()> {
        let mut env = RescaleFromTanhWithMinMax::new(CountEnv::new(10), stats(), 0.0);
        env.reset(None)?;
        let act = ArrayD::from_shape_vec(IxDyn(&[2]), vec![-1.0, 1.0])?;
        let raw = env.step(&act)?.info.get_array1("action")?;
        assert!((raw[0] + 2.0).abs() < 1e-5);
        assert!((raw[1] - 4.0).abs() < 1e-5);
        Ok(())
    }
}
