//! Demonstrations from recorded datasets.
use crate::{
    wrappers::RescaleFromTanhWithMinMax, LocoMujoco, LocoMujocoError, LocoSimulator,
    TrajDataset,
};
use anyhow::Result;
use log::info;
use ndarray::{Array1, ArrayD};
use robobase_core::{
    record::{Record, RecordValue},
    BoxSpace, DictSpace, Env, ObsDict, Step,
};
use serde::{Deserialize, Serialize};

const DEMO_ACTION_KEY: &str = "demo_action";

/// A demonstrated episode.
///
/// `reset_obs` and `reset_info` are what a reset of the environment returns, with
/// `demo: 1` in the info. Each step carries the demonstrated action under
/// `demo_action` and `demo: 1` in its info.
#[derive(Debug, Clone)]
pub struct Demo {
    /// First observation.
    pub reset_obs: ObsDict,

    /// Info of the reset.
    pub reset_info: Record,

    /// Subsequent steps.
    pub steps: Vec<Step>,
}

impl Demo {
    /// The number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if the demo has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sum of rewards.
    pub fn episode_return(&self) -> f32 {
        self.steps.iter().map(|s| s.reward).sum()
    }

    /// Demonstrated actions in the order of steps.
    pub fn actions(&self) -> Result<Vec<Vec<f32>>> {
        self.steps
            .iter()
            .filter(|s| s.info.contains_key(DEMO_ACTION_KEY))
            .map(|s| Ok(s.info.get_array1(DEMO_ACTION_KEY)?))
            .collect()
    }
}

/// A transition of [`TrajDataset`].
#[derive(Debug, Clone)]
struct DatasetTransition {
    state: Array1<f32>,
    action: Array1<f32>,
    reward: f32,
    last: bool,
    next_state: Array1<f32>,
}

/// Splits a flat dataset into trajectories of row indices at `last` flags.
pub fn split_into_trajectories(dataset: &TrajDataset) -> Vec<Vec<usize>> {
    let n = dataset.len();
    let mut trajs = vec![vec![]];
    for i in 0..n {
        if let Some(traj) = trajs.last_mut() {
            traj.push(i);
        }
        if dataset.last[i] == 1.0 && i + 1 < n {
            trajs.push(vec![]);
        }
    }
    trajs
}

fn low_dim_obs(state: Array1<f32>) -> ObsDict {
    let mut obs = ObsDict::new();
    obs.insert("low_dim_state".to_string(), state.into_dyn());
    obs
}

fn demo_flag() -> (String, RecordValue) {
    ("demo".to_string(), RecordValue::Scalar(1.0))
}

/// Converts the recorded dataset of the simulator into demonstrations.
///
/// With `sorting`, demos are ordered by increasing return. A trajectory with
/// `max_episode_steps - 1` transitions was cut by the time limit, so its last step
/// is not terminal.
pub fn get_traj_dataset<S: LocoSimulator>(
    env: &mut LocoMujoco<S>,
    sorting: bool,
) -> Result<Vec<Demo>> {
    let max_episode_steps = env.max_episode_steps();
    let dataset = env.simulator_mut().create_dataset()?;
    let row = |i: usize| DatasetTransition {
        state: dataset.states.row(i).to_owned(),
        action: dataset.actions.row(i).to_owned(),
        reward: dataset.rewards[i],
        last: dataset.last[i] == 1.0,
        next_state: dataset.next_states.row(i).to_owned(),
    };

    let mut trajs: Vec<Vec<DatasetTransition>> = split_into_trajectories(&dataset)
        .into_iter()
        .filter(|t| !t.is_empty())
        .map(|t| t.into_iter().map(row).collect())
        .collect();
    if sorting {
        let ret = |t: &Vec<DatasetTransition>| t.iter().map(|x| x.reward).sum::<f32>();
        trajs.sort_by(|a, b| ret(a).total_cmp(&ret(b)));
    }

    let demos: Vec<Demo> = trajs
        .into_iter()
        .map(|traj| {
            let reset_obs = low_dim_obs(traj[0].state.clone());
            let reset_info = Record::from_slice(&[demo_flag()]);
            let len = traj.len();
            let steps = traj
                .into_iter()
                .enumerate()
                .map(|(i, x)| {
                    let info = Record::from_slice(&[
                        (
                            DEMO_ACTION_KEY.to_string(),
                            RecordValue::Array1(x.action.to_vec()),
                        ),
                        demo_flag(),
                    ]);
                    let is_terminated = x.last && !(i + 1 == len && len + 1 == max_episode_steps);
                    Step::new(low_dim_obs(x.next_state), x.reward, is_terminated, false, info)
                })
                .collect();
            Demo {
                reset_obs,
                reset_info,
                steps,
            }
        })
        .collect();

    info!("Converted {} demonstrations from the dataset", demos.len());
    Ok(demos)
}

/// Statistics of demonstrated actions, per dimension.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ActionStats {
    /// Mean.
    pub mean: Vec<f32>,

    /// Standard deviation.
    pub std: Vec<f32>,

    /// Maximum.
    pub max: Vec<f32>,

    /// Minimum.
    pub min: Vec<f32>,
}

/// Computes statistics of the demonstrated actions of all demos.
pub fn compute_action_stats(demos: &[Demo]) -> Result<ActionStats> {
    let actions = demos
        .iter()
        .map(|d| d.actions())
        .collect::<Result<Vec<_>>>()?
        .concat();
    let dim = match actions.first() {
        Some(a) => a.len(),
        None => return Err(LocoMujocoError::EmptyDemos.into()),
    };
    anyhow::ensure!(
        actions.iter().all(|a| a.len() == dim),
        "Demonstrated actions differ in dimension"
    );

    let n = actions.len() as f32;
    let mut stats = ActionStats {
        mean: vec![0.0; dim],
        std: vec![0.0; dim],
        max: vec![f32::MIN; dim],
        min: vec![f32::MAX; dim],
    };
    for a in actions.iter() {
        for (d, &v) in a.iter().enumerate() {
            stats.mean[d] += v / n;
            stats.max[d] = stats.max[d].max(v);
            stats.min[d] = stats.min[d].min(v);
        }
    }
    for a in actions.iter() {
        for (d, &v) in a.iter().enumerate() {
            stats.std[d] += (v - stats.mean[d]).powi(2) / n;
        }
    }
    stats.std.iter_mut().for_each(|v| *v = v.sqrt());

    Ok(stats)
}

/// Rescales demonstrated actions into `[-1, 1]` with min/max statistics.
pub fn rescale_demo_actions(
    mut demos: Vec<Demo>,
    stats: &ActionStats,
    min_max_margin: f32,
) -> Result<Vec<Demo>> {
    for demo in demos.iter_mut() {
        for step in demo.steps.iter_mut() {
            if step.info.contains_key(DEMO_ACTION_KEY) {
                let raw = step.info.get_array1(DEMO_ACTION_KEY)?;
                let rescaled = RescaleFromTanhWithMinMax::<DemoEnv>::transform_to_tanh(
                    &raw,
                    stats,
                    min_max_margin,
                );
                step.info
                    .insert(DEMO_ACTION_KEY, RecordValue::Array1(rescaled));
            }
        }
    }
    Ok(demos)
}

/// Replays demonstrations, ignoring the actions it is given.
///
/// Each reset starts the next demo, cycling through all of them.
pub struct DemoEnv {
    demos: Vec<Demo>,
    obs_space: DictSpace,
    act_space: BoxSpace,
    max_episode_steps: usize,
    demo_ix: Option<usize>,
    step_ix: usize,
}

impl DemoEnv {
    /// Constructs [`DemoEnv`] with the spaces of the environment the demos came from.
    pub fn new(demos: Vec<Demo>, act_space: BoxSpace, obs_space: DictSpace) -> Result<Self> {
        if demos.is_empty() {
            return Err(LocoMujocoError::EmptyDemos.into());
        }
        let max_episode_steps = demos.iter().map(|d| d.len()).max().unwrap_or(0);
        Ok(Self {
            demos,
            obs_space,
            act_space,
            max_episode_steps,
            demo_ix: None,
            step_ix: 0,
        })
    }

    /// The number of demos.
    pub fn num_demos(&self) -> usize {
        self.demos.len()
    }
}

impl Env for DemoEnv {
    fn reset(&mut self, _seed: Option<u64>) -> Result<(ObsDict, Record)> {
        let ix = match self.demo_ix {
            None => 0,
            Some(ix) => (ix + 1) % self.demos.len(),
        };
        self.demo_ix = Some(ix);
        self.step_ix = 0;
        let demo = &self.demos[ix];
        Ok((demo.reset_obs.clone(), demo.reset_info.clone()))
    }

    fn step(&mut self, _act: &ArrayD<f32>) -> Result<Step> {
        let ix = self.demo_ix.unwrap_or(0);
        match self.demos.get(ix).and_then(|d| d.steps.get(self.step_ix)) {
            Some(step) => {
                self.step_ix += 1;
                Ok(step.clone())
            }
            None => Err(LocoMujocoError::DemoExhausted(ix).into()),
        }
    }

    fn observation_space(&self) -> &DictSpace {
        &self.obs_space
    }

    fn action_space(&self) -> &BoxSpace {
        &self.act_space
    }

    fn max_episode_steps(&self) -> usize {
        self.max_episode_steps
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::{arr1, arr2};

    fn dataset() -> TrajDataset {
        TrajDataset {
            states: arr2(&[[0.0f32], [1.0], [2.0], [10.0], [11.0]]),
            actions: arr2(&[[0.5f32, -1.0], [1.5, 1.0], [2.5, 3.0], [-0.5, 0.0], [0.5, 2.0]]),
            rewards: arr1(&[1.0f32, 1.0, 1.0, 0.5, 0.5]),
            absorbing: arr1(&[0.0f32, 0.0, 0.0, 0.0, 0.0]),
            last: arr1(&[0.0f32, 0.0, 1.0, 0.0, 1.0]),
            next_states: arr2(&[[1.0f32], [2.0], [3.0], [11.0], [12.0]]),
        }
    }

    #[test]
    fn test_split_into_trajectories() {
        assert_eq!(
            split_into_trajectories(&dataset()),
            vec![vec![0, 1, 2], vec![3, 4]]
        );
    }

    fn demo(actions: &[[f32; 2]]) -> Demo {
        Demo {
            reset_obs: low_dim_obs(arr1(&[0.0])),
            reset_info: Record::from_slice(&[demo_flag()]),
            steps: actions
                .iter()
                .map(|a| {
                    let info = Record::from_slice(&[
                        (DEMO_ACTION_KEY.to_string(), RecordValue::Array1(a.to_vec())),
                        demo_flag(),
                    ]);
                    Step::new(low_dim_obs(arr1(&[1.0])), 1.0, false, false, info)
                })
                .collect(),
        }
    }

    #[test]
    fn test_action_stats() -> Result<()> {
        let demos = vec![demo(&[[1.0, -1.0], [3.0, 1.0]]), demo(&[[2.0, 0.0]])];
        let stats = compute_action_stats(&demos)?;
        assert_eq!(stats.min, vec![1.0, -1.0]);
        assert_eq!(stats.max, vec![3.0, 1.0]);
        assert!((stats.mean[0] - 2.0).abs() < 1e-6);
        assert!((stats.std[0] - (2.0f32 / 3.0).sqrt()).abs() < 1e-6);

        assert!(compute_action_stats(&[]).is_err());
        Ok(())
    }

    #[test]
    fn test_rescale_demo_actions() -> Result<()> {
        let demos = vec![demo(&[[1.0, -1.0], [3.0, 1.0]])];
        let stats = compute_action_stats(&demos)?;
        let demos = rescale_demo_actions(demos, &stats, 0.0)?;
        let actions = demos[0].actions()?;
        assert!((actions[0][0] + 1.0).abs() < 1e-5);
        assert!((actions[1][1] - 1.0).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_demo_env_replays() -> Result<()> {
        let demos = vec![demo(&[[0.0, 0.0]; 2]), demo(&[[0.0, 0.0]; 3])];
        let mut env = DemoEnv::new(
            demos,
            BoxSpace::uniform(-1.0, 1.0, &[2]),
            DictSpace::new(),
        )?;
        let act = ArrayD::zeros(ndarray::IxDyn(&[2]));

        let (_, info) = env.reset(None)?;
        assert_eq!(info.get_scalar("demo")?, 1.0);
        env.step(&act)?;
        env.step(&act)?;
        assert!(env.step(&act).is_err());

        env.reset(None)?;
        for _ in 0..3 {
            env.step(&act)?;
        }
        // Back to the first demo.
        env.reset(None)?;
        env.step(&act)?;
        Ok(())
    }
}
