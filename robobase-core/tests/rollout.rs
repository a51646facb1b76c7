use anyhow::Result;
use ndarray::{arr1, ArrayD};
use robobase_core::{
    record::{BufferedRecorder, NullRecorder, Record, RecordValue},
    util::rollout,
    BoxSpace, DictSpace, Env, ObsDict, Step,
};

/// Counts steps and terminates when the counter reaches `limit`.
struct CounterEnv {
    count: usize,
    limit: usize,
    obs_space: DictSpace,
    act_space: BoxSpace,
}

impl CounterEnv {
    fn new(limit: usize) -> Self {
        let mut obs_space = DictSpace::new();
        obs_space.insert("low_dim_state", BoxSpace::uniform(0.0, 100.0, &[1]));
        Self {
            count: 0,
            limit,
            obs_space,
            act_space: BoxSpace::uniform(-1.0, 1.0, &[2]),
        }
    }

    fn obs(&self) -> ObsDict {
        ObsDict::from([(
            "low_dim_state".to_string(),
            arr1(&[self.count as f32]).into_dyn(),
        )])
    }
}

impl Env for CounterEnv {
    fn reset(&mut self, _seed: Option<u64>) -> Result<(ObsDict, Record)> {
        self.count = 0;
        Ok((self.obs(), Record::empty()))
    }

    fn step(&mut self, act: &ArrayD<f32>) -> Result<Step> {
        self.count += 1;
        let info = Record::from_slice(&[("task_reward", RecordValue::Scalar(act.sum()))]);
        Ok(Step::new(
            self.obs(),
            act.sum(),
            self.count >= self.limit,
            false,
            info,
        ))
    }

    fn observation_space(&self) -> &DictSpace {
        &self.obs_space
    }

    fn action_space(&self) -> &BoxSpace {
        &self.act_space
    }

    fn max_episode_steps(&self) -> usize {
        self.limit
    }
}

#[test]
fn test_rollout_collects_transitions() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut env: Box<dyn Env> = Box::new(CounterEnv::new(5));
    let mut policy = |_: &ObsDict| arr1(&[0.25f32, 0.25]).into_dyn();
    let mut recorder = BufferedRecorder::new();
    let transitions = rollout(&mut env, &mut policy, Some(42), &mut recorder)?;

    assert_eq!(transitions.len(), 5);
    assert_eq!(recorder.len(), 5);

    // Each transition carries the observation the action was taken on.
    for (i, t) in transitions.iter().enumerate() {
        assert_eq!(t.obs["low_dim_state"][[0]], i as f32);
        assert_eq!(t.reward, 0.5);
        assert_eq!(t.info.get_scalar("task_reward")?, 0.5);
    }
    assert!(transitions[4].is_terminated);
    assert!(!transitions[3].is_terminated);

    let steps: Vec<f32> = recorder
        .iter()
        .map(|r| r.get_scalar("step").unwrap())
        .collect();
    assert_eq!(steps, vec![0.0, 1.0, 2.0, 3.0, 4.0]);

    Ok(())
}

#[test]
fn test_rollout_stops_at_first_terminal_step() -> Result<()> {
    let mut env = CounterEnv::new(1);
    let mut policy = |_: &ObsDict| arr1(&[1.0f32, -1.0]).into_dyn();
    let transitions = rollout(&mut env, &mut policy, None, &mut NullRecorder {})?;

    assert_eq!(transitions.len(), 1);
    assert!(transitions[0].is_terminated);
    assert_eq!(transitions[0].reward, 0.0);
    Ok(())
}
