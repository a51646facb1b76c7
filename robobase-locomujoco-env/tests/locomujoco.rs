use anyhow::Result;
use ndarray::{arr1, Array1, Array2, Array3, ArrayD, IxDyn};
use robobase_core::{record::Record, Env};
use robobase_locomujoco_env::{
    get_traj_dataset, EnvFactoryConfig, LocoMujoco, LocoMujocoConfig, LocoMujocoEnvFactory,
    LocoMujocoError, LocoSimulator, RewardMode, RewardTermType, SimStep, TrajDataset,
};

const HORIZON: usize = 5;

/// Moves a point by the action. The task reward is the first action element and
/// episodes terminate after [`HORIZON`] steps.
struct ToySim {
    t: usize,
    state: Array1<f32>,
    frame_shape: (usize, usize),
}

impl LocoSimulator for ToySim {
    fn build(config: &LocoMujocoConfig) -> Result<Self> {
        Ok(Self {
            t: 0,
            state: Array1::zeros(2),
            frame_shape: config.visual_observation_shape,
        })
    }

    fn reset(&mut self, _seed: Option<u64>) -> Result<(Array1<f32>, Record)> {
        self.t = 0;
        self.state = Array1::zeros(2);
        Ok((self.state.clone(), Record::empty()))
    }

    fn step(&mut self, act: &ArrayD<f32>) -> Result<SimStep> {
        self.t += 1;
        let act: Vec<f32> = act.iter().copied().collect();
        self.state[0] += act[0];
        self.state[1] += act[1];
        Ok(SimStep {
            obs: self.state.clone(),
            reward: act[0],
            is_terminated: self.t >= HORIZON,
            is_truncated: false,
            info: Record::empty(),
        })
    }

    fn render(&mut self) -> Result<Array3<u8>> {
        let (h, w) = self.frame_shape;
        Ok(Array3::from_elem((h, w, 3), self.t as u8))
    }

    /// A short trajectory with return 3 and a 999-step one with return 0.
    fn create_dataset(&mut self) -> Result<TrajDataset> {
        let long = 999;
        let n = 3 + long;
        let mut actions = Array2::from_elem((n, 2), 0.5f32);
        actions.row_mut(0).assign(&arr1(&[1.0, -1.0]));
        actions.row_mut(1).assign(&arr1(&[2.0, 0.0]));
        actions.row_mut(2).assign(&arr1(&[3.0, 1.0]));
        let rewards = Array1::from_shape_fn(n, |i| if i < 3 { 1.0 } else { 0.0 });
        let last = Array1::from_shape_fn(n, |i| if i == 2 || i == n - 1 { 1.0 } else { 0.0 });
        let states = Array2::from_shape_fn((n, 2), |(i, _)| i as f32);
        let next_states = Array2::from_shape_fn((n, 2), |(i, _)| i as f32 + 1.0);
        Ok(TrajDataset {
            states,
            actions,
            rewards,
            absorbing: Array1::zeros(n),
            last,
            next_states,
        })
    }

    fn observation_bounds(&self) -> (Vec<f32>, Vec<f32>) {
        (vec![-100.0; 2], vec![100.0; 2])
    }

    fn action_bounds(&self) -> (Vec<f32>, Vec<f32>) {
        (vec![-2.0; 2], vec![2.0; 2])
    }
}

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn act(v: &[f32]) -> Result<ArrayD<f32>> {
    Ok(ArrayD::from_shape_vec(IxDyn(&[v.len()]), v.to_vec())?)
}

#[test]
fn test_action_repeat() -> Result<()> {
    init();
    let mut env = LocoMujoco::<ToySim>::build(LocoMujocoConfig::default().action_repeat(2))?;
    let (obs, info) = env.reset(None)?;
    assert_eq!(obs["low_dim_state"].shape(), &[2]);
    assert_eq!(info.get_scalar("task_reward")?, 0.0);
    assert_eq!(info.get_scalar("Reward/target_velocity")?, 0.0);

    let step = env.step(&act(&[1.0, 0.5])?)?;
    assert_eq!(step.reward, 2.0);
    assert_eq!(step.info.get_scalar("task_reward")?, 2.0);
    assert_eq!(step.info.get_scalar("Reward/target_velocity")?, 2.0);
    assert_eq!(step.obs["low_dim_state"].as_slice().unwrap(), &[2.0, 1.0]);
    assert!(!step.is_done());
    Ok(())
}

#[test]
fn test_action_repeat_stops_at_episode_end() -> Result<()> {
    init();
    let mut env = LocoMujoco::<ToySim>::build(LocoMujocoConfig::default().action_repeat(3))?;
    env.reset(None)?;
    env.step(&act(&[1.0, 0.0])?)?;
    // Only two simulator steps remain.
    let step = env.step(&act(&[1.0, 0.0])?)?;
    assert_eq!(step.reward, 2.0);
    assert!(step.is_terminated && !step.is_truncated);
    Ok(())
}

#[test]
fn test_initial_reward_mode() -> Result<()> {
    init();
    let config = LocoMujocoConfig::default()
        .reward_mode(RewardMode::Initial)
        .reward_term_type(RewardTermType::Initial)
        .initial_terms(vec!["target_velocity".to_string()]);
    let mut env = LocoMujoco::<ToySim>::build(config)?;
    assert_eq!(env.reward_terms(), &["Reward/target_velocity".to_string()]);
    env.reset(None)?;
    let step = env.step(&act(&[0.5, 0.0])?)?;
    assert!((step.reward - 5.0).abs() < 1e-6);
    assert_eq!(step.info.get_scalar("task_reward")?, 0.5);

    let config = LocoMujocoConfig::default().initial_terms(vec!["jump".to_string()]);
    let err = LocoMujoco::<ToySim>::build(config).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<LocoMujocoError>(),
        Some(LocoMujocoError::UnknownRewardTerm(_))
    ));
    Ok(())
}

#[test]
fn test_pixel_observations() -> Result<()> {
    init();
    let config = LocoMujocoConfig::default()
        .from_pixels(true)
        .use_rlhf(true)
        .visual_observation_shape(4, 6);
    let mut env = LocoMujoco::<ToySim>::build(config)?;
    assert_eq!(env.observation_space().get("rgb").unwrap().shape, vec![3, 4, 6]);
    assert_eq!(
        env.observation_space().get("query_pixels_pixels").unwrap().shape,
        vec![6, 4, 3]
    );

    let (obs, _) = env.reset(None)?;
    assert!(!obs.contains_key("low_dim_state"));
    assert_eq!(obs["rgb"].shape(), &[3, 4, 6]);
    assert_eq!(obs["query_pixels_pixels"].shape(), &[6, 4, 3]);

    let step = env.step(&act(&[0.0, 0.0])?)?;
    assert!(step.obs["rgb"].iter().all(|v| *v == 1.0));
    assert_eq!(env.render()?.shape(), &[6, 4, 3]);
    Ok(())
}

#[test]
fn test_unsupported_query_key() {
    init();
    let config = LocoMujocoConfig::default()
        .use_rlhf(true)
        .query_keys(vec!["depth".to_string()]);
    let err = LocoMujoco::<ToySim>::build(config).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<LocoMujocoError>(),
        Some(LocoMujocoError::UnsupportedQueryKey(k)) if k == "depth"
    ));
}

#[test]
fn test_traj_dataset() -> Result<()> {
    init();
    let mut env = LocoMujoco::<ToySim>::build(LocoMujocoConfig::default())?;
    let demos = get_traj_dataset(&mut env, false)?;
    assert_eq!(demos.len(), 2);
    assert_eq!(demos[0].len(), 3);
    assert_eq!(demos[1].len(), 999);
    assert_eq!(demos[0].reset_info.get_scalar("demo")?, 1.0);
    assert_eq!(demos[0].reset_obs["low_dim_state"].as_slice().unwrap(), &[0.0, 0.0]);

    let first = &demos[0].steps[0];
    assert_eq!(first.info.get_array1("demo_action")?, vec![1.0, -1.0]);
    assert_eq!(first.info.get_scalar("demo")?, 1.0);
    assert_eq!(first.obs["low_dim_state"].as_slice().unwrap(), &[1.0, 1.0]);
    assert!(demos[0].steps[2].is_terminated);
    // Cut by the time limit.
    assert!(!demos[1].steps[998].is_terminated);

    let sorted = get_traj_dataset(&mut env, true)?;
    assert_eq!(sorted[0].len(), 999);
    assert_eq!(sorted[1].episode_return(), 3.0);
    Ok(())
}

fn factory_config() -> EnvFactoryConfig {
    EnvFactoryConfig::default().demos(2).frame_stack(2)
}

#[test]
fn test_factory_env() -> Result<()> {
    init();
    let mut factory = LocoMujocoEnvFactory::<ToySim>::new(factory_config());
    assert!(factory.make_eval_env().is_err());

    factory.collect_or_fetch_demos(Some(2))?;
    let stats = factory.action_stats().unwrap();
    assert_eq!(stats.min, vec![0.5, -1.0]);
    assert_eq!(stats.max, vec![3.0, 1.0]);

    let mut env = factory.make_eval_env()?;
    assert_eq!(env.action_space().shape, vec![1, 2]);
    assert_eq!(env.action_space().low, vec![-1.0; 2]);
    assert_eq!(
        env.observation_space().get("low_dim_state").unwrap().shape,
        vec![2, 2]
    );

    let (obs, info) = env.reset(None)?;
    assert_eq!(obs["low_dim_state"].shape(), &[2, 2]);
    assert_eq!(info.get_scalar("demo")?, 0.0);

    // The middle of the tanh range maps to the middle of the demonstrated range.
    let step = env.step(&ArrayD::zeros(IxDyn(&[1, 2])))?;
    assert!((step.reward - 1.75).abs() < 1e-5);
    assert_eq!(step.info.get_scalar("demo")?, 0.0);

    assert_eq!(factory.make_train_env()?.len(), 1);
    Ok(())
}

#[test]
fn test_factory_without_demos() -> Result<()> {
    init();
    let config = EnvFactoryConfig::default().num_train_envs(3).episode_length(4);
    let factory = LocoMujocoEnvFactory::<ToySim>::new(config);
    assert!(factory.load_demos().is_err());

    let mut envs = factory.make_train_env()?;
    assert_eq!(envs.len(), 3);
    let env = &mut envs[0];
    env.reset(None)?;
    let a = ArrayD::zeros(IxDyn(&[1, 2]));
    for _ in 0..3 {
        assert!(!env.step(&a)?.is_done());
    }
    let step = env.step(&a)?;
    assert!(step.is_truncated);
    assert_eq!(env.max_episode_steps(), 4);
    Ok(())
}

#[test]
fn test_load_demos() -> Result<()> {
    init();
    let mut factory = LocoMujocoEnvFactory::<ToySim>::new(
        factory_config().use_onehot_time_and_no_bootstrap(true),
    );
    factory.collect_or_fetch_demos(None)?;
    factory.post_collect_or_fetch_demos()?;
    let demos = factory.load_demos()?;
    assert_eq!(demos.len(), 2);

    let traj = &demos[0];
    assert_eq!(traj.len(), 3);
    // Not stacked, but with time.
    assert_eq!(traj[0].obs["low_dim_state"].shape(), &[2]);
    assert_eq!(traj[0].obs["time"][[0]], 1.0);
    assert_eq!(traj[1].obs["low_dim_state"].as_slice().unwrap(), &[1.0, 1.0]);

    // Demonstrated actions are rescaled into [-1, 1] with min [0.5, -1], max [3, 1].
    let a: Vec<f32> = traj[0].act.iter().copied().collect();
    assert!((a[0] + 0.6).abs() < 1e-5 && (a[1] + 1.0).abs() < 1e-5);
    assert_eq!(traj[0].reward, 1.0);
    assert_eq!(traj[0].info.get_scalar("demo")?, 1.0);
    assert!(traj[2].is_terminated);
    assert!(!demos[1][998].is_terminated);
    Ok(())
}
