//! Builds wrapped environments and demonstrations.
use crate::{
    compute_action_stats, get_traj_dataset, rescale_demo_actions,
    wrappers::{
        ActionSequence, AppendDemoInfo, FrameStack, OnehotTime, RescaleFromTanh,
        RescaleFromTanhWithMinMax, TimeLimit,
    },
    ActionStats, Demo, DemoEnv, LocoMujoco, LocoMujocoConfig, LocoMujocoError, LocoSimulator,
};
use anyhow::Result;
use log::info;
use ndarray::{ArrayD, IxDyn};
use robobase_core::{BoxSpace, DictSpace, Env, Transition};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    marker::PhantomData,
    path::Path,
};

/// Episode length of the simulator; other lengths add a [`TimeLimit`].
const DEFAULT_EPISODE_LENGTH: usize = 1000;

/// Configuration of [`LocoMujocoEnvFactory`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EnvFactoryConfig {
    /// Configuration of the environment.
    pub env: LocoMujocoConfig,

    /// The number of demonstrations. If positive, actions are rescaled with the
    /// statistics of the demonstrations.
    pub demos: usize,

    /// Margin of the min/max action rescaling.
    pub min_max_margin: f32,

    /// Adds a one-hot time observation.
    pub use_onehot_time_and_no_bootstrap: bool,

    /// The number of stacked frames.
    pub frame_stack: usize,

    /// Episode length in simulator steps.
    pub episode_length: usize,

    /// The number of actions taken per environment step.
    pub action_sequence: usize,

    /// The number of training environments.
    pub num_train_envs: usize,

    /// Orders demonstrations by increasing return.
    pub sort_demos: bool,
}

impl Default for EnvFactoryConfig {
    fn default() -> Self {
        Self {
            env: LocoMujocoConfig::default(),
            demos: 0,
            min_max_margin: 0.0,
            use_onehot_time_and_no_bootstrap: false,
            frame_stack: 1,
            episode_length: DEFAULT_EPISODE_LENGTH,
            action_sequence: 1,
            num_train_envs: 1,
            sort_demos: false,
        }
    }
}

impl EnvFactoryConfig {
    /// Sets the configuration of the environment.
    pub fn env(mut self, v: LocoMujocoConfig) -> Self {
        self.env = v;
        self
    }

    /// Sets the number of demonstrations.
    pub fn demos(mut self, v: usize) -> Self {
        self.demos = v;
        self
    }

    /// Sets the margin of the min/max action rescaling.
    pub fn min_max_margin(mut self, v: f32) -> Self {
        self.min_max_margin = v;
        self
    }

    /// Adds a one-hot time observation.
    pub fn use_onehot_time_and_no_bootstrap(mut self, v: bool) -> Self {
        self.use_onehot_time_and_no_bootstrap = v;
        self
    }

    /// Sets the number of stacked frames.
    pub fn frame_stack(mut self, v: usize) -> Self {
        self.frame_stack = v;
        self
    }

    /// Sets the episode length.
    pub fn episode_length(mut self, v: usize) -> Self {
        self.episode_length = v;
        self
    }

    /// Sets the length of action sequences.
    pub fn action_sequence(mut self, v: usize) -> Self {
        self.action_sequence = v;
        self
    }

    /// Sets the number of training environments.
    pub fn num_train_envs(mut self, v: usize) -> Self {
        self.num_train_envs = v;
        self
    }

    /// Orders demonstrations by return.
    pub fn sort_demos(mut self, v: bool) -> Self {
        self.sort_demos = v;
        self
    }

    /// Constructs [`EnvFactoryConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of LocoMujocoEnvFactory from {:?}", path_);
        Ok(b)
    }

    /// Saves [`EnvFactoryConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of LocoMujocoEnvFactory into {:?}", path_);
        Ok(())
    }
}

/// Builds [`LocoMujoco`] environments with the wrappers of the configuration and
/// keeps the demonstrations of the task.
///
/// Wrappers are applied in this order: action rescaling, one-hot time, frame
/// stacking, time limit, action sequence and demo info. Frame stacking and action
/// sequences are skipped for the environment replaying demonstrations.
pub struct LocoMujocoEnvFactory<S: LocoSimulator + 'static> {
    config: EnvFactoryConfig,
    demos: Vec<Demo>,
    action_stats: Option<ActionStats>,
    raw_spaces: Option<(BoxSpace, DictSpace)>,
    phantom: PhantomData<S>,
}

impl<S: LocoSimulator + 'static> LocoMujocoEnvFactory<S> {
    /// Constructs the factory.
    pub fn new(config: EnvFactoryConfig) -> Self {
        Self {
            config,
            demos: vec![],
            action_stats: None,
            raw_spaces: None,
            phantom: PhantomData,
        }
    }

    /// Configuration of the factory.
    pub fn config(&self) -> &EnvFactoryConfig {
        &self.config
    }

    /// Statistics of demonstrated actions, available after
    /// [`collect_or_fetch_demos`](Self::collect_or_fetch_demos).
    pub fn action_stats(&self) -> Option<&ActionStats> {
        self.action_stats.as_ref()
    }

    /// Demonstrations collected so far.
    pub fn demos(&self) -> &[Demo] {
        &self.demos
    }

    fn create_env(&self) -> Result<LocoMujoco<S>> {
        LocoMujoco::<S>::build(self.config.env.clone())
    }

    fn keep_raw_spaces(&mut self, env: &LocoMujoco<S>) {
        self.raw_spaces = Some((
            env.action_space().clone(),
            env.observation_space().clone(),
        ));
    }

    /// Applies the configured wrappers to `env`.
    pub fn wrap_env(&self, env: Box<dyn Env>, demo_env: bool) -> Result<Box<dyn Env>> {
        let cfg = &self.config;
        let mut env: Box<dyn Env> = match cfg.demos > 0 {
            true => {
                let stats = self
                    .action_stats
                    .clone()
                    .ok_or(LocoMujocoError::MissingActionStats)?;
                Box::new(RescaleFromTanhWithMinMax::new(env, stats, cfg.min_max_margin))
            }
            false => Box::new(RescaleFromTanh::new(env)),
        };
        if cfg.use_onehot_time_and_no_bootstrap {
            let len = cfg.episode_length / cfg.env.action_repeat.max(1);
            env = Box::new(OnehotTime::new(env, len));
        }
        if !demo_env {
            env = Box::new(FrameStack::new(env, cfg.frame_stack)?);
        }
        if cfg.episode_length != DEFAULT_EPISODE_LENGTH {
            env = Box::new(TimeLimit::new(env, cfg.episode_length));
        }
        if !demo_env {
            env = Box::new(ActionSequence::new(env, cfg.action_sequence)?);
        }
        Ok(Box::new(AppendDemoInfo::new(env)))
    }

    /// Builds the training environments.
    pub fn make_train_env(&self) -> Result<Vec<Box<dyn Env>>> {
        (0..self.config.num_train_envs)
            .map(|_| {
                let env = self.create_env()?;
                self.wrap_env(Box::new(env), false)
            })
            .collect()
    }

    /// Builds the evaluation environment.
    ///
    /// The spaces of the unwrapped environment are kept for replaying
    /// demonstrations.
    pub fn make_eval_env(&mut self) -> Result<Box<dyn Env>> {
        let env = self.create_env()?;
        self.keep_raw_spaces(&env);
        self.wrap_env(Box::new(env), false)
    }

    /// Reads demonstrations from the dataset of the task and computes the statistics
    /// of their actions.
    ///
    /// `None` takes all demonstrations.
    pub fn collect_or_fetch_demos(&mut self, num_demos: Option<usize>) -> Result<()> {
        let mut env = self.create_env()?;
        self.keep_raw_spaces(&env);
        let mut demos = get_traj_dataset(&mut env, self.config.sort_demos)?;
        if let Some(n) = num_demos {
            demos.truncate(n);
        }
        self.action_stats = Some(compute_action_stats(&demos)?);
        info!(
            "Collected {} demonstrations with {} steps",
            demos.len(),
            demos.iter().map(|d| d.len()).sum::<usize>()
        );
        self.demos = demos;
        Ok(())
    }

    /// Rescales the demonstrated actions into the action space of the wrapped
    /// environments.
    pub fn post_collect_or_fetch_demos(&mut self) -> Result<()> {
        let stats = self
            .action_stats
            .as_ref()
            .ok_or(LocoMujocoError::MissingActionStats)?;
        let demos = std::mem::take(&mut self.demos);
        self.demos = rescale_demo_actions(demos, stats, self.config.min_max_margin)?;
        Ok(())
    }

    /// Replays each demonstration through the wrapped demo environment.
    ///
    /// The action of each transition is the demonstrated action.
    pub fn load_demos(&self) -> Result<Vec<Vec<Transition>>> {
        if self.demos.is_empty() {
            return Err(LocoMujocoError::MissingDemos.into());
        }
        let (act_space, obs_space) = self
            .raw_spaces
            .clone()
            .ok_or(LocoMujocoError::MissingDemos)?;

        let mut trajs = Vec::with_capacity(self.demos.len());
        for demo in self.demos.iter() {
            let demo_env = DemoEnv::new(vec![demo.clone()], act_space.clone(), obs_space.clone())?;
            let mut env = self.wrap_env(Box::new(demo_env), true)?;
            let (mut obs, _) = env.reset(None)?;
            let actions = demo.actions()?;
            let mut traj = Vec::with_capacity(actions.len());
            for a in actions.into_iter() {
                let act = ArrayD::from_shape_vec(IxDyn(&act_space.shape), a)?;
                let step = env.step(&act)?;
                let next_obs = step.obs.clone();
                traj.push(Transition::from_step(obs, act, &step));
                obs = next_obs;
            }
            trajs.push(traj);
        }
        info!("Loaded {} demonstrations", trajs.len());
        Ok(trajs)
    }
}
