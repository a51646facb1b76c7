//! [LocoMuJoCo](https://github.com/robfiras/loco-mujoco) locomotion environments for RoboBase.
//!
//! The physics simulation is behind the [`LocoSimulator`] trait. [`LocoMujoco`] turns a
//! simulator into an [`Env`](robobase_core::Env) with dictionary observations, action
//! repeat and a choice of reward terms, and the wrappers in [`wrappers`] add action
//! rescaling, time features, frame stacking and action sequences on top of it.
//!
//! Demonstrations are read from the simulator's recorded dataset with
//! [`get_traj_dataset`], rescaled into the `[-1, 1]` action space with statistics from
//! [`compute_action_stats`], and replayed through a [`DemoEnv`].
//! [`LocoMujocoEnvFactory`] ties these steps together.
//!
//! ```no_run
//! # use anyhow::Result;
//! use robobase_core::Env;
//! use robobase_locomujoco_env::{EnvFactoryConfig, LocoMujocoEnvFactory, LocoSimulator};
//!
//! fn run<S: LocoSimulator + 'static>() -> Result<()> {
//!     let config = EnvFactoryConfig::default().demos(10);
//!     let mut factory = LocoMujocoEnvFactory::<S>::new(config);
//!
//!     // Action statistics of the demonstrations are needed to build environments.
//!     factory.collect_or_fetch_demos(Some(10))?;
//!     factory.post_collect_or_fetch_demos()?;
//!
//!     let mut env = factory.make_eval_env()?;
//!     let (_obs, _info) = env.reset(Some(42))?;
//!     let demos = factory.load_demos()?;
//!     println!("{} demonstrations", demos.len());
//!     Ok(())
//! }
//! ```
mod config;
mod dataset;
mod env;
mod error;
mod factory;
mod simulator;
pub mod wrappers;
pub use config::{LocoMujocoConfig, RenderMode, RewardMode, RewardTermType};
pub use dataset::{
    compute_action_stats, get_traj_dataset, rescale_demo_actions, split_into_trajectories,
    ActionStats, Demo, DemoEnv,
};
pub use env::LocoMujoco;
pub use error::LocoMujocoError;
pub use factory::{EnvFactoryConfig, LocoMujocoEnvFactory};
pub use simulator::{LocoSimulator, SimStep, TrajDataset};
