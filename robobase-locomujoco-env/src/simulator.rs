//! Interface of locomotion simulators.
use crate::LocoMujocoConfig;
use anyhow::Result;
use ndarray::{Array1, Array2, Array3, ArrayD};
use robobase_core::record::Record;

/// Output of [`LocoSimulator::step`].
#[derive(Debug, Clone)]
pub struct SimStep {
    /// State after the step.
    pub obs: Array1<f32>,

    /// Task reward.
    pub reward: f32,

    /// The episode ended in a terminal state.
    pub is_terminated: bool,

    /// The episode was cut off.
    pub is_truncated: bool,

    /// Information of the simulator, including reward terms other than the task
    /// reward.
    pub info: Record,
}

/// Transitions recorded with a simulator, row `i` of each field belonging to the
/// same transition.
#[derive(Debug, Clone)]
pub struct TrajDataset {
    /// States, `(N, state_dim)`.
    pub states: Array2<f32>,

    /// Raw actions, `(N, action_dim)`.
    pub actions: Array2<f32>,

    /// Rewards, `(N)`.
    pub rewards: Array1<f32>,

    /// `1` for absorbing states, `(N)`.
    pub absorbing: Array1<f32>,

    /// `1` for the last transition of a trajectory, `(N)`.
    pub last: Array1<f32>,

    /// Next states, `(N, state_dim)`.
    pub next_states: Array2<f32>,
}

impl TrajDataset {
    /// The number of transitions.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Returns `true` if there is no transition.
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

/// A locomotion simulator with a recorded dataset of expert trajectories.
pub trait LocoSimulator {
    /// Builds the simulator of the configured task.
    ///
    /// Frames are rendered with `config.visual_observation_shape`.
    fn build(config: &LocoMujocoConfig) -> Result<Self>
    where
        Self: Sized;

    /// Resets the simulation.
    fn reset(&mut self, seed: Option<u64>) -> Result<(Array1<f32>, Record)>;

    /// Performs a simulation step with a raw action.
    fn step(&mut self, act: &ArrayD<f32>) -> Result<SimStep>;

    /// Renders the current frame, `(height, width, 3)`.
    fn render(&mut self) -> Result<Array3<u8>>;

    /// Returns the recorded dataset of the task.
    fn create_dataset(&mut self) -> Result<TrajDataset>;

    /// Lower and upper bounds of states.
    fn observation_bounds(&self) -> (Vec<f32>, Vec<f32>);

    /// Lower and upper bounds of raw actions.
    fn action_bounds(&self) -> (Vec<f32>, Vec<f32>);
}
