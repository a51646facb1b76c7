//! Configuration of [`LocoMujoco`](crate::LocoMujoco).
use crate::LocoMujocoError;
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    convert::TryFrom,
    fmt,
    fs::File,
    io::{BufReader, Write},
    path::Path,
    str::FromStr,
};

/// How the simulator renders frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum RenderMode {
    /// Frames are returned as arrays.
    RgbArray,

    /// Frames are shown in a viewer.
    Human,
}

/// Reward returned by [`LocoMujoco::step`](crate::LocoMujoco).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum RewardMode {
    /// The task reward of the simulator.
    Dense,

    /// Weighted sum of the initial reward terms, each scaled by its upper bound.
    Initial,
}

/// Reward terms reported in the step info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum RewardTermType {
    /// All reward terms of the environment.
    All,

    /// Only the initial reward terms.
    Initial,
}

macro_rules! string_enum {
    ($t:ident, $err:ident, $($variant:ident => $name:literal),+) => {
        impl FromStr for $t {
            type Err = LocoMujocoError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    _ => Err(LocoMujocoError::$err(s.to_string())),
                }
            }
        }

        impl TryFrom<String> for $t {
            type Error = LocoMujocoError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$t> for String {
            fn from(v: $t) -> Self {
                v.to_string()
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $name),)+
                }
            }
        }
    };
}

string_enum!(RenderMode, UnsupportedRenderMode, RgbArray => "rgb_array", Human => "human");
string_enum!(RewardMode, UnsupportedRewardMode, Dense => "dense", Initial => "initial");
string_enum!(RewardTermType, UnsupportedRewardTermType, All => "all", Initial => "initial");

/// Configuration of [`LocoMujoco`](crate::LocoMujoco).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LocoMujocoConfig {
    /// Name of the task, e.g. `UnitreeH1.run`.
    pub task_name: String,

    /// If `true`, the observation is the rendered frame under `rgb` instead of the
    /// state under `low_dim_state`.
    pub from_pixels: bool,

    /// The number of simulator steps per environment step.
    pub action_repeat: usize,

    /// `(height, width)` of rendered frames.
    pub visual_observation_shape: (usize, usize),

    /// Render mode of the simulator.
    pub render_mode: RenderMode,

    /// Passed to the simulator.
    pub use_absorbing_states: bool,

    /// If `true`, frames for preference queries are added to observations.
    pub use_rlhf: bool,

    /// Views rendered for preference queries. Only `pixels` is supported.
    pub query_keys: Vec<String>,

    /// Reward returned by steps.
    pub reward_mode: RewardMode,

    /// Reward terms reported in the step info.
    pub reward_term_type: RewardTermType,

    /// Initial reward terms without the `Reward/` prefix. Empty means all terms.
    pub initial_terms: Vec<String>,
}

impl Default for LocoMujocoConfig {
    fn default() -> Self {
        Self {
            task_name: "UnitreeH1.run".to_string(),
            from_pixels: false,
            action_repeat: 1,
            visual_observation_shape: (84, 84),
            render_mode: RenderMode::RgbArray,
            use_absorbing_states: false,
            use_rlhf: false,
            query_keys: vec!["pixels".to_string()],
            reward_mode: RewardMode::Dense,
            reward_term_type: RewardTermType::All,
            initial_terms: vec![],
        }
    }
}

impl LocoMujocoConfig {
    /// Sets the task name.
    pub fn task_name(mut self, v: impl Into<String>) -> Self {
        self.task_name = v.into();
        self
    }

    /// Uses pixel observations.
    pub fn from_pixels(mut self, v: bool) -> Self {
        self.from_pixels = v;
        self
    }

    /// Sets action repeat.
    pub fn action_repeat(mut self, v: usize) -> Self {
        self.action_repeat = v;
        self
    }

    /// Sets `(height, width)` of rendered frames.
    pub fn visual_observation_shape(mut self, height: usize, width: usize) -> Self {
        self.visual_observation_shape = (height, width);
        self
    }

    /// Adds query frames to observations.
    pub fn use_rlhf(mut self, v: bool) -> Self {
        self.use_rlhf = v;
        self
    }

    /// Sets the query views.
    pub fn query_keys(mut self, v: Vec<String>) -> Self {
        self.query_keys = v;
        self
    }

    /// Sets the reward mode.
    pub fn reward_mode(mut self, v: RewardMode) -> Self {
        self.reward_mode = v;
        self
    }

    /// Sets the reward term type.
    pub fn reward_term_type(mut self, v: RewardTermType) -> Self {
        self.reward_term_type = v;
        self
    }

    /// Sets the initial reward terms.
    pub fn initial_terms(mut self, v: Vec<String>) -> Self {
        self.initial_terms = v;
        self
    }

    /// Constructs [`LocoMujocoConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of LocoMujoco from {:?}", path_);
        Ok(b)
    }

    /// Saves [`LocoMujocoConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of LocoMujoco into {:?}", path_);
        Ok(())
    }
}
