//! Configuration of [`MarkovianReward`](super::MarkovianReward).
use super::ensemble::RewardEnsembleConfig;
use crate::{
    model::{RewardHead, ViewEncoder, ViewFusion},
    opt::{LrSchedulerConfig, OptimizerConfig},
    Device,
};
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`MarkovianReward`](super::MarkovianReward).
#[derive(Deserialize, Serialize)]
pub struct MarkovianRewardConfig<H, E, F>
where
    H: RewardHead,
    E: ViewEncoder,
    F: ViewFusion,
{
    /// Configuration of the reward heads and their optimizer.
    pub ensemble_config: RewardEnsembleConfig<H::Config>,

    /// Configuration of the view encoder, required with pixel observations.
    pub encoder_config: Option<E::Config>,

    /// Configuration of the view fusion module, required with more than one view.
    pub fusion_config: Option<F::Config>,

    /// Optimizer of the view encoder.
    pub encoder_opt_config: OptimizerConfig,

    /// Optimizer of the view fusion module, used only if the module has parameters.
    pub fusion_opt_config: OptimizerConfig,

    /// Learning rate schedule of the reward heads.
    pub lr_scheduler_config: Option<LrSchedulerConfig>,

    /// The number of timesteps processed at once in [`compute_reward`].
    ///
    /// [`compute_reward`]: crate::RewardMethod::compute_reward
    pub compute_batch_size: usize,

    /// If `true`, images are randomly shifted in training.
    pub use_augmentation: bool,

    /// Padding of the random shift augmentation.
    pub aug_pad: usize,

    /// The number of random crops per segment. Zero disables cropping.
    pub data_aug_ratio: usize,

    /// Label smoothing margin of the preference loss.
    pub label_margin: f64,

    /// If `false`, [`compute_reward`] leaves its input unchanged.
    ///
    /// [`compute_reward`]: crate::RewardMethod::compute_reward
    pub activated: bool,

    /// Seed of the random number generator for augmentation.
    pub seed: u64,

    /// With 2 or more, parameter statistics are added to the training record.
    pub record_verbose_level: usize,

    /// Device of the models.
    pub device: Option<Device>,
}

impl<H, E, F> Clone for MarkovianRewardConfig<H, E, F>
where
    H: RewardHead,
    E: ViewEncoder,
    F: ViewFusion,
{
    fn clone(&self) -> Self {
        Self {
            ensemble_config: self.ensemble_config.clone(),
            encoder_config: self.encoder_config.clone(),
            fusion_config: self.fusion_config.clone(),
            encoder_opt_config: self.encoder_opt_config.clone(),
            fusion_opt_config: self.fusion_opt_config.clone(),
            lr_scheduler_config: self.lr_scheduler_config.clone(),
            compute_batch_size: self.compute_batch_size,
            use_augmentation: self.use_augmentation,
            aug_pad: self.aug_pad,
            data_aug_ratio: self.data_aug_ratio,
            label_margin: self.label_margin,
            activated: self.activated,
            seed: self.seed,
            record_verbose_level: self.record_verbose_level,
            device: self.device,
        }
    }
}

impl<H, E, F> Default for MarkovianRewardConfig<H, E, F>
where
    H: RewardHead,
    E: ViewEncoder,
    F: ViewFusion,
{
    fn default() -> Self {
        Self {
            ensemble_config: RewardEnsembleConfig::default(),
            encoder_config: None,
            fusion_config: None,
            encoder_opt_config: OptimizerConfig::adamw(1e-5, 1e-4),
            fusion_opt_config: OptimizerConfig::Adam { lr: 3e-4 },
            lr_scheduler_config: None,
            compute_batch_size: 32,
            use_augmentation: false,
            aug_pad: 4,
            data_aug_ratio: 0,
            label_margin: 0.0,
            activated: true,
            seed: 42,
            record_verbose_level: 0,
            device: None,
        }
    }
}

impl<H, E, F> MarkovianRewardConfig<H, E, F>
where
    H: RewardHead,
    E: ViewEncoder,
    F: ViewFusion,
{
    /// Configuration of the reward heads.
    pub fn ensemble_config(mut self, v: RewardEnsembleConfig<H::Config>) -> Self {
        self.ensemble_config = v;
        self
    }

    /// Configuration of the view encoder.
    pub fn encoder_config(mut self, v: E::Config) -> Self {
        self.encoder_config = Some(v);
        self
    }

    /// Configuration of the view fusion module.
    pub fn fusion_config(mut self, v: F::Config) -> Self {
        self.fusion_config = Some(v);
        self
    }

    /// Learning rate of the reward heads and of the view fusion module.
    pub fn lr(mut self, v: f64) -> Self {
        self.ensemble_config.opt_config = self.ensemble_config.opt_config.learning_rate(v);
        self.fusion_opt_config = self.fusion_opt_config.learning_rate(v);
        self
    }

    /// Learning rate of the view encoder.
    pub fn lr_backbone(mut self, v: f64) -> Self {
        self.encoder_opt_config = self.encoder_opt_config.learning_rate(v);
        self
    }

    /// Cosine learning rate schedule with warmup over `num_train_steps` updates.
    pub fn adaptive_lr(mut self, num_train_steps: usize) -> Self {
        self.lr_scheduler_config = Some(LrSchedulerConfig::cosine(num_train_steps));
        self
    }

    /// Sets the learning rate schedule.
    pub fn lr_scheduler_config(mut self, v: LrSchedulerConfig) -> Self {
        self.lr_scheduler_config = Some(v);
        self
    }

    /// The number of timesteps processed at once in inference.
    pub fn compute_batch_size(mut self, v: usize) -> Self {
        self.compute_batch_size = v;
        self
    }

    /// Enables random shifts of images in training.
    pub fn use_augmentation(mut self, v: bool) -> Self {
        self.use_augmentation = v;
        self
    }

    /// The number of random crops per segment.
    pub fn data_aug_ratio(mut self, v: usize) -> Self {
        self.data_aug_ratio = v;
        self
    }

    /// Label smoothing margin.
    pub fn label_margin(mut self, v: f64) -> Self {
        self.label_margin = v;
        self
    }

    /// Activates the reward method.
    pub fn activated(mut self, v: bool) -> Self {
        self.activated = v;
        self
    }

    /// Random seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Verbosity of the training record.
    pub fn record_verbose_level(mut self, v: usize) -> Self {
        self.record_verbose_level = v;
        self
    }

    /// Device.
    pub fn device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    /// Constructs [`MarkovianRewardConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of Markovian reward from {:?}", path_);
        Ok(b)
    }

    /// Saves [`MarkovianRewardConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of Markovian reward into {:?}", path_);
        Ok(())
    }
}
