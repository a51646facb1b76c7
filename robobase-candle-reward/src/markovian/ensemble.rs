//! Ensemble of reward heads.
use crate::{
    model::{RewardHead, RewardHeadInput, RewardInputShapes},
    opt::{Optimizer, OptimizerConfig},
    util::param_stats,
    RewardError,
};
use anyhow::{Context, Result};
use candle_core::{backprop::GradStore, DType::F32, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use robobase_core::record::Record;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`RewardEnsemble`].
pub struct RewardEnsembleConfig<C> {
    /// The number of reward heads.
    pub num_reward_models: usize,

    /// Configuration of each reward head.
    pub head_config: Option<C>,

    /// The number of preference labels, i.e., outputs of each head.
    pub num_labels: usize,

    /// If `true`, rewards are passed through `tanh`.
    pub apply_final_layer_tanh: bool,

    /// Configuration of the optimizer.
    pub opt_config: OptimizerConfig,
}

impl<C> Default for RewardEnsembleConfig<C> {
    fn default() -> Self {
        Self {
            num_reward_models: 1,
            head_config: None,
            num_labels: 1,
            apply_final_layer_tanh: false,
            opt_config: OptimizerConfig::adamw(3e-4, 1e-4),
        }
    }
}

impl<C> RewardEnsembleConfig<C>
where
    C: DeserializeOwned + Serialize,
{
    /// Sets the number of reward heads.
    pub fn num_reward_models(mut self, v: usize) -> Self {
        self.num_reward_models = v;
        self
    }

    /// Sets the configuration of reward heads.
    pub fn head_config(mut self, v: C) -> Self {
        self.head_config = Some(v);
        self
    }

    /// Sets the number of preference labels.
    pub fn num_labels(mut self, v: usize) -> Self {
        self.num_labels = v;
        self
    }

    /// Bounds rewards to `(-1, 1)` with `tanh`.
    pub fn apply_final_layer_tanh(mut self, v: bool) -> Self {
        self.apply_final_layer_tanh = v;
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Constructs [`RewardEnsembleConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`RewardEnsembleConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Independently parametrized reward heads sharing an architecture.
///
/// All heads live in a single [`VarMap`], each under its own prefix `reward{i}`, and
/// are trained by a single optimizer.
pub struct RewardEnsemble<H: RewardHead> {
    varmap: VarMap,
    heads: Vec<H>,
    num_labels: usize,
    apply_final_layer_tanh: bool,
    opt: Optimizer,
}

impl<H: RewardHead> RewardEnsemble<H> {
    /// Constructs [`RewardEnsemble`].
    pub fn build(
        config: RewardEnsembleConfig<H::Config>,
        input_shapes: &RewardInputShapes,
        device: &Device,
    ) -> Result<Self> {
        let head_config = config
            .head_config
            .context("head_config of the reward ensemble is not set.")?;
        anyhow::ensure!(
            config.num_reward_models > 0,
            "The reward ensemble needs at least one member"
        );

        let varmap = VarMap::new();
        let heads = (0..config.num_reward_models)
            .map(|ix| {
                if device.is_cuda() {
                    device.set_seed((ix + 10) as _)?;
                }
                let vb = VarBuilder::from_varmap(&varmap, F32, device)
                    .set_prefix(format!("reward{}", ix));
                H::build(vb, head_config.clone(), input_shapes, config.num_labels)
            })
            .collect::<Result<Vec<_>>>()?;
        let opt = config.opt_config.build(varmap.all_vars())?;

        Ok(Self {
            varmap,
            heads,
            num_labels: config.num_labels,
            apply_final_layer_tanh: config.apply_final_layer_tanh,
            opt,
        })
    }

    /// The number of heads.
    pub fn len(&self) -> usize {
        self.heads.len()
    }

    /// Always `false`; an ensemble has at least one head.
    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    /// The number of preference labels.
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    /// Rewards of head `member`, `(N, num_labels)`.
    pub fn forward(&self, input: &RewardHeadInput, member: usize) -> Result<Tensor> {
        let head = self.heads.get(member).ok_or(RewardError::MemberOutOfRange {
            index: member,
            size: self.heads.len(),
        })?;
        let r = head.forward(input)?;
        match self.apply_final_layer_tanh {
            true => Ok(r.tanh()?),
            false => Ok(r),
        }
    }

    /// Mean over the outputs of all heads and labels, `(N, 1)`.
    ///
    /// The `num_labels` columns of every head are concatenated before averaging.
    pub fn forward_mean(&self, input: &RewardHeadInput) -> Result<Tensor> {
        let rs = (0..self.heads.len())
            .map(|ix| self.forward(input, ix))
            .collect::<Result<Vec<_>>>()?;
        Ok(Tensor::cat(&rs, 1)?.mean_keepdim(1)?)
    }

    /// Updates the heads with precomputed gradients.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.opt.step(grads)
    }

    /// Current learning rate of the optimizer.
    pub fn learning_rate(&self) -> f64 {
        self.opt.learning_rate()
    }

    /// Sets the learning rate of the optimizer.
    pub fn set_learning_rate(&mut self, lr: f64) {
        self.opt.set_learning_rate(lr)
    }

    /// Variables of all heads.
    pub fn get_varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Mean and standard deviation of each variable.
    pub fn param_stats(&self) -> Result<Record> {
        param_stats(&self.varmap)
    }

    /// Saves the variables of all heads.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save reward ensemble to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads the variables of all heads.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load reward ensemble from {:?}", path.as_ref());
        Ok(())
    }
}
