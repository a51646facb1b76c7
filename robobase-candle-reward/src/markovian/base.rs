//! Markovian reward model.
use super::{
    augment::{crop_and_sum, cropping_mask, RandomShiftsAug},
    config::MarkovianRewardConfig,
    ensemble::RewardEnsemble,
    features::{Features, ObsLayout},
    loss::preference_loss,
};
use crate::{
    encoder::CnnEncoder,
    fusion::MlpFusion,
    head::MlpRewardHead,
    model::{RewardHead, RewardHeadInput, RewardInputShapes, ViewEncoder, ViewFusion},
    opt::{LrScheduler, Optimizer},
    util::arrayd_to_tensor,
    Member, RewardError, RewardMethod, RewardOutput, RewardSeq, TensorDict,
};
use anyhow::{bail, ensure, Context, Result};
use candle_core::{backprop::GradStore, DType::F32, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::{debug, info};
use ndarray::{ArrayViewD, Axis};
use rand::{rngs::StdRng, SeedableRng};
use robobase_core::{
    record::{Record, RecordValue},
    BoxSpace, DictSpace, Transition,
};
use std::{
    fs,
    path::{Path, PathBuf},
};

const ACTION_KEY: &str = "action";
const REWARD_KEY: &str = "reward";
const LABEL_KEY: &str = "label";

enum Fusion<F> {
    /// A single view is used as it is.
    FirstView,
    Module(F),
}

/// View encoder and fusion module, each with its own variables and optimizer.
struct Vision<E, F> {
    encoder: E,
    encoder_varmap: VarMap,
    encoder_opt: Optimizer,
    fusion: Fusion<F>,
    fusion_varmap: VarMap,
    fusion_opt: Option<Optimizer>,
}

impl<E: ViewEncoder, F: ViewFusion> Vision<E, F> {
    /// `(N, views, C, H, W)` to `(N, fused)`.
    fn forward(&self, rgb: &Tensor) -> Result<Tensor> {
        let feats = self.encoder.forward(rgb)?;
        match &self.fusion {
            Fusion::FirstView => Ok(feats.squeeze(1)?),
            Fusion::Module(fusion) => fusion.forward(&feats),
        }
    }

    fn output_dim(&self) -> usize {
        match &self.fusion {
            Fusion::FirstView => self.encoder.output_shape()[1],
            Fusion::Module(fusion) => fusion.output_dim(),
        }
    }

    fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.encoder_opt.step(grads)?;
        if let Some(opt) = &mut self.fusion_opt {
            opt.step(grads)?;
        }
        Ok(())
    }
}

/// Per-timestep reward learned from pairwise preferences over segments.
///
/// Pixel observations are encoded per view, fused and concatenated with the
/// low-dimensional state, the action and the time feature. Each member of a
/// [`RewardEnsemble`] maps this input to one reward per preference label.
///
/// In [`update`](RewardMethod::update) every member is trained on its own batch of
/// segment pairs and the losses of all members are summed before a single backward
/// pass. The encoder is trained with its own learning rate, typically smaller than
/// that of the heads.
pub struct MarkovianReward<H = MlpRewardHead, E = CnnEncoder, F = MlpFusion>
where
    H: RewardHead,
    E: ViewEncoder,
    F: ViewFusion,
{
    layout: ObsLayout,
    ensemble: RewardEnsemble<H>,
    vision: Option<Vision<E, F>>,
    scheduler: Option<LrScheduler>,
    compute_batch_size: usize,
    aug: Option<RandomShiftsAug>,
    data_aug_ratio: usize,
    label_margin: f64,
    activated: bool,
    record_verbose_level: usize,
    rng: StdRng,
    device: Device,
    n_updates: usize,
}

impl<H, E, F> MarkovianReward<H, E, F>
where
    H: RewardHead,
    E: ViewEncoder,
    F: ViewFusion,
{
    /// Constructs [`MarkovianReward`] for the given observation and action spaces.
    pub fn build(
        config: MarkovianRewardConfig<H, E, F>,
        obs_space: &DictSpace,
        act_space: &BoxSpace,
    ) -> Result<Self> {
        ensure!(
            config.compute_batch_size > 0,
            "compute_batch_size must be positive"
        );
        let device: Device = config.device.unwrap_or_default().try_into()?;
        let layout = ObsLayout::new(obs_space, act_space)?;

        let vision = match layout.encoder_input_shape() {
            None => None,
            Some(input_shape) => {
                let encoder_config = config
                    .encoder_config
                    .clone()
                    .ok_or(RewardError::MissingEncoder)?;
                let encoder_varmap = VarMap::new();
                let vb = VarBuilder::from_varmap(&encoder_varmap, F32, &device).set_prefix("encoder");
                let encoder = E::build(vb, encoder_config, input_shape)?;
                let encoder_opt = config.encoder_opt_config.build(encoder_varmap.all_vars())?;

                let fusion_varmap = VarMap::new();
                let fusion = match (&config.fusion_config, layout.num_views()) {
                    (Some(fusion_config), _) => {
                        let vb = VarBuilder::from_varmap(&fusion_varmap, F32, &device)
                            .set_prefix("fusion");
                        Fusion::Module(F::build(vb, fusion_config.clone(), encoder.output_shape())?)
                    }
                    (None, 1) => Fusion::FirstView,
                    (None, v) => return Err(RewardError::MissingFusion(v).into()),
                };
                let fusion_vars = fusion_varmap.all_vars();
                let fusion_opt = match fusion_vars.is_empty() {
                    true => None,
                    false => Some(config.fusion_opt_config.build(fusion_vars)?),
                };

                Some(Vision {
                    encoder,
                    encoder_varmap,
                    encoder_opt,
                    fusion,
                    fusion_varmap,
                    fusion_opt,
                })
            }
        };

        let input_shapes = RewardInputShapes {
            low_dim: layout.low_dim_size(),
            fused_view_feats: vision.as_ref().map(|v| v.output_dim()),
            action: layout.action_size(),
            time: layout.time_size(),
        };
        let base_lr = config.ensemble_config.opt_config.lr();
        let mut ensemble = RewardEnsemble::build(config.ensemble_config, &input_shapes, &device)?;
        let scheduler = config
            .lr_scheduler_config
            .as_ref()
            .map(|c| c.build(base_lr));
        if let Some(scheduler) = &scheduler {
            ensemble.set_learning_rate(scheduler.lr());
        }

        info!(
            "Build Markovian reward with {} reward models, {} views, inputs {:?}",
            ensemble.len(),
            layout.num_views(),
            input_shapes
        );

        Ok(Self {
            layout,
            ensemble,
            vision,
            scheduler,
            compute_batch_size: config.compute_batch_size,
            aug: match config.use_augmentation {
                true => Some(RandomShiftsAug::new(config.aug_pad)),
                false => None,
            },
            data_aug_ratio: config.data_aug_ratio,
            label_margin: config.label_margin,
            activated: config.activated,
            record_verbose_level: config.record_verbose_level,
            rng: StdRng::seed_from_u64(config.seed),
            device,
            n_updates: 0,
        })
    }

    /// Modalities read from observations.
    pub fn layout(&self) -> &ObsLayout {
        &self.layout
    }

    /// Reward heads.
    pub fn ensemble(&self) -> &RewardEnsemble<H> {
        &self.ensemble
    }

    /// The number of optimization steps performed so far.
    pub fn n_updates(&self) -> usize {
        self.n_updates
    }

    /// Stacks the observations and actions of transitions along a new time axis.
    fn rollout_to_dict(&self, transitions: &[Transition]) -> Result<TensorDict> {
        if transitions.is_empty() {
            return Err(RewardError::EmptySequence.into());
        }
        let mut dict = TensorDict::new();
        for key in self.layout.obs_keys() {
            let frames = transitions
                .iter()
                .map(|t| match t.obs.get(&key) {
                    Some(a) => Ok(a.view()),
                    None => Err(RewardError::MissingKey(key.clone())),
                })
                .collect::<Result<Vec<ArrayViewD<f32>>, _>>()?;
            let stacked = ndarray::stack(Axis(0), &frames)?;
            dict.insert(key, arrayd_to_tensor::<f32, f32>(&stacked, &self.device)?);
        }

        let acts = transitions.iter().map(|t| t.act.view()).collect::<Vec<_>>();
        let acts = ndarray::stack(Axis(0), &acts)?;
        dict.insert(
            ACTION_KEY.to_string(),
            arrayd_to_tensor::<f32, f32>(&acts, &self.device)?,
        );
        Ok(dict)
    }

    /// Rewards summed over labels, with the leading dimensions of the input.
    fn predict(&self, dict: &TensorDict, member: Member) -> Result<Tensor> {
        let action = dict
            .get(ACTION_KEY)
            .ok_or_else(|| RewardError::MissingKey(ACTION_KEY.to_string()))?;
        let features = self.layout.extract(dict, "", action)?;
        let n = features.rows();
        if n == 0 {
            return Err(RewardError::EmptySequence.into());
        }

        let all_rows = RewardHeadInput {
            low_dim: features.low_dim.as_ref(),
            fused_view_feats: None,
            action: &features.action,
            time: features.time.as_ref(),
        };
        let mut rewards = Vec::with_capacity((n + self.compute_batch_size - 1) / self.compute_batch_size);
        let mut start = 0;
        while start < n {
            let len = self.compute_batch_size.min(n - start);
            let fused = match (&self.vision, &features.rgb) {
                (Some(vision), Some(rgb)) => Some(vision.forward(&rgb.narrow(0, start, len)?)?.detach()),
                _ => None,
            };
            let rows = all_rows.narrow(start, len)?;
            let input = RewardHeadInput {
                fused_view_feats: fused.as_ref(),
                ..rows.as_input()
            };
            let r = match member {
                Member::Mean => self.ensemble.forward_mean(&input)?,
                Member::Index(ix) => self.ensemble.forward(&input, ix)?,
            };
            rewards.push(r.sum(1)?.detach());
            start += len;
        }

        let rewards = Tensor::cat(&rewards, 0)?;
        assert_eq!(
            rewards.dim(0)?,
            n,
            "Computed {} rewards for {} timesteps",
            rewards.dim(0)?,
            n
        );
        Ok(rewards.reshape(features.lead.clone())?)
    }

    /// Applies random shifts to `(B * S, views, C, H, W)` images, independently per view.
    fn shift_views(&mut self, rgb: &Tensor, aug: &RandomShiftsAug, b: usize, s: usize) -> Result<Tensor> {
        let (_, v, c, h, w) = rgb.dims5()?;
        let views = (0..v)
            .map(|ix| -> Result<Tensor> {
                let view = rgb.narrow(1, ix, 1)?.reshape((b, s, c, h, w))?;
                let view = aug.forward(&view, &mut self.rng)?;
                Ok(view.reshape((b * s, 1, c, h, w))?)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Tensor::cat(&views, 1)?)
    }

    /// Returns of segment `seg` predicted by head `member`, `(k * B, num_labels)` with `k`
    /// random crops or `(B, num_labels)` without cropping.
    fn segment_returns(&mut self, batch: &TensorDict, seg: usize, member: usize) -> Result<Tensor> {
        let prefix = format!("seg{}_", seg);
        let action_key = format!("{}{}", prefix, ACTION_KEY);
        let action = batch
            .get(&action_key)
            .ok_or_else(|| RewardError::MissingKey(action_key.clone()))?;
        let Features {
            lead,
            low_dim,
            rgb,
            time,
            action,
        } = self.layout.extract(batch, &prefix, action)?;
        let (b, s) = match lead.as_slice() {
            [b, s] => (*b, *s),
            _ => bail!(
                "Segments must have leading dimensions (batch, sequence), got {:?}",
                lead
            ),
        };

        let rgb = match (rgb, self.aug.clone()) {
            (Some(rgb), Some(aug)) => Some(self.shift_views(&rgb, &aug, b, s)?),
            (rgb, _) => rgb,
        };
        let fused = match (&self.vision, &rgb) {
            (Some(vision), Some(rgb)) => Some(vision.forward(rgb)?),
            _ => None,
        };
        let input = RewardHeadInput {
            low_dim: low_dim.as_ref(),
            fused_view_feats: fused.as_ref(),
            action: &action,
            time: time.as_ref(),
        };
        let r_hat = self
            .ensemble
            .forward(&input, member)?
            .reshape((b, s, self.ensemble.num_labels()))?;

        let mask = match self.data_aug_ratio {
            0 => None,
            k => Some(cropping_mask(&mut self.rng, b, s, k, &self.device)?),
        };
        crop_and_sum(&r_hat, mask.as_ref())
    }

    /// Preference labels, replicated once per random crop.
    fn labels(&self, batch: &TensorDict) -> Result<Tensor> {
        let labels = batch
            .get(LABEL_KEY)
            .ok_or_else(|| RewardError::MissingKey(LABEL_KEY.to_string()))?;
        match (self.data_aug_ratio, labels.rank()) {
            (0, _) => Ok(labels.clone()),
            (k, 1) => Ok(labels.repeat(k)?),
            (k, _) => Ok(labels.repeat((k, 1))?),
        }
    }

    /// Saves the parameters into `path`, a directory.
    pub fn save_params(&self, path: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(path)?;

        let reward_path = path.join("reward.safetensors");
        self.ensemble.save(&reward_path)?;
        let mut paths = vec![reward_path];

        if let Some(vision) = &self.vision {
            let encoder_path = path.join("encoder.safetensors");
            vision.encoder_varmap.save(&encoder_path)?;
            paths.push(encoder_path);

            if vision.fusion_opt.is_some() {
                let fusion_path = path.join("fusion.safetensors");
                vision.fusion_varmap.save(&fusion_path)?;
                paths.push(fusion_path);
            }
        }
        info!("Save Markovian reward to {:?}", path);

        Ok(paths)
    }

    /// Loads the parameters saved with [`save_params`](Self::save_params).
    pub fn load_params(&mut self, path: &Path) -> Result<()> {
        self.ensemble.load(path.join("reward.safetensors"))?;
        if let Some(vision) = &mut self.vision {
            vision.encoder_varmap.load(path.join("encoder.safetensors"))?;
            if vision.fusion_opt.is_some() {
                vision.fusion_varmap.load(path.join("fusion.safetensors"))?;
            }
        }
        info!("Load Markovian reward from {:?}", path);

        Ok(())
    }
}

impl<H, E, F> RewardMethod for MarkovianReward<H, E, F>
where
    H: RewardHead,
    E: ViewEncoder,
    F: ViewFusion,
{
    fn activated(&self) -> bool {
        self.activated
    }

    fn set_activated(&mut self, v: bool) {
        self.activated = v;
    }

    fn compute_reward(
        &self,
        seq: RewardSeq,
        member: Member,
        return_reward: bool,
    ) -> Result<RewardOutput> {
        if !self.activated {
            return Ok(RewardOutput::Unchanged);
        }
        if let Member::Index(index) = member {
            if index >= self.ensemble.len() {
                return Err(RewardError::MemberOutOfRange {
                    index,
                    size: self.ensemble.len(),
                }
                .into());
            }
        }

        match seq {
            RewardSeq::Rollout(transitions) => {
                let dict = self.rollout_to_dict(transitions)?;
                let rewards = self.predict(&dict, member)?;
                if return_reward {
                    return Ok(RewardOutput::Reward(rewards));
                }
                write_rollout_rewards(transitions, rewards.to_vec1::<f32>()?);
                debug!("Wrote rewards of {} transitions", transitions.len());
                Ok(RewardOutput::Written)
            }
            RewardSeq::Batch(dict) => {
                let rewards = self.predict(dict, member)?;
                if return_reward {
                    return Ok(RewardOutput::Reward(rewards));
                }
                dict.insert(REWARD_KEY.to_string(), rewards);
                Ok(RewardOutput::Written)
            }
        }
    }

    fn update(
        &mut self,
        batches: &mut dyn Iterator<Item = TensorDict>,
        _step: usize,
    ) -> Result<Record> {
        let num_members = self.ensemble.len();
        let num_labels = self.ensemble.num_labels();
        let mut total_loss: Option<Tensor> = None;
        let mut accuracy = vec![0f32; num_labels];
        let mut label_loss = vec![0f32; num_labels];

        for member in 0..num_members {
            let batch = batches
                .next()
                .with_context(|| format!("No preference batch left for reward model {}", member))?;
            let r_hat_0 = self.segment_returns(&batch, 0, member)?;
            let r_hat_1 = self.segment_returns(&batch, 1, member)?;
            let labels = self.labels(&batch)?;
            let out = preference_loss(&r_hat_0, &r_hat_1, &labels, self.label_margin)?;

            for (l, stats) in out.per_label.iter().enumerate() {
                accuracy[l] += stats.accuracy;
                label_loss[l] += stats.loss;
            }
            total_loss = Some(match total_loss {
                None => out.loss,
                Some(loss) => (loss + out.loss)?,
            });
        }
        let loss = total_loss.context("The reward ensemble has no members")?;

        let grads = loss.backward()?;
        if let Some(vision) = &mut self.vision {
            vision.step(&grads)?;
        }
        self.ensemble.step(&grads)?;
        if let Some(scheduler) = &mut self.scheduler {
            let lr = scheduler.step();
            self.ensemble.set_learning_rate(lr);
        }
        self.n_updates += 1;

        let mut record = Record::from_scalar("reward_loss", loss.to_scalar::<f32>()?);
        for l in 0..num_labels {
            record.insert(
                format!("pref_acc_label_{}", l),
                RecordValue::Scalar(accuracy[l] / num_members as f32),
            );
            record.insert(format!("pref_loss_{}", l), RecordValue::Scalar(label_loss[l]));
        }
        record.insert("lr", RecordValue::Scalar(self.ensemble.learning_rate() as f32));
        if self.record_verbose_level >= 2 {
            record.merge_inplace(self.ensemble.param_stats()?);
        }

        Ok(record)
    }
}

/// Overwrites the reward of each transition. Panics unless there is exactly one
/// reward per transition.
fn write_rollout_rewards(transitions: &mut [Transition], rewards: Vec<f32>) {
    assert_eq!(
        rewards.len(),
        transitions.len(),
        "Computed {} rewards for {} transitions",
        rewards.len(),
        transitions.len()
    );
    for (t, r) in transitions.iter_mut().zip(rewards) {
        t.reward = r;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::ArrayD;
    use robobase_core::{record::Record, ObsDict};

    fn transitions(n: usize) -> Vec<Transition> {
        (0..n)
            .map(|_| Transition {
                act: ArrayD::zeros(vec![2]),
                obs: ObsDict::new(),
                reward: 0.0,
                is_terminated: false,
                is_truncated: false,
                info: Record::empty(),
            })
            .collect()
    }

    #[test]
    fn test_write_rollout_rewards() {
        let mut ts = transitions(3);
        write_rollout_rewards(&mut ts, vec![0.5, 1.0, 1.5]);
        let rewards: Vec<f32> = ts.iter().map(|t| t.reward).collect();
        assert_eq!(rewards, vec![0.5, 1.0, 1.5]);
    }

    #[test]
    #[should_panic(expected = "Computed 2 rewards for 3 transitions")]
    fn test_reward_count_mismatch_panics() {
        let mut ts = transitions(3);
        write_rollout_rewards(&mut ts, vec![0.5, 1.0]);
    }
}
