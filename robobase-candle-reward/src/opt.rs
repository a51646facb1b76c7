//! Optimizers and learning rate schedules.
use anyhow::Result;
use candle_core::{backprop::GradStore, Var};
use candle_nn::{AdamW, Optimizer as _, ParamsAdamW};
use candle_optimisers::adam::{Adam, ParamsAdam};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Configuration of optimizer for training reward models.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// AdamW optimizer.
    AdamW {
        lr: f64,
        #[serde(default = "default_beta1")]
        beta1: f64,
        #[serde(default = "default_beta2")]
        beta2: f64,
        #[serde(default = "default_eps")]
        eps: f64,
        #[serde(default = "default_weight_decay")]
        weight_decay: f64,
    },

    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,
    },
}

fn default_beta1() -> f64 {
    ParamsAdamW::default().beta1
}

fn default_beta2() -> f64 {
    ParamsAdamW::default().beta2
}

fn default_eps() -> f64 {
    ParamsAdamW::default().eps
}

fn default_weight_decay() -> f64 {
    ParamsAdamW::default().weight_decay
}

impl OptimizerConfig {
    /// AdamW with the given learning rate and weight decay, other parameters default.
    pub fn adamw(lr: f64, weight_decay: f64) -> Self {
        let params = ParamsAdamW::default();
        Self::AdamW {
            lr,
            beta1: params.beta1,
            beta2: params.beta2,
            eps: params.eps,
            weight_decay,
        }
    }

    /// Constructs the optimizer for the given variables.
    pub fn build(&self, vars: Vec<Var>) -> Result<Optimizer> {
        match &self {
            OptimizerConfig::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => {
                let params = ParamsAdamW {
                    lr: *lr,
                    beta1: *beta1,
                    beta2: *beta2,
                    eps: *eps,
                    weight_decay: *weight_decay,
                };
                let opt = AdamW::new(vars, params)?;
                Ok(Optimizer::AdamW(opt))
            }
            OptimizerConfig::Adam { lr } => {
                let params = ParamsAdam {
                    lr: *lr,
                    ..ParamsAdam::default()
                };
                let opt = Adam::new(vars, params)?;
                Ok(Optimizer::Adam(opt))
            }
        }
    }

    /// Returns the learning rate.
    pub fn lr(&self) -> f64 {
        match self {
            Self::AdamW { lr, .. } => *lr,
            Self::Adam { lr } => *lr,
        }
    }

    /// Override learning rate.
    pub fn learning_rate(self, lr: f64) -> Self {
        match self {
            Self::AdamW {
                lr: _,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => Self::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            },
            Self::Adam { lr: _ } => Self::Adam { lr },
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::adamw(3e-4, 1e-4)
    }
}

/// Optimizers.
///
/// This is a thin wrapper of optimizers in `candle_nn` and `candle_optimisers`.
pub enum Optimizer {
    /// AdamW optimizer.
    AdamW(AdamW),

    /// Adam optimizer.
    Adam(Adam),
}

impl Optimizer {
    /// Updates variables with precomputed gradients.
    ///
    /// Variables without a gradient in `grads` are left as they are.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        match self {
            Self::AdamW(opt) => Ok(opt.step(grads)?),
            Self::Adam(opt) => Ok(opt.step(grads)?),
        }
    }

    /// Returns the current learning rate.
    pub fn learning_rate(&self) -> f64 {
        match self {
            Self::AdamW(opt) => opt.learning_rate(),
            Self::Adam(opt) => opt.learning_rate(),
        }
    }

    /// Sets the learning rate.
    pub fn set_learning_rate(&mut self, lr: f64) {
        match self {
            Self::AdamW(opt) => opt.set_learning_rate(lr),
            Self::Adam(opt) => opt.set_learning_rate(lr),
        }
    }
}

/// Configuration of learning rate schedules.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum LrSchedulerConfig {
    /// Linear warmup from zero followed by a cosine decay to zero.
    Cosine {
        /// Number of warmup steps.
        warmup_steps: usize,

        /// Total number of training steps.
        num_training_steps: usize,
    },
}

impl LrSchedulerConfig {
    /// Cosine schedule with 100 warmup steps.
    pub fn cosine(num_training_steps: usize) -> Self {
        Self::Cosine {
            warmup_steps: 100,
            num_training_steps,
        }
    }

    /// Builds the scheduler of an optimizer whose base learning rate is `base_lr`.
    pub fn build(&self, base_lr: f64) -> LrScheduler {
        LrScheduler {
            config: self.clone(),
            base_lr,
            n_steps: 0,
        }
    }
}

/// Learning rate schedule, stepped once per update.
pub struct LrScheduler {
    config: LrSchedulerConfig,
    base_lr: f64,
    n_steps: usize,
}

impl LrScheduler {
    /// Multiplier of the base learning rate after `step` scheduler steps.
    pub fn factor(&self, step: usize) -> f64 {
        match self.config {
            LrSchedulerConfig::Cosine {
                warmup_steps,
                num_training_steps,
            } => {
                if step < warmup_steps {
                    return step as f64 / warmup_steps.max(1) as f64;
                }
                let progress = ((step - warmup_steps) as f64
                    / num_training_steps.saturating_sub(warmup_steps).max(1) as f64)
                    .min(1.0);
                (0.5 * (1.0 + (PI * progress).cos())).max(0.0)
            }
        }
    }

    /// Learning rate at the current step.
    pub fn lr(&self) -> f64 {
        self.base_lr * self.factor(self.n_steps)
    }

    /// Advances the schedule and returns the new learning rate.
    pub fn step(&mut self) -> f64 {
        self.n_steps += 1;
        self.lr()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cosine_schedule() {
        let config = LrSchedulerConfig::Cosine {
            warmup_steps: 10,
            num_training_steps: 110,
        };
        let mut sched = config.build(1e-3);

        assert_eq!(sched.lr(), 0.0);
        for _ in 0..5 {
            sched.step();
        }
        assert!((sched.lr() - 5e-4).abs() < 1e-12);
        for _ in 5..10 {
            sched.step();
        }
        assert!((sched.lr() - 1e-3).abs() < 1e-12);
        for _ in 10..60 {
            sched.step();
        }
        assert!((sched.lr() - 5e-4).abs() < 1e-9);
        for _ in 60..200 {
            sched.step();
        }
        assert!(sched.lr() >= 0.0 && sched.lr() < 1e-9);
    }

    #[test]
    fn test_set_learning_rate() -> Result<()> {
        let mut opt = OptimizerConfig::Adam { lr: 0.1 }.build(vec![])?;
        opt.set_learning_rate(0.01);
        assert_eq!(opt.learning_rate(), 0.01);
        Ok(())
    }
}
