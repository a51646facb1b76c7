//! Environment step.
use super::ObsDict;
use crate::record::Record;
use ndarray::ArrayD;

/// Represents a step of an environment.
#[derive(Clone, Debug)]
pub struct Step {
    /// Observation after the step.
    pub obs: ObsDict,

    /// Reward.
    pub reward: f32,

    /// Flag denoting if the episode is terminated.
    pub is_terminated: bool,

    /// Flag denoting if the episode is truncated.
    pub is_truncated: bool,

    /// Information defined by the environment.
    pub info: Record,
}

impl Step {
    /// Constructs a [`Step`] object.
    ///
    /// # Panics
    ///
    /// Panics if the step is both terminated and truncated.
    pub fn new(
        obs: ObsDict,
        reward: f32,
        is_terminated: bool,
        is_truncated: bool,
        info: Record,
    ) -> Self {
        assert!(
            !(is_terminated && is_truncated),
            "a step cannot be both terminated and truncated"
        );
        Step {
            obs,
            reward,
            is_terminated,
            is_truncated,
            info,
        }
    }

    /// Terminated or truncated.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.is_terminated || self.is_truncated
    }
}

/// A transition of a rollout.
///
/// `obs` is the observation on which `act` was taken, and `reward` is the
/// reward received for it. Reward learning overwrites `reward` in place.
#[derive(Clone, Debug)]
pub struct Transition {
    /// Action.
    pub act: ArrayD<f32>,

    /// Observation on which the action was taken.
    pub obs: ObsDict,

    /// Reward.
    pub reward: f32,

    /// Flag denoting if the episode is terminated after the action.
    pub is_terminated: bool,

    /// Flag denoting if the episode is truncated after the action.
    pub is_truncated: bool,

    /// Information of the step.
    pub info: Record,
}

impl Transition {
    /// Builds a transition from the observation before the action and the step.
    pub fn from_step(obs: ObsDict, act: ArrayD<f32>, step: &Step) -> Self {
        Self {
            act,
            obs,
            reward: step.reward,
            is_terminated: step.is_terminated,
            is_truncated: step.is_truncated,
            info: step.info.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    #[should_panic]
    fn test_step_terminated_and_truncated() {
        let _ = Step::new(ObsDict::new(), 0.0, true, true, Record::empty());
    }

    #[test]
    fn test_step_is_done() {
        let step = Step::new(ObsDict::new(), 1.0, false, true, Record::empty());
        assert!(step.is_done());
        let step = Step::new(ObsDict::new(), 1.0, false, false, Record::empty());
        assert!(!step.is_done());
    }
}
