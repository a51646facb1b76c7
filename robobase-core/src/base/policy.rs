//! Policy.
use super::ObsDict;
use ndarray::ArrayD;

/// A policy on an environment.
///
/// Policy is a mapping from an observation to an action.
/// The mapping can be either of deterministic or stochastic.
pub trait Policy {
    /// Sample an action given an observation.
    fn sample(&mut self, obs: &ObsDict) -> ArrayD<f32>;
}

impl<F> Policy for F
where
    F: FnMut(&ObsDict) -> ArrayD<f32>,
{
    fn sample(&mut self, obs: &ObsDict) -> ArrayD<f32> {
        self(obs)
    }
}
