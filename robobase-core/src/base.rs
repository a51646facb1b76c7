//! Core functionalities.
mod env;
mod policy;
mod step;

pub use env::{Env, ObsDict};
pub use policy::Policy;
pub use step::{Step, Transition};
