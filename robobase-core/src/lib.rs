#![warn(missing_docs)]
//! Core types shared by the RoboBase crates.
//!
//! This crate defines the environment contract ([`Env`]), observation and action
//! spaces ([`DictSpace`], [`BoxSpace`]), the per-step data ([`Step`], [`Transition`])
//! and the [`Record`](record::Record) container used both for metrics and for the
//! info mapping attached to each environment step.
pub mod error;
pub mod record;
pub mod util;

mod base;
pub use base::{Env, ObsDict, Policy, Step, Transition};

mod space;
pub use space::{BoxSpace, DictSpace};
