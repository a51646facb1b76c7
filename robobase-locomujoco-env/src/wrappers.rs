//! Environment wrappers.
//!
//! Each wrapper owns the environment it wraps and is itself an
//! [`Env`](robobase_core::Env), so wrappers are stacked by nesting.
mod action_sequence;
mod demo_info;
mod frame_stack;
mod rescale;
mod time;
pub use action_sequence::ActionSequence;
pub use demo_info::AppendDemoInfo;
pub use frame_stack::FrameStack;
pub use rescale::{RescaleFromTanh, RescaleFromTanhWithMinMax};
pub use time::{OnehotTime, TimeLimit};
