//! Types and traits for recording metrics and step information.
//!
//! [`Record`] is a string-keyed container of [`RecordValue`]s. It is used for
//! two purposes in RoboBase:
//!
//! * the metrics returned by training steps (e.g. `reward_loss`), and
//! * the info mapping attached to each environment step (e.g. `task_reward`,
//!   `demo_action`).
//!
//! ```rust
//! use robobase_core::record::{Record, RecordValue};
//!
//! let mut info = Record::empty();
//! info.insert("demo", RecordValue::Scalar(1.0));
//! info.insert("demo_action", RecordValue::Array1(vec![0.1, -0.2]));
//! assert_eq!(info.get_scalar("demo").unwrap(), 1.0);
//! ```
mod base;
mod buffered_recorder;
mod recorder;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use recorder::{NullRecorder, Recorder};
