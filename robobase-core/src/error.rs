//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),

    /// The bounds of a space do not match its shape.
    #[error("Space bounds have {actual} elements, but shape {shape:?} requires {expected}")]
    SpaceShapeMismatch {
        /// Shape of the space.
        shape: Vec<usize>,
        /// Number of elements required by the shape.
        expected: usize,
        /// Number of elements given.
        actual: usize,
    },
}
