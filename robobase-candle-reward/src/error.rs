use thiserror::Error;

/// Errors in reward model construction and input handling.
#[derive(Error, Debug)]
pub enum RewardError {
    /// Camera views have different shapes.
    #[error("Expected all rgb observations to have the same shape, got {0:?}")]
    ViewShapeMismatch(Vec<(String, Vec<usize>)>),

    /// More than one camera view without a fusion module.
    #[error("{0} camera views are configured but no view fusion module is set")]
    MissingFusion(usize),

    /// Pixel observations without an encoder.
    #[error("rgb observations are present but no encoder is configured")]
    MissingEncoder,

    /// An input tensor does not match the observation space.
    #[error("Shape of '{key}' is {actual:?}, incompatible with space shape {expected:?}")]
    InputShape {
        /// Key of the input.
        key: String,
        /// Shape from the observation space.
        expected: Vec<usize>,
        /// Shape of the tensor.
        actual: Vec<usize>,
    },

    /// Modalities disagree on their leading (batch, time) dimensions.
    #[error("Leading dimensions of '{key}' are {actual:?}, expected {expected:?}")]
    LeadingDims {
        /// Key of the input.
        key: String,
        /// Leading dimensions of the action.
        expected: Vec<usize>,
        /// Leading dimensions of the input.
        actual: Vec<usize>,
    },

    /// A key is missing from the input.
    #[error("Missing key '{0}' in input")]
    MissingKey(String),

    /// Ensemble member index out of range.
    #[error("Reward model {index} requested, but the ensemble has {size} members")]
    MemberOutOfRange {
        /// Requested member.
        index: usize,
        /// Number of members.
        size: usize,
    },

    /// Empty input.
    #[error("Cannot compute rewards of an empty sequence")]
    EmptySequence,
}
