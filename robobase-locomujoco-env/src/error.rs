//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug)]
pub enum LocoMujocoError {
    /// Render mode other than `rgb_array` or `human`.
    #[error("render_mode must be one of ['rgb_array', 'human'], got {0}")]
    UnsupportedRenderMode(String),

    /// Reward mode other than `dense` or `initial`.
    #[error("reward_mode must be one of ['dense', 'initial'], got {0}")]
    UnsupportedRewardMode(String),

    /// Reward term type other than `all` or `initial`.
    #[error("reward_term_type must be one of ['all', 'initial'], got {0}")]
    UnsupportedRewardTermType(String),

    /// Reward term not provided by the environment.
    #[error("Unknown reward term {0}")]
    UnknownRewardTerm(String),

    /// Query view other than `pixels`.
    #[error("Only pixels view is supported for queries, got {0}")]
    UnsupportedQueryKey(String),

    /// Environments are built with min/max rescaling, but no demonstrations were loaded.
    #[error("Action statistics are not available; call collect_or_fetch_demos() first")]
    MissingActionStats,

    /// Demonstrations were requested before they were prepared.
    #[error("There are no demonstrations; call collect_or_fetch_demos() and post_collect_or_fetch_demos() first")]
    MissingDemos,

    /// The dataset or the set of demonstrations has no transitions.
    #[error("No transitions with demo actions")]
    EmptyDemos,

    /// A demonstration was stepped past its end.
    #[error("Demonstration {0} has no more steps")]
    DemoExhausted(usize),
}
