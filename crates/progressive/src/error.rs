use thiserror::Error;

/// ProgressiveError covers misuse of the scheduler and its configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgressiveError {
    /// The scheduler was built outside a tokio runtime
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    /// `mount` was called on a unit that is already mounted
    #[error("Unit {id} is already mounted")]
    AlreadyMounted { id: String },

    /// `mount` was called on a unit after it was unmounted
    #[error("Unit {id} was unmounted and cannot be mounted again")]
    Detached { id: String },

    /// A root margin string could not be parsed
    #[error("Invalid root margin {input:?}: {reason}")]
    InvalidMargin { input: String, reason: String },

    /// A configuration document could not be parsed
    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for ProgressiveError {
    fn from(err: serde_json::Error) -> Self {
        ProgressiveError::InvalidConfig(err.to_string())
    }
}

/// Failure of a unit's heavy content, handed to the caller's error boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The content loader rejected
    #[error("Content failed to load: {0}")]
    Failed(String),

    /// The load was abandoned because the unit was unmounted
    #[error("Content load cancelled")]
    Cancelled,
}

impl LoadError {
    pub fn failed(reason: impl Into<String>) -> Self {
        LoadError::Failed(reason.into())
    }

    /// Returns true if an error boundary may reasonably offer a retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoadError::Failed(_))
    }
}
