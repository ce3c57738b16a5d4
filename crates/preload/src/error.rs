use thiserror::Error;

/// PreloadError represents everything that can go wrong while issuing a resource hint.
///
/// None of these ever escape a preload primitive as a panic: hints are an
/// optimization, so callers only see them through logs, metrics and events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreloadError {
    /// The href could not be parsed, even relative to the configured base URL
    #[error("Invalid URL {href:?}: {reason}")]
    InvalidUrl { href: String, reason: String },

    /// The href parsed but uses a scheme that cannot carry a resource hint
    #[error("Unsupported scheme {scheme:?} in {href:?}")]
    UnsupportedScheme { href: String, scheme: String },

    /// The document host refused to append the hint element
    #[error("Document host rejected hint: {0}")]
    HostRejected(String),

    /// The `data-preload` attribute did not contain a valid resource list
    #[error("Invalid preload attribute: {0}")]
    InvalidAttribute(String),
}

impl PreloadError {
    /// Returns true if the error was caused by caller input rather than the host
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            PreloadError::InvalidUrl { .. }
                | PreloadError::UnsupportedScheme { .. }
                | PreloadError::InvalidAttribute(_)
        )
    }
}

impl From<serde_json::Error> for PreloadError {
    fn from(err: serde_json::Error) -> Self {
        PreloadError::InvalidAttribute(err.to_string())
    }
}
