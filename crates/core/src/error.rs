use std::path::PathBuf;

/// Result alias that carries the custom [`JujubeError`] type.
pub type Result<T> = std::result::Result<T, JujubeError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum JujubeError {
    /// The audio resource backing a [`PlaybackClock`](crate::PlaybackClock)
    /// could not be opened. Fatal for that clock only: callers are expected
    /// to fall back to a silent time source or abort the session.
    #[error("could not open audio `{}`: {reason}", path.display())]
    MediaOpen { path: PathBuf, reason: String },
    #[error("invalid chart: {0}")]
    InvalidChart(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl JujubeError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn media_open(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::MediaOpen {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<&str> for JujubeError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for JujubeError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
