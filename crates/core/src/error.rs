/// Result alias that carries the custom [`TimelineError`] type.
pub type Result<T> = std::result::Result<T, TimelineError>;

/// Common error type for the core crate.
///
/// None of these are fatal to a running timeline. The context logs per-event
/// failures and carries on with the remaining events.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    /// A selector or element id did not resolve on the rendering surface.
    #[error("no element matches `{0}`")]
    MissingElement(String),
    /// A placement string that is not `side` or `side-alignment`.
    #[error("invalid placement `{0}`")]
    InvalidPlacement(String),
    /// The timeline definition failed validation.
    #[error("invalid timeline: {0}")]
    InvalidTimeline(String),
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON decoding errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl TimelineError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn invalid_timeline<T: Into<String>>(reason: T) -> Self {
        Self::InvalidTimeline(reason.into())
    }

    pub fn invalid_config<T: Into<String>>(reason: T) -> Self {
        Self::InvalidConfig(reason.into())
    }
}

impl From<&str> for TimelineError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for TimelineError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
