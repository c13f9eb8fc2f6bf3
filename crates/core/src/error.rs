/// Result alias that carries the custom [`KineticError`] type.
pub type Result<T> = std::result::Result<T, KineticError>;

/// Common error type for the core crate.
///
/// The taxonomy is deliberately narrow: the engine hot path never fails, so
/// errors only surface from graph construction and from loading frame
/// catalogues in the application crate.
#[derive(Debug, thiserror::Error)]
pub enum KineticError {
    /// Generic message wrapper for conditions that do not warrant their own
    /// variant.
    #[error("{0}")]
    Message(String),
    /// A custom graph topology referenced a node that does not exist, or
    /// declared the same node id twice.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialisation errors raised while loading a
    /// frame catalogue.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl KineticError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for KineticError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for KineticError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
