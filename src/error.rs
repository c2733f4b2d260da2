pub type CardLabResult<T> = Result<T, CardLabError>;

#[derive(thiserror::Error, Debug)]
pub enum CardLabError {
    /// A drawing surface could not be acquired. Fatal to the render call.
    #[error("surface error: {0}")]
    Surface(String),

    /// An operation was attempted before its inputs existed. Orchestrators
    /// treat this as a silent no-op, never as a user-visible failure.
    #[error("precondition not met: {0}")]
    Precondition(String),

    /// Inputs failed a fail-fast check before any network call.
    #[error("validation error: {0}")]
    Validation(String),

    /// The inpainting service failed: transport error, non-success status,
    /// or a malformed/empty/misaligned response.
    #[error("service error: {0}")]
    Service(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CardLabError {
    pub fn surface(msg: impl Into<String>) -> Self {
        Self::Surface(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}
