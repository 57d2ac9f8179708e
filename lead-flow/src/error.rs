use thiserror::Error;

/// Errors produced by the conversation engine, the runner and the storage collaborators.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Unknown conversation step: {0}")]
    UnknownStep(String),

    #[error("Conversation already completed at step: {0}")]
    ConversationCompleted(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid step table: {0}")]
    InvalidStepTable(String),

    #[error("Persistence call failed: {0}")]
    UpstreamPersistenceFailure(String),

    #[error("Blob storage call failed: {0}")]
    UpstreamStorageFailure(String),
}

impl FlowError {
    /// Stable machine-readable code, surfaced in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            FlowError::MissingRequiredField(_) => "MISSING_REQUIRED_FIELD",
            FlowError::InvalidPayload(_) => "INVALID_PAYLOAD",
            FlowError::UnknownStep(_) => "UNKNOWN_STEP",
            FlowError::ConversationCompleted(_) => "CONVERSATION_COMPLETED",
            FlowError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            FlowError::InvalidStepTable(_) => "INVALID_STEP_TABLE",
            FlowError::UpstreamPersistenceFailure(_) => "UPSTREAM_PERSISTENCE_FAILURE",
            FlowError::UpstreamStorageFailure(_) => "UPSTREAM_STORAGE_FAILURE",
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for FlowError {
    fn from(err: sqlx::Error) -> Self {
        FlowError::UpstreamPersistenceFailure(err.to_string())
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::UpstreamPersistenceFailure(format!("serialization: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
