use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollError {
    /// Poll creation input was rejected. Reported to the caller, never retried.
    #[error("invalid poll options: {0}")]
    Validation(String),

    #[error("no tracked poll with message id {0}")]
    UnknownPoll(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A send/edit/react/lookup call against the chat platform failed.
    #[error("platform error: {0}")]
    Platform(String),
}

impl From<serenity::Error> for PollError {
    fn from(err: serenity::Error) -> Self {
        PollError::Platform(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PollError>;
