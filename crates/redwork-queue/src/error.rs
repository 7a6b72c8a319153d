//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Invalid job name: {0:?}")]
    InvalidJobName(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueueError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn unexpected_reply(msg: impl Into<String>) -> Self {
        Self::UnexpectedReply(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Raised before any store interaction; nothing was written.
    pub fn is_serialization(&self) -> bool {
        matches!(self, QueueError::Serialization(_))
    }

    /// Transport, command or script failure reported by the store.
    pub fn is_store(&self) -> bool {
        matches!(
            self,
            QueueError::Redis(_) | QueueError::Store(_) | QueueError::UnexpectedReply(_)
        )
    }
}
