use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    /// A queue API call failed
    #[error("Queue {operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },

    /// The queue is configured in a way that can never succeed
    #[error("Invalid queue configuration: {0}")]
    Configuration(String),
}

impl QueueError {
    pub fn api(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Api {
            operation,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
