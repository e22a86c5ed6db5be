use thiserror::Error;

#[derive(Error, Debug)]
pub enum CountError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error("Invalid tenant id '{0}'")]
    InvalidTenant(String),

    #[error("Invalid worker address '{0}'")]
    InvalidAddress(String),

    #[error("No workers are ready")]
    NoWorkersReady,

    #[error("Worker '{address}' unreachable: {message}")]
    WorkerUnreachable { address: String, message: String },

    #[error("Failed to spawn worker: {0}")]
    Spawn(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Task error: {0}")]
    Task(String),
}

impl CountError {
    pub fn unreachable(address: impl Into<String>, message: impl ToString) -> Self {
        Self::WorkerUnreachable {
            address: address.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CountError>;

impl<T> From<std::sync::PoisonError<T>> for CountError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

impl From<tokio::task::JoinError> for CountError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
