use thiserror::Error;

/// Failures while bringing up the process: stores, clients, listeners.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("page store unavailable: {message}")]
    Store { message: String },
    #[error("origin client setup failed: {message}")]
    OriginClient { message: String },
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn origin_client(err: impl std::fmt::Display) -> Self {
        Self::OriginClient {
            message: err.to_string(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}

impl From<sqlx::Error> for InfraError {
    fn from(err: sqlx::Error) -> Self {
        Self::store(err.to_string())
    }
}
