/// Unified error type for every fallible operation in the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("work queue is closed")]
    QueueClosed,
}

impl ServerError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        ServerError::Protocol(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        ServerError::Store(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        ServerError::Config(msg.into())
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        ServerError::Store(err.to_string())
    }
}
