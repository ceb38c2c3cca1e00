use thiserror::Error;

/// Errors from a distributed store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to get a redis connection: {0}")]
    Pool(String),

    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("value at '{0}' is not an integer")]
    NotAnInteger(String),
}

/// Errors surfaced by [`StampedeGuard`](crate::StampedeGuard).
///
/// A poll deadline running out is not an error: the waiting caller simply
/// populates on its own.
#[derive(Debug, Error)]
pub enum GuardError<E> {
    #[error("upstream population failed: {0}")]
    Upstream(E),

    #[error("request cancelled while waiting for cache population")]
    Cancelled,
}

impl<E> GuardError<E> {
    /// Returns the upstream error, if that is what this is.
    pub fn into_upstream(self) -> Option<E> {
        match self {
            Self::Upstream(e) => Some(e),
            Self::Cancelled => None,
        }
    }
}
