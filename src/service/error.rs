use thiserror::Error;

use crate::orbit::OrbitError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Failure reported by the orbit computation, passed through untouched.
    #[error(transparent)]
    Upstream(#[from] OrbitError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
