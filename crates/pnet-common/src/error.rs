use thiserror::Error;

pub use crate::address::InvalidAddress;

/// Errors surfaced at daemon startup — "programming errors" per the error
/// handling design: these should abort process start, never be swallowed.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("duplicate registration for {0}")]
    DuplicateRegistration(String),
    #[error("misconfigured device: {0}")]
    Misconfigured(String),
}
