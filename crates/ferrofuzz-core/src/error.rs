//! Error kinds shared by the whole engine.

/// The fuzzer's error type.
///
/// Most variants are recovered from locally by the controller;
/// [`Error::InternalBug`] is the only one that is fatal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A byte-utility or sampler precondition was violated by the caller.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    /// A mutation operator's precondition was not met. The mutate loop
    /// swallows this and retries with a different operator.
    #[error("out of data")]
    OutOfData,

    /// A crash artifact no longer reproduces during simplification.
    #[error("invalid sample: {0}")]
    InvalidSample(String),

    /// The state snapshot could not be loaded.
    #[error("failed to load state: {0}")]
    LoadError(String),

    /// An unexpected failure inside a worker, not caused by the target.
    #[error("internal bug: {0}")]
    InternalBug(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(Error::OutOfData.to_string(), "out of data");
        assert!(Error::OutOfBounds("x".into()).to_string().contains('x'));
    }
}
