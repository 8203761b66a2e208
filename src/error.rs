use thiserror::Error;

/// Errors raised by the runtime itself.
///
/// The first three double as rejection reasons (wrapped in
/// [`Value::Error`](crate::Value::Error)); the rest are returned when
/// driving the scheduler from Rust.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("TypeError: A promise cannot be resolved with itself.")]
    SelfResolution,
    #[error("TypeError: Chaining cycle detected for promise.")]
    ChainingCycle,
    #[error("TypeError: Promise constructor's argument is not a function")]
    NotCallable,
    #[error("The promise was dropped before it settled.")]
    Abandoned,
    #[error("The scheduler went idle before the future completed.")]
    Stalled,
    #[error("The scheduler exceeded its limit of {0} turns.")]
    TurnLimit(usize),
    #[error("The scheduler cannot be driven from inside one of its own jobs.")]
    Reentrant,
}

impl Error {
    /// Whether this error is one of the type errors surfaced as rejections.
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            Error::SelfResolution | Error::ChainingCycle | Error::NotCallable
        )
    }
}
