#![forbid(unsafe_code)]

//! Error taxonomy shared by every rxui crate.
//!
//! # Failure Modes
//!
//! | Error | Raised by | Propagation |
//! |-------|-----------|-------------|
//! | `OutOfRange` | collection mutations | returned to the caller, collection untouched |
//! | `EnablementSourceFaulted` | command enablement stream | logged, converted to `false` |
//! | `SelectorFaulted` | mirror transform | terminates the mirror's following subscription |
//! | `SourceFaulted` | any producer calling `EventStream::error` | delivered to `on_error` |
//! | `SchedulerUnavailable` | worker scheduler after shutdown | work is dropped |

/// Errors raised by streams, collections, and commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RxError {
    /// An index outside the valid range for the collection.
    OutOfRange { index: usize, len: usize },
    /// The enablement stream of a command raised an error.
    EnablementSourceFaulted(String),
    /// A derived collection's selector failed while following its source.
    SelectorFaulted(String),
    /// A producer terminated its stream with an error.
    SourceFaulted(String),
    /// A scheduler could not accept work (its workers have shut down).
    SchedulerUnavailable(String),
}

impl RxError {
    /// Convenience constructor for producer faults.
    #[must_use]
    pub fn source(message: impl Into<String>) -> Self {
        Self::SourceFaulted(message.into())
    }

    /// Convenience constructor for selector faults.
    #[must_use]
    pub fn selector(message: impl Into<String>) -> Self {
        Self::SelectorFaulted(message.into())
    }
}

impl std::fmt::Display for RxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange { index, len } => {
                write!(f, "index {index} out of range for collection of length {len}")
            }
            Self::EnablementSourceFaulted(msg) => write!(f, "enablement source faulted: {msg}"),
            Self::SelectorFaulted(msg) => write!(f, "selector faulted: {msg}"),
            Self::SourceFaulted(msg) => write!(f, "source faulted: {msg}"),
            Self::SchedulerUnavailable(name) => write!(f, "scheduler unavailable: {name}"),
        }
    }
}

impl std::error::Error for RxError {}

/// Result alias used across rxui.
pub type Result<T> = std::result::Result<T, RxError>;
