// ============================================================================
// spark-observe - Errors
// ============================================================================

use thiserror::Error;

use super::types::EffectId;

/// Failures surfaced by the reactive runtime.
///
/// Reads without an active effect and writes without subscribers are not
/// errors; only effect execution can fail.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// The effect body panicked. The active-effect stack was restored before
    /// this error was produced.
    #[error("{effect} panicked: {message}")]
    EffectPanicked { effect: EffectId, message: String },

    /// A fallible effect body returned an error.
    #[error("{effect} failed: {source}")]
    EffectFailed {
        effect: EffectId,
        #[source]
        source: anyhow::Error,
    },

    /// A runnable was invoked while its effect was already running.
    #[error("{effect} is already running and cannot be re-entered")]
    Reentrant { effect: EffectId },

    /// Effects kept re-queueing each other across flush cycles.
    #[error("flush chained more than {limit} times; dropped {dropped} queued effects")]
    FlushLimitExceeded { limit: u32, dropped: usize },

    /// A runnable was invoked after its runtime was dropped.
    #[error("the reactive runtime was dropped")]
    RuntimeDropped,
}

impl ReactiveError {
    /// The effect the error is about, if any
    pub fn effect(&self) -> Option<EffectId> {
        match self {
            Self::EffectPanicked { effect, .. }
            | Self::EffectFailed { effect, .. }
            | Self::Reentrant { effect } => Some(*effect),
            Self::FlushLimitExceeded { .. } | Self::RuntimeDropped => None,
        }
    }
}

pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
