//! Error types for the settle coordinator.

use rune_dom::DomError;
use thiserror::Error;

/// Result type for coordinator and runtime operations.
pub type Result<T> = std::result::Result<T, SettleError>;

/// Errors surfaced by the runtime. The coordinator itself never fails a bind
/// or a completion; these come from driving the headless page.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettleError {
    /// DOM access failed.
    #[error("DOM error: {0}")]
    Dom(#[from] DomError),

    /// The coordinator was dropped before the root finalized.
    #[error("coordinator dropped before the root finalized")]
    Abandoned,

    /// The virtual clock was asked to move backwards.
    #[error("cannot move the clock back from {now}ms to {target}ms")]
    ClockBackwards { now: u64, target: u64 },

    /// Too many tasks ran in one drain.
    #[error("task step limit of {limit} exceeded at {now}ms")]
    StepLimit { limit: usize, now: u64 },
}

/// Failure to read an element's animation style. Always degraded to "no
/// active animations" by the metadata reader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StyleError {
    /// The element could not be resolved in the document.
    #[error("style unavailable: {0}")]
    Dom(#[from] DomError),

    /// The style source failed for its own reasons.
    #[error("style read failed: {0}")]
    Unavailable(String),
}
