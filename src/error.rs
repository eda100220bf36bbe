//! Error types for digest execution.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The reentrancy phase a scope tree is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// An `apply` expression is being evaluated.
    Apply,
    /// A digest is running.
    Digest,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Apply => write!(f, "$apply"),
            Phase::Digest => write!(f, "$digest"),
        }
    }
}

/// Fatal errors surfaced to whoever called `digest` or `apply`.
///
/// Failures inside watch functions, listeners and queued tasks are not part of
/// this type: they are reported to the [`Tracer`](crate::Tracer) and the digest
/// carries on.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    /// The digest did not settle within the iteration bound.
    #[error("{ttl} digest iterations reached")]
    TtlExceeded {
        /// The configured iteration bound.
        ttl: usize,
    },

    /// A phase was requested while another one was active.
    #[error("{active} already in progress")]
    PhaseInProgress {
        /// The phase that was already running.
        active: Phase,
        /// The phase that was refused.
        requested: Phase,
    },

    /// The expression passed to `apply` failed. The digest still ran.
    #[error("expression failed: {0}")]
    Expression(#[source] anyhow::Error),
}

impl ScopeError {
    /// Returns true if this is a [`ScopeError::TtlExceeded`].
    pub fn is_ttl_exceeded(&self) -> bool {
        matches!(self, ScopeError::TtlExceeded { .. })
    }

    /// Returns true if this is a [`ScopeError::PhaseInProgress`].
    pub fn is_phase_conflict(&self) -> bool {
        matches!(self, ScopeError::PhaseInProgress { .. })
    }
}

/// Which kind of callback failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallbackKind {
    /// An `apply` expression whose error was superseded by a digest failure.
    Apply,
    /// A watch function.
    Watch,
    /// A watch listener.
    Listener,
    /// A task queued with `eval_async`.
    EvalAsync,
    /// A task queued with `apply_async`.
    ApplyAsync,
    /// A task queued with `post_digest`.
    PostDigest,
}
