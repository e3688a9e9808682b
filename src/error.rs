//! Error taxonomy for the reconciliation engine.
//!
//! Naming errors signal that a stored segment id or chain violates the
//! tree's own invariants; they are fatal for the current batch rather than
//! recovered locally. Locator misses are benign and never surface here.

use thiserror::Error;

/// Errors from the name codec.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NamingError {
    /// A segment id or basename cannot be interpreted under the naming scheme.
    #[error("failed to parse segment id: {0}")]
    ParseFailed(String),

    /// A chain used for canonicalization has zero length.
    #[error("ancestor chain is empty")]
    EmptyChain,

    /// A chain is structurally impossible (non-section segment in an
    /// ancestor position, illegal node name).
    #[error("invalid chain: {0}")]
    InvalidChain(String),
}

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Naming(#[from] NamingError),

    /// The tree was found in a state unreachable under its own invariants.
    #[error("tree inconsistent: {0}")]
    TreeInconsistent(String),

    /// A locator addressed nothing where a node was required.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// External dispatch of a healing or codex action failed.
    #[error("vault dispatch failed: {message}")]
    VaultFailed { message: String, recoverable: bool },

    #[error("configuration error: {0}")]
    Config(String),
}

impl ReconcileError {
    /// Whether the error leaves the engine usable for subsequent batches.
    ///
    /// Naming and consistency failures imply the in-memory tree no longer
    /// matches its invariants; the documented recovery is a full rebuild.
    pub fn is_fatal(&self) -> bool {
        match self {
            ReconcileError::Naming(_) | ReconcileError::TreeInconsistent(_) => true,
            ReconcileError::NodeNotFound(_) | ReconcileError::Config(_) => false,
            ReconcileError::VaultFailed { recoverable, .. } => !recoverable,
        }
    }
}
