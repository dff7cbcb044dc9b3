//! Error types for the vcs-engine crate.
//!
//! This module defines the unified error enumeration used across object
//! storage, ref resolution, the index, diff/merge, and history operations.
//! It integrates with `thiserror` for `Display` and `std::error::Error`
//! source chaining.
//!
//! Propagation policy: lower layers return typed failures; history
//! operations surface them unchanged. No silent recovery — a failing
//! sub-step aborts the whole operation.

use thiserror::Error;

#[derive(Error, Debug)]
/// Unified error enumeration for the engine, one variant family per
/// taxonomy kind (NotFound, Corrupt, Conflict, OperationInProgress,
/// NothingToDo, InvalidArgument, Refuse, IOError).
pub enum VcsError {
    /// Named object, ref, path, stash index, or journal entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Object payload failed id verification, or a ref/index file is malformed.
    #[error("corrupt: {0}")]
    Corrupt(String),

    /// Ref expected-old mismatch, or a merge/cherry-pick/revert conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A sidecar file indicates an unfinished merge/cherry-pick/revert.
    #[error("operation in progress: {0} (use --continue or --abort)")]
    OperationInProgress(String),

    /// No staged changes, empty stash, nothing to clean, etc.
    #[error("nothing to do: {0}")]
    NothingToDo(String),

    /// Malformed ref name, unsafe path, invalid mode, or similar caller error.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Safety refusal: clean without -f/-n, revert of a root commit, reset
    /// mid-merge, and similar situations the caller must explicitly force.
    #[error("refused: {0}")]
    Refuse(String),

    /// Underlying filesystem failure.
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VcsError>;

impl VcsError {
    /// Exit-code mapping for the surfaces this library is embedded in (§6):
    /// 0 success, 1 usage error, 2 operation failure, 3 operation-in-progress.
    pub fn exit_code(&self) -> i32 {
        match self {
            VcsError::InvalidArgument(_) => 1,
            VcsError::OperationInProgress(_) => 3,
            _ => 2,
        }
    }
}
