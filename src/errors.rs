//! Typed error hierarchy for the review loop.
//!
//! Three top-level enums cover the failure taxonomy:
//! - `SetupError` — session creation failures; fatal, no partial session may survive
//! - `BlockReason` — recoverable round-blocking conditions; the display string is
//!   the operator-facing message explaining what to fix
//! - `StoreError` — on-disk session record integrity violations

use std::path::PathBuf;
use thiserror::Error;

/// Fatal failures while setting up a session.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("another active session exists at {path}; cancel it before starting a new one")]
    SessionAlreadyActive { path: PathBuf },

    #[error("trigger comment was posted but its id could not be retrieved")]
    TriggerIdMissing,

    #[error("reviewer '{bot}' never acknowledged the trigger after {attempts} attempts")]
    AckNeverArrived { bot: String, attempts: u32 },

    #[error("cancelled while waiting for trigger acknowledgment")]
    CancelledDuringSetup,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Conditions that refuse to let a round end. Recoverable: the working
/// session is expected to resolve the condition and retry.
#[derive(Debug, Error)]
pub enum BlockReason {
    #[error("{ahead} local commit(s) not pushed to upstream; push them before ending the round")]
    UnpushedCommits { ahead: usize },

    #[error("branch '{branch}' has no upstream; push the branch and set its upstream first")]
    NoUpstream { branch: String },

    #[error(
        "history was rewritten since the last trigger ({recorded} is no longer an ancestor of {tip}); reviewers must be re-triggered against the new history"
    )]
    HistoryRewritten { recorded: String, tip: String },

    #[error("round {round} has no confirmed trigger; comment on the PR mentioning the reviewers, then retry")]
    MissingTrigger { round: u32 },

    #[error("could not confirm reviewers saw the re-review request: {message}")]
    TriggerUnconfirmed { message: String },
}

/// Integrity violations in the persisted session record. These are surfaced
/// loudly rather than guessed at.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session directory {dir} holds both an active and a terminal record")]
    ConflictingRecords { dir: PathBuf },

    #[error("session directory {dir} holds no session record at all")]
    MissingRecord { dir: PathBuf },

    #[error("session directory {dir} holds more than one terminal record")]
    MultipleTerminals { dir: PathBuf },

    #[error("malformed session record at {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("session record at {path} violates an invariant: {message}")]
    InvariantViolated { path: PathBuf, message: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
