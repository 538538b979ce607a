//! Phase detection: a pure, side-effect-free mapping from on-disk session
//! state to the human-facing lifecycle phase. Safe to call from the loop and
//! from an independent monitor concurrently; terminal markers always win over
//! round-based inference.

use crate::classify::StartupCase;
use crate::errors::StoreError;
use crate::session::store::{SessionState, SessionStore, Terminal};
use std::fmt;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// How recently the judge scratch file must have been written for the
/// session to count as "a judge invocation is producing output right now".
const ANALYZING_WINDOW: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Approved,
    Cancelled,
    MaxIterationsReached,
    /// An external judge invocation is actively producing output.
    ReviewerAnalyzing,
    /// Round 0 and no reviewer has ever commented.
    WaitingInitialReview,
    /// Any other non-terminal state.
    WaitingReviewer,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Approved => "approved",
            Self::Cancelled => "cancelled",
            Self::MaxIterationsReached => "max-iterations-reached",
            Self::ReviewerAnalyzing => "reviewer-analyzing",
            Self::WaitingInitialReview => "waiting-initial-review",
            Self::WaitingReviewer => "waiting-reviewer",
        };
        write!(f, "{s}")
    }
}

/// Name of the scratch file the judge streams into for a given round.
pub fn judge_scratch_file(round: u32) -> String {
    format!("judge-round-{round}.log")
}

/// Detect the current phase of a session directory.
pub fn detect(dir: &Path) -> Result<Phase, StoreError> {
    match SessionStore::at(dir).load()? {
        SessionState::Finished(Terminal::Approved, _) => Ok(Phase::Approved),
        SessionState::Finished(Terminal::Cancelled, _) => Ok(Phase::Cancelled),
        SessionState::Finished(Terminal::MaxRounds, _) => Ok(Phase::MaxIterationsReached),
        SessionState::Active(record) => {
            if scratch_is_fresh(dir, record.round) {
                return Ok(Phase::ReviewerAnalyzing);
            }
            if record.round == 0 && record.startup_case == StartupCase::NoReviews {
                return Ok(Phase::WaitingInitialReview);
            }
            Ok(Phase::WaitingReviewer)
        }
    }
}

fn scratch_is_fresh(dir: &Path, round: u32) -> bool {
    let path = dir.join(judge_scratch_file(round));
    let Ok(meta) = std::fs::metadata(&path) else {
        return false;
    };
    let Ok(modified) = meta.modified() else {
        return false;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age <= ANALYZING_WINDOW,
        // Modified "in the future" means a clock hiccup; treat as fresh.
        Err(_) => true,
    }
}
