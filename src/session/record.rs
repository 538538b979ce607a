//! The persisted session record: one review cycle for one pull request.

use crate::classify::StartupCase;
use crate::errors::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub pr_number: u64,
    pub branch: String,
    /// Fixed set of reviewer names chosen at creation, never mutated.
    pub configured_bots: Vec<String>,
    /// Mutable subset still required to approve.
    pub active_bots: Vec<String>,
    pub round: u32,
    pub max_rounds: u32,
    pub poll_interval_secs: u64,
    pub bot_timeout_secs: u64,
    pub created_at: DateTime<Utc>,
    pub startup_case: StartupCase,
    pub latest_commit_sha: String,
    pub latest_commit_at: DateTime<Utc>,
    /// Platform-reported creation time of the last trigger comment. Never
    /// the local clock, to avoid clock-skew false negatives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trigger_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trigger_comment_id: Option<u64>,
}

impl SessionRecord {
    /// Directory name for this session: the creation timestamp, sortable and
    /// unique per session.
    pub fn dir_name(&self) -> String {
        self.created_at.format("%Y%m%d-%H%M%S").to_string()
    }

    /// Validate the record invariants; used on every load so a corrupted
    /// record fails fast instead of steering the loop.
    pub fn validate(&self, path: &Path) -> Result<(), StoreError> {
        for bot in &self.active_bots {
            if !self.configured_bots.contains(bot) {
                return Err(StoreError::InvariantViolated {
                    path: path.to_path_buf(),
                    message: format!("active bot '{bot}' is not in configured_bots"),
                });
            }
        }
        if self.max_rounds == 0 {
            return Err(StoreError::InvariantViolated {
                path: path.to_path_buf(),
                message: "max_rounds must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Remove a reviewer from the active set (approval or timeout auto-drop).
    pub fn drop_bot(&mut self, name: &str) {
        self.active_bots.retain(|b| b != name);
    }

    /// Restore a previously-approved reviewer that raised a new issue.
    /// Only configured reviewers can come back; the active set stays a
    /// subset of `configured_bots`.
    pub fn restore_bot(&mut self, name: &str) -> bool {
        if self.configured_bots.iter().any(|b| b == name)
            && !self.active_bots.iter().any(|b| b == name)
        {
            self.active_bots.push(name.to_string());
            true
        } else {
            false
        }
    }

    /// Record a confirmed trigger against the given branch tip.
    pub fn record_trigger(
        &mut self,
        comment_id: u64,
        triggered_at: DateTime<Utc>,
        commit_sha: String,
        commit_at: DateTime<Utc>,
    ) {
        self.last_trigger_comment_id = Some(comment_id);
        self.last_trigger_at = Some(triggered_at);
        self.latest_commit_sha = commit_sha;
        self.latest_commit_at = commit_at;
    }

    /// Invalidate the trigger after a history rewrite.
    pub fn clear_trigger(&mut self) {
        self.last_trigger_comment_id = None;
        self.last_trigger_at = None;
    }
}

/// Test fixture shared by the session/store/loop tests.
#[cfg(test)]
pub(crate) fn sample_record() -> SessionRecord {
    use chrono::TimeZone;
    SessionRecord {
        pr_number: 42,
        branch: "feature/login".into(),
        configured_bots: vec!["coderabbit".into(), "gemini".into()],
        active_bots: vec!["coderabbit".into(), "gemini".into()],
        round: 0,
        max_rounds: 10,
        poll_interval_secs: 30,
        bot_timeout_secs: 600,
        created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap(),
        startup_case: StartupCase::NoReviews,
        latest_commit_sha: "abc123".into(),
        latest_commit_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        last_trigger_at: None,
        last_trigger_comment_id: None,
    }
}
