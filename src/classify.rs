//! Startup classification: which of the five review/commit states a pull
//! request is in. Pure over its inputs; re-run by the reconciliation loop on
//! every round, not only at session creation, because new commits or reviewer
//! comments can arrive between rounds.

use crate::bots::BotSpec;
use crate::events::{self, ReviewEvent};
use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The 1-5 classification of review/commit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupCase {
    /// 1: no reviewer has commented yet.
    NoReviews,
    /// 2: some but not all configured reviewers have commented; no new commits since.
    PartialReviews,
    /// 3: all configured reviewers have commented; no new commits since.
    AllReviewed,
    /// 4: all reviewers commented, but the branch moved after the last review.
    AllReviewedNewCommits,
    /// 5: some reviewers commented, and the branch moved after the latest review.
    PartialReviewsNewCommits,
}

impl StartupCase {
    pub fn as_number(self) -> u8 {
        match self {
            Self::NoReviews => 1,
            Self::PartialReviews => 2,
            Self::AllReviewed => 3,
            Self::AllReviewedNewCommits => 4,
            Self::PartialReviewsNewCommits => 5,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::NoReviews),
            2 => Some(Self::PartialReviews),
            3 => Some(Self::AllReviewed),
            4 => Some(Self::AllReviewedNewCommits),
            5 => Some(Self::PartialReviewsNewCommits),
            _ => None,
        }
    }

    /// Cases 4 and 5: the branch moved after the reviews, so the reviewers
    /// must be re-invoked before their old feedback can be trusted.
    pub fn needs_trigger(self) -> bool {
        matches!(self, Self::AllReviewedNewCommits | Self::PartialReviewsNewCommits)
    }
}

// Persisted as the bare 1-5 number the operators know the cases by.
impl Serialize for StartupCase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_number())
    }
}

impl<'de> Deserialize<'de> for StartupCase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let n = u8::deserialize(deserializer)?;
        Self::from_number(n).ok_or_else(|| D::Error::custom(format!("invalid startup case {n}")))
    }
}

/// Classifier output: the case plus the commit it was computed against.
#[derive(Debug, Clone)]
pub struct Classification {
    pub case: StartupCase,
    pub latest_commit_sha: String,
    pub latest_commit_at: DateTime<Utc>,
}

/// Classify the current review/commit state of a pull request.
///
/// A reviewer "has commented" if any event authored by one of its platform
/// identities exists. The branch "has moved" if the latest commit is strictly
/// newer than the newest review event across all commenting reviewers; a tie
/// counts as no new commits.
pub fn classify(
    all_events: &[ReviewEvent],
    configured: &[BotSpec],
    latest_commit_sha: &str,
    latest_commit_at: DateTime<Utc>,
) -> Classification {
    let newest_review: Option<DateTime<Utc>> = configured
        .iter()
        .filter_map(|spec| events::latest_by(all_events, spec))
        .max();
    let commented = configured
        .iter()
        .filter(|spec| events::latest_by(all_events, spec).is_some())
        .count();

    let case = match newest_review {
        None => StartupCase::NoReviews,
        Some(newest) => {
            let branch_moved = latest_commit_at > newest;
            let all = commented == configured.len();
            match (all, branch_moved) {
                (true, false) => StartupCase::AllReviewed,
                (true, true) => StartupCase::AllReviewedNewCommits,
                (false, false) => StartupCase::PartialReviews,
                (false, true) => StartupCase::PartialReviewsNewCommits,
            }
        }
    };

    Classification {
        case,
        latest_commit_sha: latest_commit_sha.to_string(),
        latest_commit_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn bot_event(id: u64, login: &str, secs: i64) -> ReviewEvent {
        ReviewEvent::new(id, login, at(secs), "feedback", EventKind::Comment)
    }

    fn two_bots() -> Vec<BotSpec> {
        vec![BotSpec::resolve("coderabbit"), BotSpec::resolve("gemini")]
    }

    #[test]
    fn test_case_1_no_reviews() {
        let c = classify(&[], &two_bots(), "abc", at(100));
        assert_eq!(c.case, StartupCase::NoReviews);
        assert_eq!(c.latest_commit_sha, "abc");
    }

    #[test]
    fn test_case_1_even_with_newer_commits() {
        // Human chatter does not count as reviewer comments.
        let events = vec![bot_event(1, "alice", 50)];
        let c = classify(&events, &two_bots(), "abc", at(100));
        assert_eq!(c.case, StartupCase::NoReviews);
    }

    #[test]
    fn test_case_2_partial_no_new_commits() {
        let events = vec![bot_event(1, "coderabbitai[bot]", 50)];
        let c = classify(&events, &two_bots(), "abc", at(10));
        assert_eq!(c.case, StartupCase::PartialReviews);
    }

    #[test]
    fn test_case_3_all_reviewed() {
        let events = vec![
            bot_event(1, "coderabbitai[bot]", 50),
            bot_event(2, "gemini-code-assist[bot]", 60),
        ];
        let c = classify(&events, &two_bots(), "abc", at(10));
        assert_eq!(c.case, StartupCase::AllReviewed);
    }

    #[test]
    fn test_case_4_all_reviewed_branch_moved() {
        let events = vec![
            bot_event(1, "coderabbitai[bot]", 50),
            bot_event(2, "gemini-code-assist[bot]", 60),
        ];
        let c = classify(&events, &two_bots(), "abc", at(100));
        assert_eq!(c.case, StartupCase::AllReviewedNewCommits);
        assert!(c.case.needs_trigger());
    }

    #[test]
    fn test_case_5_partial_branch_moved() {
        let events = vec![bot_event(1, "coderabbitai[bot]", 50)];
        let c = classify(&events, &two_bots(), "abc", at(100));
        assert_eq!(c.case, StartupCase::PartialReviewsNewCommits);
        assert!(c.case.needs_trigger());
    }

    #[test]
    fn test_commit_time_tie_is_no_new_commits() {
        let events = vec![
            bot_event(1, "coderabbitai[bot]", 50),
            bot_event(2, "gemini-code-assist[bot]", 50),
        ];
        let c = classify(&events, &two_bots(), "abc", at(50));
        assert_eq!(c.case, StartupCase::AllReviewed);
    }

    #[test]
    fn test_invariant_under_same_timestamp_reordering() {
        let a = bot_event(1, "coderabbitai[bot]", 50);
        let b = bot_event(2, "gemini-code-assist[bot]", 50);
        let forward = classify(
            &[a.clone(), b.clone()],
            &two_bots(),
            "abc",
            at(60),
        );
        let reversed = classify(&[b, a], &two_bots(), "abc", at(60));
        assert_eq!(forward.case, reversed.case);
    }

    #[test]
    fn test_case_roundtrips_through_numbers() {
        for n in 1..=5u8 {
            let case = StartupCase::from_number(n).unwrap();
            assert_eq!(case.as_number(), n);
        }
        assert!(StartupCase::from_number(0).is_none());
        assert!(StartupCase::from_number(6).is_none());
    }
}
