//! The reconciliation loop, entered every time the working session tries to
//! end a round.
//!
//! Checks run in order and the round blocks on the first failure: clean push,
//! history integrity since the last trigger, trigger requirement, then the
//! poll-and-judge pass over the reviewers still in `active_bots`. A reviewer
//! that stays silent for its whole poll budget is auto-dropped: silence is an
//! implicit non-block, not an approval. This is a deliberate availability
//! trade-off (forward progress over strict unanimity); do not "fix" it.

use crate::bots::BotSpec;
use crate::classify::classify;
use crate::config::RevloopConfig;
use crate::errors::{BlockReason, SetupError};
use crate::events::{self, ReviewEvent};
use crate::github::ReviewPlatform;
use crate::judge::{Issue, JudgeInput, ReviewJudge, ReviewerStatus};
use crate::ledger::{Ledger, LedgerEntry};
use crate::poll::{PollResult, Poller};
use crate::repo::BranchView;
use crate::session::store::CANCEL_SENTINEL;
use crate::session::{SessionRecord, SessionState, SessionStore, Terminal};
use crate::trigger;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

const OPEN_ISSUES_FILE: &str = "issues.json";

/// What the working session is told at the round boundary.
#[derive(Debug)]
pub enum RoundOutcome {
    /// Round-end refused; the reason's display string is the actionable message.
    Blocked { reason: BlockReason },
    /// Round ended; outstanding issues to act on next round.
    Proceed { feedback: Vec<Issue> },
    /// The session reached a terminal state.
    Finished { terminal: Terminal },
}

pub struct Reconciler<'a> {
    pub platform: &'a dyn ReviewPlatform,
    pub judge: &'a dyn ReviewJudge,
    pub repo: &'a dyn BranchView,
    pub store: &'a SessionStore,
    pub config: &'a RevloopConfig,
}

impl Reconciler<'_> {
    /// Run one reconciliation pass. Never concurrent with itself: invoked
    /// only as a direct response to a round-end attempt.
    pub async fn run_round(&self) -> Result<RoundOutcome> {
        let mut record = match self.store.load()? {
            SessionState::Active(record) => record,
            SessionState::Finished(terminal, _) => {
                return Ok(RoundOutcome::Finished { terminal });
            }
        };

        if self.store.cancel_requested() {
            return self.finish(&record, Terminal::Cancelled);
        }

        // 1. Clean-push check.
        match self.repo.ahead_of_upstream()? {
            Some(0) => {}
            Some(ahead) => {
                return Ok(RoundOutcome::Blocked {
                    reason: BlockReason::UnpushedCommits { ahead },
                });
            }
            None => {
                return Ok(RoundOutcome::Blocked {
                    reason: BlockReason::NoUpstream {
                        branch: self.repo.branch_name()?,
                    },
                });
            }
        }

        // 2. History-integrity check. A rewrite invalidates the old trigger
        // even if reviewers had already approved under the old history.
        let (tip_sha, tip_time) = self.repo.head_sha_time()?;
        let mut trigger_invalidated = false;
        if !self.repo.is_ancestor_of_head(&record.latest_commit_sha)? {
            tracing::warn!(
                recorded = %record.latest_commit_sha,
                tip = %tip_sha,
                "history rewritten since last trigger"
            );
            record.clear_trigger();
            trigger_invalidated = true;
        }

        // Reclassify against the live state: new commits or reviewer comments
        // can arrive between rounds.
        let all_events = self
            .platform
            .fetch_events(record.pr_number, None)
            .await
            .context("Failed to fetch review events")?;
        let configured = BotSpec::resolve_all(&record.configured_bots);
        let classification = classify(&all_events, &configured, &tip_sha, tip_time);

        // A previously-approved reviewer that spoke up again after the last
        // trigger is back in the round.
        if let Some(last_trigger) = record.last_trigger_at {
            for spec in &configured {
                if !record.active_bots.contains(&spec.name)
                    && events::latest_by(&all_events, spec).is_some_and(|t| t > last_trigger)
                {
                    tracing::info!(bot = %spec.name, "reviewer posted new feedback; restoring");
                    record.restore_bot(&spec.name);
                }
            }
        }

        // 3. Trigger requirement. The loop re-fires the coordinator itself
        // when the branch moved past the current trigger.
        let needs_trigger = trigger_invalidated
            || (classification.case.needs_trigger()
                && record
                    .last_trigger_at
                    .is_none_or(|t| t < classification.latest_commit_at));
        if needs_trigger && !record.active_bots.is_empty() {
            let active = BotSpec::resolve_all(&record.active_bots);
            let poller = self.poller(&record);
            match trigger::fire(self.platform, record.pr_number, &active, self.config, &poller)
                .await
            {
                Ok(outcome) => {
                    record.record_trigger(
                        outcome.comment_id,
                        outcome.triggered_at,
                        tip_sha.clone(),
                        tip_time,
                    );
                    self.store.save(&record)?;
                }
                Err(SetupError::CancelledDuringSetup) => {
                    return self.finish(&record, Terminal::Cancelled);
                }
                Err(e) => {
                    return Ok(RoundOutcome::Blocked {
                        reason: BlockReason::TriggerUnconfirmed {
                            message: e.to_string(),
                        },
                    });
                }
            }
        }

        // Round 0 in startup cases 1-3 never required a trigger; every other
        // round must have one.
        let exempt = record.round == 0 && !record.startup_case.needs_trigger();
        if !exempt && record.last_trigger_at.is_none() {
            return Ok(RoundOutcome::Blocked {
                reason: BlockReason::MissingTrigger {
                    round: record.round,
                },
            });
        }

        // 4. Poll-and-judge.
        let responded = match self.poll_reviewers(&record).await? {
            PollReviewers::Responded(responded) => responded,
            PollReviewers::Cancelled => {
                return self.finish(&record, Terminal::Cancelled);
            }
        };
        let silent: Vec<String> = record
            .active_bots
            .iter()
            .filter(|name| !responded.contains_key(*name))
            .cloned()
            .collect();
        for name in silent {
            tracing::warn!(bot = %name, "no response within poll budget; dropping (non-block, not approval)");
            record.drop_bot(&name);
        }

        let mut feedback = load_open_issues(self.store)?;
        if !responded.is_empty() {
            let input = JudgeInput {
                pr_number: record.pr_number,
                branch: record.branch.clone(),
                round: record.round,
                events: responded,
                prior_issues: feedback.clone(),
            };
            match self.judge.judge(&input).await {
                Ok(verdict) => {
                    tracing::debug!(recommendation = ?verdict.recommendation, "judge verdict received");
                    // 5. Ledger update, idempotent per (round, reviewer).
                    let ledger = Ledger::new(self.store.dir());
                    for rv in &verdict.reviewers {
                        ledger.record(
                            record.round + 1,
                            &LedgerEntry {
                                reviewer: rv.reviewer.clone(),
                                issues_found: rv.issues_found,
                                issues_resolved: rv.issues_resolved,
                                status: status_label(rv.status).to_string(),
                            },
                        )?;
                    }
                    for name in &verdict.remove_from_active {
                        record.drop_bot(name);
                    }
                    feedback = verdict.issues;
                    save_open_issues(self.store, &feedback)?;
                }
                Err(e) => {
                    // Recoverable: no verdict this round, reviewers stay active.
                    tracing::warn!("judge failed this round, keeping reviewers active: {e:#}");
                }
            }
        }

        // 6. Decision.
        record.round += 1;
        record.latest_commit_sha = tip_sha;
        record.latest_commit_at = tip_time;

        if record.active_bots.is_empty() {
            return self.finish(&record, Terminal::Approved);
        }
        if record.round >= record.max_rounds {
            return self.finish(&record, Terminal::MaxRounds);
        }
        self.store.save(&record)?;
        Ok(RoundOutcome::Proceed { feedback })
    }

    /// Poll every active reviewer for events newer than the last trigger.
    /// All reviewers share one poll window, so no reviewer's clock blocks
    /// another's; whoever has not produced an event when the window closes
    /// is reported missing from the result map.
    async fn poll_reviewers(&self, record: &SessionRecord) -> Result<PollReviewers> {
        if record.active_bots.is_empty() {
            return Ok(PollReviewers::Responded(BTreeMap::new()));
        }

        let cursor = record.last_trigger_at;
        let remaining = Mutex::new(record.active_bots.clone());
        let responded: Mutex<BTreeMap<String, Vec<ReviewEvent>>> = Mutex::new(BTreeMap::new());
        let poller = self.poller(record);

        let result = poller
            .run(Duration::from_secs(record.bot_timeout_secs), || {
                let remaining = &remaining;
                let responded = &responded;
                async move {
                    let fresh = self
                        .platform
                        .fetch_events(record.pr_number, cursor)
                        .await
                        .context("Failed to poll review events")?;
                    let mut remaining = remaining.lock().unwrap();
                    let mut responded = responded.lock().unwrap();
                    remaining.retain(|name| {
                        let spec = BotSpec::resolve(name);
                        let mut events: Vec<ReviewEvent> = fresh
                            .iter()
                            .filter(|e| e.authored_by(&spec))
                            .cloned()
                            .collect();
                        if events.is_empty() {
                            true
                        } else {
                            events::sort_for_review(&mut events);
                            responded.insert(name.clone(), events);
                            false
                        }
                    });
                    if remaining.is_empty() {
                        Ok(Some(()))
                    } else {
                        Ok(None)
                    }
                }
            })
            .await?;

        match result {
            PollResult::Cancelled => Ok(PollReviewers::Cancelled),
            PollResult::Found(()) | PollResult::TimedOut => Ok(PollReviewers::Responded(
                responded.into_inner().unwrap(),
            )),
        }
    }

    fn poller(&self, record: &SessionRecord) -> Poller {
        Poller::new(Duration::from_secs(record.poll_interval_secs))
            .with_sentinel(self.store.dir().join(CANCEL_SENTINEL))
    }

    /// Transition to a terminal form, tolerating a cancel that already
    /// renamed the record out from under us.
    fn finish(&self, record: &SessionRecord, terminal: Terminal) -> Result<RoundOutcome> {
        match self.store.load()? {
            SessionState::Active(_) => {
                self.store.save(record)?;
                self.store.finish(terminal)?;
                tracing::info!(terminal = ?terminal, "session finished");
                Ok(RoundOutcome::Finished { terminal })
            }
            SessionState::Finished(existing, _) => {
                Ok(RoundOutcome::Finished { terminal: existing })
            }
        }
    }
}

enum PollReviewers {
    Responded(BTreeMap<String, Vec<ReviewEvent>>),
    Cancelled,
}

fn status_label(status: ReviewerStatus) -> &'static str {
    match status {
        ReviewerStatus::Approve => "approved",
        ReviewerStatus::HasIssues => "has-issues",
    }
}

/// Issues still open from earlier rounds, fed back to the judge as context.
pub fn load_open_issues(store: &SessionStore) -> Result<Vec<Issue>> {
    let path = store.dir().join(OPEN_ISSUES_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).context("Malformed open-issues file")
}

fn save_open_issues(store: &SessionStore, issues: &[Issue]) -> Result<()> {
    let path = store.dir().join(OPEN_ISSUES_FILE);
    let json = serde_json::to_string_pretty(issues).context("Failed to serialize open issues")?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))
}
