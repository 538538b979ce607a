//! The trigger coordinator: re-invokes reviewers after new commits.
//!
//! Posts a single comment carrying every active reviewer's re-review phrase
//! and records the comment's platform-assigned id and platform-reported
//! creation time. Reviewers that confirm receipt with an eyes reaction are
//! polled for that signal with a small bounded retry budget; a trigger that
//! is never acknowledged fails the operation outright, because a session
//! must not end up waiting on a reviewer that never saw the request.

use crate::bots::BotSpec;
use crate::config::RevloopConfig;
use crate::errors::SetupError;
use crate::github::ReviewPlatform;
use crate::poll::{PollResult, Poller};
use chrono::{DateTime, Utc};

const ACK_REACTION: &str = "eyes";

/// A confirmed trigger.
#[derive(Debug, Clone)]
pub struct TriggerOutcome {
    pub comment_id: u64,
    /// Platform-reported creation time of the trigger comment.
    pub triggered_at: DateTime<Utc>,
}

/// Body of the trigger comment: one re-review phrase per active reviewer.
pub fn trigger_body(bots: &[BotSpec]) -> String {
    let mut lines: Vec<String> = bots.iter().map(|b| b.trigger_phrase.clone()).collect();
    lines.push(String::new());
    lines.push("New commits have been pushed; please re-review the latest changes.".to_string());
    lines.join("\n")
}

/// Post the trigger and confirm receipt.
///
/// `poller` carries the cancellation sources of the calling context, so an
/// operator cancel interrupts the acknowledgment wait too.
pub async fn fire(
    platform: &dyn ReviewPlatform,
    pr: u64,
    bots: &[BotSpec],
    config: &RevloopConfig,
    poller: &Poller,
) -> Result<TriggerOutcome, SetupError> {
    let body = trigger_body(bots);
    let posted = platform
        .post_comment(pr, &body)
        .await
        .map_err(SetupError::Other)?;
    if posted.id == 0 {
        return Err(SetupError::TriggerIdMissing);
    }
    tracing::info!(
        comment_id = posted.id,
        bots = bots.len(),
        "posted re-review trigger"
    );

    for bot in bots.iter().filter(|b| b.needs_ack) {
        confirm_ack(platform, posted.id, bot, config, poller).await?;
    }

    Ok(TriggerOutcome {
        comment_id: posted.id,
        triggered_at: posted.created_at,
    })
}

async fn confirm_ack(
    platform: &dyn ReviewPlatform,
    comment_id: u64,
    bot: &BotSpec,
    config: &RevloopConfig,
    poller: &Poller,
) -> Result<(), SetupError> {
    let result = poller
        .run_attempts(config.ack_attempts, config.ack_delay(), || async {
            let reactions = platform.comment_reactions(comment_id).await?;
            if reactions.iter().any(|r| r == ACK_REACTION) {
                Ok(Some(()))
            } else {
                Ok(None)
            }
        })
        .await
        .map_err(SetupError::Other)?;

    match result {
        PollResult::Found(()) => {
            tracing::debug!(bot = %bot.name, "trigger acknowledged");
            Ok(())
        }
        PollResult::TimedOut => Err(SetupError::AckNeverArrived {
            bot: bot.name.clone(),
            attempts: config.ack_attempts,
        }),
        PollResult::Cancelled => Err(SetupError::CancelledDuringSetup),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::PostedComment;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted platform: reaction fetches pop from a queue.
    struct ScriptedPlatform {
        comment_id: u64,
        reactions: Mutex<Vec<Vec<String>>>,
        posted: Mutex<Vec<String>>,
    }

    impl ScriptedPlatform {
        fn new(comment_id: u64, reactions: Vec<Vec<String>>) -> Self {
            Self {
                comment_id,
                reactions: Mutex::new(reactions),
                posted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ReviewPlatform for ScriptedPlatform {
        async fn fetch_events(
            &self,
            _pr: u64,
            _cursor: Option<DateTime<Utc>>,
        ) -> Result<Vec<crate::events::ReviewEvent>> {
            Ok(Vec::new())
        }

        async fn post_comment(&self, _pr: u64, body: &str) -> Result<PostedComment> {
            self.posted.lock().unwrap().push(body.to_string());
            Ok(PostedComment {
                id: self.comment_id,
                created_at: Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap(),
            })
        }

        async fn comment_reactions(&self, _comment_id: u64) -> Result<Vec<String>> {
            let mut queue = self.reactions.lock().unwrap();
            if queue.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(queue.remove(0))
            }
        }
    }

    fn fast_config() -> RevloopConfig {
        RevloopConfig {
            ack_attempts: 3,
            ack_delay_secs: 0,
            ..RevloopConfig::default()
        }
    }

    fn fast_poller() -> Poller {
        Poller::new(Duration::from_millis(5))
    }

    #[test]
    fn test_trigger_body_contains_every_phrase() {
        let bots = vec![BotSpec::resolve("coderabbit"), BotSpec::resolve("gemini")];
        let body = trigger_body(&bots);
        assert!(body.contains("@coderabbitai review"));
        assert!(body.contains("/gemini review"));
        assert!(body.contains("re-review"));
    }

    #[tokio::test]
    async fn test_fire_without_ack_bots_returns_platform_time() {
        let platform = ScriptedPlatform::new(991, vec![]);
        let bots = vec![BotSpec::resolve("gemini")];
        let outcome = fire(&platform, 42, &bots, &fast_config(), &fast_poller())
            .await
            .unwrap();
        assert_eq!(outcome.comment_id, 991);
        assert_eq!(
            outcome.triggered_at,
            Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap()
        );
        assert_eq!(platform.posted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fire_confirms_eyes_reaction_after_retries() {
        let platform = ScriptedPlatform::new(
            991,
            vec![vec![], vec![], vec!["eyes".to_string()]],
        );
        let bots = vec![BotSpec::resolve("coderabbit")];
        let outcome = fire(&platform, 42, &bots, &fast_config(), &fast_poller()).await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn test_fire_fails_when_ack_never_arrives() {
        let platform = ScriptedPlatform::new(991, vec![]);
        let bots = vec![BotSpec::resolve("coderabbit")];
        let err = fire(&platform, 42, &bots, &fast_config(), &fast_poller())
            .await
            .unwrap_err();
        match err {
            SetupError::AckNeverArrived { bot, .. } => assert_eq!(bot, "coderabbit"),
            other => panic!("expected AckNeverArrived, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fire_fails_when_comment_id_missing() {
        let platform = ScriptedPlatform::new(0, vec![]);
        let bots = vec![BotSpec::resolve("gemini")];
        let err = fire(&platform, 42, &bots, &fast_config(), &fast_poller())
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::TriggerIdMissing));
    }

    #[tokio::test]
    async fn test_other_reactions_do_not_count_as_ack() {
        let platform = ScriptedPlatform::new(991, vec![vec!["+1".to_string()]; 10]);
        let bots = vec![BotSpec::resolve("coderabbit")];
        let err = fire(&platform, 42, &bots, &fast_config(), &fast_poller())
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::AckNeverArrived { .. }));
    }
}
