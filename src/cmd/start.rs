//! `revloop start` — classify the pull request, create the session, and fire
//! the initial trigger when the startup case calls for one.

use anyhow::{Context, Result};
use chrono::Utc;
use console::style;
use std::path::Path;

use revloop::bots::BotSpec;
use revloop::classify::classify;
use revloop::config::{Paths, RevloopConfig, github_token};
use revloop::github::{GithubClient, ReviewPlatform, parse_owner_repo};
use revloop::poll::Poller;
use revloop::repo::{BranchView, GitRepo};
use revloop::session::store::CANCEL_SENTINEL;
use revloop::session::{LoopKind, SessionRecord, SessionStore};
use revloop::trigger;

pub async fn cmd_start(
    project_dir: &Path,
    pr: u64,
    bots: Vec<String>,
    max_rounds: Option<u32>,
) -> Result<()> {
    let config = RevloopConfig::load(project_dir)?;
    let bot_names = if bots.is_empty() { config.bots.clone() } else { bots };
    let specs = BotSpec::resolve_all(&bot_names);

    let repo = GitRepo::open(project_dir)?;
    let branch = repo.branch_name()?;
    let slug = parse_owner_repo(&repo.origin_url()?)
        .context("Remote 'origin' is not a GitHub repository")?;
    let token = github_token()?;
    let platform = GithubClient::connect(token, &slug, config.api_retries).await?;

    let (sha, commit_time) = repo.head_sha_time()?;
    let all_events = platform.fetch_events(pr, None).await?;
    let classification = classify(&all_events, &specs, &sha, commit_time);
    println!(
        "PR #{pr} on {branch}: startup case {}",
        style(classification.case.as_number()).bold()
    );

    let mut record = SessionRecord {
        pr_number: pr,
        branch,
        configured_bots: bot_names.clone(),
        active_bots: bot_names,
        round: 0,
        max_rounds: max_rounds.unwrap_or(config.max_rounds),
        poll_interval_secs: config.poll_interval_secs,
        bot_timeout_secs: config.bot_timeout_secs,
        created_at: Utc::now(),
        startup_case: classification.case,
        latest_commit_sha: classification.latest_commit_sha.clone(),
        latest_commit_at: classification.latest_commit_at,
        last_trigger_at: None,
        last_trigger_comment_id: None,
    };

    let paths = Paths::new(project_dir);
    let store = SessionStore::create(&paths.revloop_dir(), LoopKind::Review, &record)?;

    // Cases 4 and 5: the branch moved after the reviews, so the session only
    // exists once the reviewers confirmed they saw the re-review request. An
    // unconfirmed trigger discards the session rather than leaving the loop
    // waiting on a reviewer that never saw it.
    if classification.case.needs_trigger() {
        let poller = Poller::new(config.poll_interval())
            .with_sentinel(store.dir().join(CANCEL_SENTINEL));
        match trigger::fire(&platform, pr, &specs, &config, &poller).await {
            Ok(outcome) => {
                record.record_trigger(
                    outcome.comment_id,
                    outcome.triggered_at,
                    classification.latest_commit_sha,
                    classification.latest_commit_at,
                );
                store.save(&record)?;
                println!("Trigger confirmed (comment {})", outcome.comment_id);
            }
            Err(e) => {
                store.discard()?;
                return Err(anyhow::Error::new(e).context("Session setup failed"));
            }
        }
    }

    println!(
        "{} session {} for PR #{pr} ({} reviewer(s), max {} rounds)",
        style("Started").green(),
        record.dir_name(),
        record.configured_bots.len(),
        record.max_rounds
    );
    Ok(())
}
