//! `revloop check` — the round-boundary hook. Exit code 0 lets the round
//! end (optionally carrying outstanding issues on stdout); exit code 1
//! refuses it with the blocking reason on stderr.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use revloop::config::{Paths, RevloopConfig, github_token};
use revloop::github::{GithubClient, parse_owner_repo};
use revloop::judge::CommandJudge;
use revloop::reconcile::{Reconciler, RoundOutcome};
use revloop::repo::GitRepo;
use revloop::session::{SessionStore, find_active};

pub async fn cmd_check(project_dir: &Path) -> Result<i32> {
    let config = RevloopConfig::load(project_dir)?;
    let paths = Paths::new(project_dir);
    let session_dir = find_active(&paths.revloop_dir())?
        .context("No active session; run 'revloop start' first")?;
    let store = SessionStore::at(&session_dir);

    let repo = GitRepo::open(project_dir)?;
    let slug = parse_owner_repo(&repo.origin_url()?)
        .context("Remote 'origin' is not a GitHub repository")?;
    let token = github_token()?;
    let platform = GithubClient::connect(token, &slug, config.api_retries).await?;
    let judge = CommandJudge::new(
        config.judge_cmd.clone(),
        config.judge_timeout(),
        store.dir(),
    );

    let reconciler = Reconciler {
        platform: &platform,
        judge: &judge,
        repo: &repo,
        store: &store,
        config: &config,
    };

    match reconciler.run_round().await? {
        RoundOutcome::Blocked { reason } => {
            eprintln!("{} {reason}", style("blocked:").red().bold());
            Ok(1)
        }
        RoundOutcome::Proceed { feedback } => {
            if feedback.is_empty() {
                println!("Round complete; no outstanding issues.");
            } else {
                println!("Round complete; {} outstanding issue(s):", feedback.len());
                for issue in &feedback {
                    println!("  [{}] {}", issue.reviewer, issue.summary);
                }
            }
            Ok(0)
        }
        RoundOutcome::Finished { terminal } => {
            println!("{} session finished: {terminal:?}", style("done:").green());
            Ok(0)
        }
    }
}
