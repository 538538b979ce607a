//! The external review-judgment interface.
//!
//! Deciding whether a reviewer's comments amount to approval or outstanding
//! work is delegated to an external command, treated as an opaque oracle. The
//! loop only depends on the [`ReviewJudge`] trait, so its state machine is
//! testable with a deterministic fake; the production implementation spawns
//! the configured command, feeds it the round context as JSON on stdin, and
//! expects a JSON verdict on stdout. A timeout or crash of the judge is a
//! recoverable failure for the current round, never a fatal one.

use crate::events::ReviewEvent;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

/// Context handed to the judge for one round.
#[derive(Debug, Clone, Serialize)]
pub struct JudgeInput {
    pub pr_number: u64,
    pub branch: String,
    pub round: u32,
    /// New events per reviewer, in review order (humans first).
    pub events: BTreeMap<String, Vec<ReviewEvent>>,
    /// Issues still open from earlier rounds.
    pub prior_issues: Vec<Issue>,
}

/// One issue a reviewer raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub reviewer: String,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewerStatus {
    Approve,
    HasIssues,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerVerdict {
    pub reviewer: String,
    pub status: ReviewerStatus,
    #[serde(default)]
    pub issues_found: u64,
    #[serde(default)]
    pub issues_resolved: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recommendation {
    Continue,
    Finish,
}

/// Structured verdict returned by the judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub reviewers: Vec<ReviewerVerdict>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    /// Reviewers whose feedback amounted to approval.
    #[serde(default)]
    pub remove_from_active: Vec<String>,
    pub recommendation: Recommendation,
}

#[async_trait]
pub trait ReviewJudge: Send + Sync {
    async fn judge(&self, input: &JudgeInput) -> Result<JudgeVerdict>;
}

/// Judge backed by an external command.
pub struct CommandJudge {
    cmd: String,
    timeout: Duration,
    /// Stdout is streamed here line by line; the phase detector reads the
    /// file's freshness to report "reviewer analyzing".
    scratch_dir: PathBuf,
}

impl CommandJudge {
    pub fn new(cmd: impl Into<String>, timeout: Duration, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            cmd: cmd.into(),
            timeout,
            scratch_dir: scratch_dir.into(),
        }
    }

    fn scratch_path(&self, round: u32) -> PathBuf {
        self.scratch_dir
            .join(crate::session::judge_scratch_file(round))
    }
}

#[async_trait]
impl ReviewJudge for CommandJudge {
    async fn judge(&self, input: &JudgeInput) -> Result<JudgeVerdict> {
        let input_json =
            serde_json::to_string(input).context("Failed to serialize judge input")?;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.cmd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn judge command: {}", self.cmd))?;

        // Some judge commands never read stdin; a closed pipe is not an error.
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(input_json.as_bytes()).await;
            let _ = stdin.shutdown().await;
        }

        let stdout = child.stdout.take().context("Failed to get judge stdout")?;
        let scratch_path = self.scratch_path(input.round);
        let read_output = async {
            let mut lines = BufReader::new(stdout).lines();
            let mut accumulated = String::new();
            let mut scratch = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&scratch_path)
                .with_context(|| format!("Failed to open {}", scratch_path.display()))?;
            while let Some(line) = lines.next_line().await? {
                writeln!(scratch, "{line}").context("Failed to write judge scratch file")?;
                accumulated.push_str(&line);
                accumulated.push('\n');
            }
            Ok::<String, anyhow::Error>(accumulated)
        };

        let output = match timeout(self.timeout, read_output).await {
            Ok(result) => result?,
            Err(_) => {
                let _ = child.kill().await;
                bail!("Judge timed out after {:?}", self.timeout);
            }
        };

        let status = timeout(Duration::from_secs(10), child.wait())
            .await
            .context("Judge did not exit after closing stdout")?
            .context("Failed to wait for judge command")?;
        if !status.success() {
            bail!(
                "Judge exited with code {}",
                status.code().unwrap_or(-1)
            );
        }

        let json = extract_json_object(&output)
            .context("Judge output contained no JSON object")?;
        serde_json::from_str(&json).context("Judge output was not a valid verdict")
    }
}

/// Extract a JSON object from text that may contain other content.
/// Uses brace-counting to find the outermost JSON object.
fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0;
    let mut end = start;

    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    end = start + i + 1;
                    break;
                }
            }
            _ => {}
        }
    }

    if depth == 0 && end > start {
        Some(text[start..end].to_string())
    } else {
        None
    }
}
