use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tunable settings for the review loop, loaded from `.revloop/config.toml`
/// with per-field defaults. CLI flags override on top of this.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevloopConfig {
    /// Seconds between poll attempts against the hosting platform.
    pub poll_interval_secs: u64,
    /// Per-reviewer budget: how long to wait for a reviewer to produce any
    /// new event before it is auto-dropped for the session.
    pub bot_timeout_secs: u64,
    /// Ceiling on work-then-reconcile rounds before the session is forced
    /// to a terminal state.
    pub max_rounds: u32,
    /// Trigger acknowledgment: attempts and delay between them.
    pub ack_attempts: u32,
    pub ack_delay_secs: u64,
    /// Bounded retry budget for transient platform API failures.
    pub api_retries: u32,
    /// Command invoked to judge reviewer feedback. Receives the round
    /// context as JSON on stdin and must print a JSON verdict.
    pub judge_cmd: String,
    pub judge_timeout_secs: u64,
    /// Reviewers to attach to new sessions when none are given on the CLI.
    pub bots: Vec<String>,
}

impl Default for RevloopConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            bot_timeout_secs: 600,
            max_rounds: 10,
            ack_attempts: 5,
            ack_delay_secs: 5,
            api_retries: 3,
            judge_cmd: "claude --print".to_string(),
            judge_timeout_secs: 300,
            bots: vec!["coderabbit".to_string()],
        }
    }
}

impl RevloopConfig {
    /// Load from `.revloop/config.toml` under the project directory,
    /// falling back to defaults when the file does not exist.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(".revloop").join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn bot_timeout(&self) -> Duration {
        Duration::from_secs(self.bot_timeout_secs)
    }

    pub fn ack_delay(&self) -> Duration {
        Duration::from_secs(self.ack_delay_secs)
    }

    pub fn judge_timeout(&self) -> Duration {
        Duration::from_secs(self.judge_timeout_secs)
    }
}

/// Fixed file layout under a project directory.
#[derive(Debug, Clone)]
pub struct Paths {
    pub project_dir: PathBuf,
}

impl Paths {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }

    pub fn revloop_dir(&self) -> PathBuf {
        self.project_dir.join(".revloop")
    }
}

/// GitHub token from the environment; `.env` is honored the same way the
/// rest of the toolchain honors it.
pub fn github_token() -> Result<String> {
    dotenvy::dotenv().ok();
    std::env::var("GITHUB_TOKEN")
        .or_else(|_| std::env::var("GH_TOKEN"))
        .context("GITHUB_TOKEN is not set; export it or add it to .env")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_config_file() {
        let dir = tempdir().unwrap();
        let config = RevloopConfig::load(dir.path()).unwrap();
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.max_rounds, 10);
        assert_eq!(config.bots, vec!["coderabbit".to_string()]);
    }

    #[test]
    fn test_partial_config_merges_with_defaults() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".revloop")).unwrap();
        fs::write(
            dir.path().join(".revloop/config.toml"),
            "max_rounds = 3\nbots = [\"gemini\", \"copilot\"]\n",
        )
        .unwrap();
        let config = RevloopConfig::load(dir.path()).unwrap();
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.bots.len(), 2);
        // Unspecified fields keep their defaults.
        assert_eq!(config.bot_timeout_secs, 600);
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".revloop")).unwrap();
        fs::write(dir.path().join(".revloop/config.toml"), "max_rounds = \"x\"").unwrap();
        assert!(RevloopConfig::load(dir.path()).is_err());
    }

    #[test]
    fn test_duration_helpers() {
        let config = RevloopConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.bot_timeout(), Duration::from_secs(600));
    }
}
