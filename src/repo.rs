//! Repository invariant checks backing the reconciliation loop: unpushed
//! commits, history ancestry since the last trigger, and the branch tip.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use git2::Repository;
use std::path::Path;

/// What the loop needs to know about the working branch. A trait so the
/// reconciliation logic can be exercised against a scripted fake.
pub trait BranchView {
    /// Name of the currently checked-out branch.
    fn branch_name(&self) -> Result<String>;

    /// Count of local commits not present on the upstream branch.
    /// `Ok(None)` means the branch has no upstream configured.
    fn ahead_of_upstream(&self) -> Result<Option<usize>>;

    /// Whether `sha` is an ancestor of (or equal to) the current branch tip.
    fn is_ancestor_of_head(&self, sha: &str) -> Result<bool>;

    /// Current branch tip: sha and commit time.
    fn head_sha_time(&self) -> Result<(String, DateTime<Utc>)>;
}

pub struct GitRepo {
    repo: Repository,
}

impl GitRepo {
    pub fn open(project_dir: &Path) -> Result<Self> {
        let repo = Repository::open(project_dir).context("Failed to open git repository")?;
        Ok(Self { repo })
    }

    /// URL of the `origin` remote, for resolving the platform repository.
    pub fn origin_url(&self) -> Result<String> {
        let remote = self
            .repo
            .find_remote("origin")
            .context("Repository has no 'origin' remote")?;
        remote
            .url()
            .map(|u| u.to_string())
            .context("Remote 'origin' has no URL")
    }

    fn head_commit(&self) -> Result<git2::Commit<'_>> {
        self.repo
            .head()
            .context("Failed to resolve HEAD")?
            .peel_to_commit()
            .context("HEAD does not point at a commit")
    }
}

impl BranchView for GitRepo {
    fn branch_name(&self) -> Result<String> {
        let head = self.repo.head().context("Failed to resolve HEAD")?;
        head.shorthand()
            .map(|s| s.to_string())
            .context("HEAD is not on a named branch")
    }

    fn ahead_of_upstream(&self) -> Result<Option<usize>> {
        let name = self.branch_name()?;
        let branch = self
            .repo
            .find_branch(&name, git2::BranchType::Local)
            .with_context(|| format!("Failed to look up branch '{name}'"))?;
        let upstream = match branch.upstream() {
            Ok(up) => up,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to resolve upstream branch"),
        };
        let local_oid = branch
            .get()
            .target()
            .context("Branch has no target commit")?;
        let upstream_oid = upstream
            .get()
            .target()
            .context("Upstream branch has no target commit")?;
        let (ahead, _behind) = self
            .repo
            .graph_ahead_behind(local_oid, upstream_oid)
            .context("Failed to compute ahead/behind counts")?;
        Ok(Some(ahead))
    }

    fn is_ancestor_of_head(&self, sha: &str) -> Result<bool> {
        let old_oid = git2::Oid::from_str(sha).context("Invalid commit sha")?;
        let head_oid = self.head_commit()?.id();
        if head_oid == old_oid {
            return Ok(true);
        }
        // An unknown oid means the commit was discarded by a rewrite.
        if self.repo.find_commit(old_oid).is_err() {
            return Ok(false);
        }
        self.repo
            .graph_descendant_of(head_oid, old_oid)
            .context("Failed to walk commit graph")
    }

    fn head_sha_time(&self) -> Result<(String, DateTime<Utc>)> {
        let commit = self.head_commit()?;
        let time = DateTime::<Utc>::from_timestamp(commit.time().seconds(), 0)
            .context("Commit timestamp out of range")?;
        Ok((commit.id().to_string(), time))
    }
}
