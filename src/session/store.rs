//! Durable, crash-safe session storage.
//!
//! One directory per session, named by creation timestamp. The primary file
//! is `session.json`; terminal states are file-name variants of it, and the
//! transition into a terminal form is a single atomic rename, so a concurrent
//! reader (the phase detector in a monitor) never observes a partial state.

use crate::errors::{SetupError, StoreError};
use crate::session::record::SessionRecord;
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs;
use std::path::{Path, PathBuf};

pub const STATE_FILE: &str = "session.json";
pub const CANCEL_SENTINEL: &str = "cancel.request";

/// The host runs one loop kind at a time per project: a review session is
/// mutually exclusive with the plain iterate loop and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Review,
    Iterate,
}

impl LoopKind {
    pub const ALL: [LoopKind; 2] = [LoopKind::Review, LoopKind::Iterate];

    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Iterate => "iterate",
        }
    }
}

/// The three terminal forms a session can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Approved,
    Cancelled,
    MaxRounds,
}

impl Terminal {
    pub const ALL: [Terminal; 3] = [Terminal::Approved, Terminal::Cancelled, Terminal::MaxRounds];

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Approved => "session.approved.json",
            Self::Cancelled => "session.cancelled.json",
            Self::MaxRounds => "session.max-rounds.json",
        }
    }
}

/// What `SessionStore::load` found on disk.
#[derive(Debug, Clone)]
pub enum SessionState {
    Active(SessionRecord),
    Finished(Terminal, SessionRecord),
}

/// Handle to one session directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Create a new session under `<project>/.revloop/<kind>/`.
    ///
    /// Rejected if any session of any loop kind is still non-terminal. The
    /// registry scan and the directory creation run under an advisory file
    /// lock so two concurrent creations cannot both pass the check.
    pub fn create(
        revloop_dir: &Path,
        kind: LoopKind,
        record: &SessionRecord,
    ) -> Result<Self, SetupError> {
        fs::create_dir_all(revloop_dir)
            .with_context(|| format!("Failed to create {}", revloop_dir.display()))?;
        let lock_path = revloop_dir.join("registry.lock");
        let lock = fs::File::create(&lock_path)
            .with_context(|| format!("Failed to open {}", lock_path.display()))?;
        lock.lock_exclusive()
            .context("Failed to take the session registry lock")?;
        // Lock released when `lock` drops at the end of this scope.

        if let Some(active) = find_active(revloop_dir)? {
            return Err(SetupError::SessionAlreadyActive { path: active });
        }

        let dir = revloop_dir.join(kind.dir_name()).join(record.dir_name());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create session directory {}", dir.display()))?;
        let store = Self { dir };
        store.save(record)?;
        Ok(store)
    }

    /// Open an existing session directory without interpreting its state.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// Load and validate the session state.
    ///
    /// Exactly one of {active record, one terminal record} may exist; any
    /// other combination is an integrity violation reported loudly.
    pub fn load(&self) -> Result<SessionState, StoreError> {
        let active_path = self.state_path();
        let terminals: Vec<Terminal> = Terminal::ALL
            .into_iter()
            .filter(|t| self.dir.join(t.file_name()).exists())
            .collect();

        match (active_path.exists(), terminals.len()) {
            (true, 0) => Ok(SessionState::Active(self.read_record(&active_path)?)),
            (false, 1) => {
                let terminal = terminals[0];
                let path = self.dir.join(terminal.file_name());
                Ok(SessionState::Finished(terminal, self.read_record(&path)?))
            }
            (true, _) => Err(StoreError::ConflictingRecords {
                dir: self.dir.clone(),
            }),
            (false, 0) => Err(StoreError::MissingRecord {
                dir: self.dir.clone(),
            }),
            (false, _) => Err(StoreError::MultipleTerminals {
                dir: self.dir.clone(),
            }),
        }
    }

    fn read_record(&self, path: &Path) -> Result<SessionRecord, StoreError> {
        let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let record: SessionRecord =
            serde_json::from_str(&content).map_err(|source| StoreError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        record.validate(path)?;
        Ok(record)
    }

    /// Persist the active record. Written to a temp file and renamed so a
    /// concurrent reader never sees a torn write.
    pub fn save(&self, record: &SessionRecord) -> Result<()> {
        let json =
            serde_json::to_string_pretty(record).context("Failed to serialize session record")?;
        let tmp = self.dir.join(".session.json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, self.state_path()).context("Failed to commit session record")?;
        Ok(())
    }

    /// Transition the session to a terminal form. The rename is atomic, so
    /// the active record and the terminal marker can never both exist.
    pub fn finish(&self, terminal: Terminal) -> Result<(), StoreError> {
        let from = self.state_path();
        let to = self.dir.join(terminal.file_name());
        if !from.exists() {
            return Err(StoreError::MissingRecord {
                dir: self.dir.clone(),
            });
        }
        fs::rename(&from, &to).map_err(|source| StoreError::Io {
            path: from.clone(),
            source,
        })
    }

    /// Ask a running loop to abort its current wait.
    pub fn request_cancel(&self) -> Result<()> {
        fs::write(self.dir.join(CANCEL_SENTINEL), b"cancel\n")
            .context("Failed to write cancel sentinel")?;
        Ok(())
    }

    pub fn cancel_requested(&self) -> bool {
        self.dir.join(CANCEL_SENTINEL).exists()
    }

    /// Remove a partially-created session after a failed setup so no
    /// orphaned state persists.
    pub fn discard(self) -> Result<()> {
        fs::remove_dir_all(&self.dir)
            .with_context(|| format!("Failed to discard session at {}", self.dir.display()))
    }
}

/// Scan both loop-kind roots for a non-terminal session. Returns the first
/// active session directory found.
pub fn find_active(revloop_dir: &Path) -> Result<Option<PathBuf>> {
    for kind in LoopKind::ALL {
        let root = revloop_dir.join(kind.dir_name());
        if !root.exists() {
            continue;
        }
        let mut entries: Vec<PathBuf> = fs::read_dir(&root)
            .with_context(|| format!("Failed to read {}", root.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        entries.sort();
        for dir in entries {
            if dir.join(STATE_FILE).exists() {
                return Ok(Some(dir));
            }
        }
    }
    Ok(None)
}

/// Most recent session directory of the given kind, terminal or not.
pub fn latest_session(revloop_dir: &Path, kind: LoopKind) -> Option<PathBuf> {
    let root = revloop_dir.join(kind.dir_name());
    let mut entries: Vec<PathBuf> = fs::read_dir(root)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    entries.sort();
    entries.pop()
}
