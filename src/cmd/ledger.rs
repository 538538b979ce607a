//! `revloop ledger` — print the latest session's progress document.

use anyhow::{Context, Result};
use std::path::Path;

use revloop::config::Paths;
use revloop::ledger::{LEDGER_FILE, Ledger};
use revloop::session::{LoopKind, latest_session};

pub fn cmd_ledger(project_dir: &Path) -> Result<()> {
    let paths = Paths::new(project_dir);
    let dir = latest_session(&paths.revloop_dir(), LoopKind::Review)
        .context("No review sessions")?;
    let ledger = Ledger::new(&dir);
    if !ledger.path().exists() {
        println!("No {LEDGER_FILE} yet for session {}", dir.display());
        return Ok(());
    }
    let content = std::fs::read_to_string(ledger.path())
        .with_context(|| format!("Failed to read {}", ledger.path().display()))?;
    print!("{content}");
    Ok(())
}
