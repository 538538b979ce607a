//! `revloop cancel` — abort the active session. Writes the sentinel first so
//! a check that is mid-poll bails out of its wait, then renames the record to
//! its cancelled terminal form.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use revloop::config::Paths;
use revloop::session::{SessionStore, Terminal, find_active};

pub fn cmd_cancel(project_dir: &Path) -> Result<()> {
    let paths = Paths::new(project_dir);
    let session_dir =
        find_active(&paths.revloop_dir())?.context("No active session to cancel")?;
    let store = SessionStore::at(&session_dir);
    store.request_cancel()?;
    store.finish(Terminal::Cancelled)?;
    println!(
        "{} session at {}",
        style("Cancelled").yellow(),
        session_dir.display()
    );
    Ok(())
}
