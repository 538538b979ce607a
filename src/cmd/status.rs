//! `revloop status` — read-only phase report, safe to run while a check is
//! mid-poll.

use anyhow::Result;
use console::style;
use std::path::Path;

use revloop::config::Paths;
use revloop::session::{LoopKind, detect, latest_session};

pub fn cmd_status(project_dir: &Path) -> Result<()> {
    let paths = Paths::new(project_dir);
    let Some(dir) = latest_session(&paths.revloop_dir(), LoopKind::Review) else {
        println!("No review sessions.");
        return Ok(());
    };
    let phase = detect(&dir)?;
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    println!("Session {name}: {}", style(phase).bold());
    Ok(())
}
