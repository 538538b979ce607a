//! The progress ledger: a durable per-round record of issue counts, kept as
//! a markdown document with a summary table, a running-totals block, and a
//! narrative log. The writer is idempotent per `(round, reviewer)`: a repeated
//! update is a no-op against the totals, and if one half of the dual
//! representation (table row / log entry) is missing while the other exists,
//! the missing half is synthesized without re-applying the totals.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const LEDGER_FILE: &str = "PROGRESS.md";

const TOTALS_PREFIX: &str = "**Totals:**";

/// One round's verdict for one reviewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub reviewer: String,
    pub issues_found: u64,
    pub issues_resolved: u64,
    pub status: String,
}

/// Running totals across all recorded rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub found: u64,
    pub resolved: u64,
    pub remaining: u64,
}

/// One parsed summary-table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub round: u32,
    pub reviewer: String,
    pub issues_found: u64,
    pub issues_resolved: u64,
    pub status: String,
}

pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(session_dir: &Path) -> Self {
        Self {
            path: session_dir.join(LEDGER_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one round's verdict for one reviewer.
    ///
    /// First-writer-wins per `(round, reviewer)`: the totals move only when
    /// neither the table row nor the log entry existed before this call.
    pub fn record(&self, round: u32, entry: &LedgerEntry) -> Result<()> {
        let mut lines = self.read_lines()?;

        let had_row = find_row(&lines, round, &entry.reviewer).is_some();
        let had_log = find_log_entry(&lines, round, &entry.reviewer).is_some();

        if !had_row {
            insert_row(&mut lines, round, entry)?;
        }
        if !had_log {
            append_log_entry(&mut lines, round, entry);
        }
        if !had_row && !had_log {
            bump_totals(&mut lines, entry)?;
        }

        self.write_lines(&lines)
    }

    /// Parse the summary-table rows.
    pub fn rows(&self) -> Result<Vec<LedgerRow>> {
        let lines = self.read_lines()?;
        Ok(table_rows(&lines)
            .filter_map(|(_, cells)| parse_row(&cells))
            .collect())
    }

    /// Parse the running-totals block.
    pub fn totals(&self) -> Result<Totals> {
        let lines = self.read_lines()?;
        let idx = totals_index(&lines).context("Ledger has no totals line")?;
        parse_totals(&lines[idx]).context("Ledger totals line is malformed")
    }

    fn read_lines(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(skeleton());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read ledger at {}", self.path.display()))?;
        Ok(content.lines().map(|l| l.to_string()).collect())
    }

    fn write_lines(&self, lines: &[String]) -> Result<()> {
        let mut content = lines.join("\n");
        content.push('\n');
        let tmp = self.path.with_extension("md.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).context("Failed to commit ledger")?;
        Ok(())
    }
}

fn skeleton() -> Vec<String> {
    vec![
        "# Review Progress".to_string(),
        String::new(),
        "## Summary".to_string(),
        String::new(),
        "| Round | Reviewer | Found | Resolved | Status |".to_string(),
        "|-------|----------|-------|----------|--------|".to_string(),
        String::new(),
        format!("{TOTALS_PREFIX} found 0, resolved 0, remaining 0"),
        String::new(),
        "## Log".to_string(),
    ]
}

/// Iterate the data rows of the summary table as `(line_index, cells)`.
fn table_rows(lines: &[String]) -> impl Iterator<Item = (usize, Vec<String>)> + '_ {
    lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.trim_start().starts_with('|'))
        .map(|(i, l)| {
            let cells: Vec<String> = l
                .trim()
                .trim_matches('|')
                .split('|')
                .map(|c| c.trim().to_string())
                .collect();
            (i, cells)
        })
        // Skip the header and its underline.
        .filter(|(_, cells)| {
            cells
                .first()
                .is_some_and(|c| c.parse::<u32>().is_ok())
        })
}

fn parse_row(cells: &[String]) -> Option<LedgerRow> {
    if cells.len() < 5 {
        return None;
    }
    Some(LedgerRow {
        round: cells[0].parse().ok()?,
        reviewer: cells[1].clone(),
        issues_found: cells[2].parse().ok()?,
        issues_resolved: cells[3].parse().ok()?,
        status: cells[4].clone(),
    })
}

fn find_row(lines: &[String], round: u32, reviewer: &str) -> Option<usize> {
    table_rows(lines)
        .find(|(_, cells)| {
            cells.first().and_then(|c| c.parse::<u32>().ok()) == Some(round)
                && cells.get(1).is_some_and(|c| c == reviewer)
        })
        .map(|(i, _)| i)
}

/// Insert a row structurally inside the summary table, after the last
/// existing row (or the header underline when the table is empty), never
/// after the table's closing content.
fn insert_row(lines: &mut Vec<String>, round: u32, entry: &LedgerEntry) -> Result<()> {
    let last_table_line = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.trim_start().starts_with('|'))
        .map(|(i, _)| i)
        .next_back()
        .context("Ledger has no summary table")?;
    let row = format!(
        "| {} | {} | {} | {} | {} |",
        round, entry.reviewer, entry.issues_found, entry.issues_resolved, entry.status
    );
    lines.insert(last_table_line + 1, row);
    Ok(())
}

fn log_heading(round: u32, reviewer: &str) -> String {
    format!("### Round {round} ({reviewer})")
}

fn find_log_entry(lines: &[String], round: u32, reviewer: &str) -> Option<usize> {
    let heading = log_heading(round, reviewer);
    lines.iter().position(|l| l.trim() == heading)
}

fn append_log_entry(lines: &mut Vec<String>, round: u32, entry: &LedgerEntry) {
    // Trim trailing blank lines so entries stay uniformly separated.
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines.push(String::new());
    lines.push(log_heading(round, &entry.reviewer));
    lines.push(format!(
        "Found {} issue(s), resolved {}. Status: {}.",
        entry.issues_found, entry.issues_resolved, entry.status
    ));
}

fn totals_index(lines: &[String]) -> Option<usize> {
    lines.iter().position(|l| l.trim_start().starts_with(TOTALS_PREFIX))
}

fn parse_totals(line: &str) -> Option<Totals> {
    let mut found = None;
    let mut resolved = None;
    let mut remaining = None;
    let tokens: Vec<&str> = line.split_whitespace().collect();
    for pair in tokens.windows(2) {
        let value: Option<u64> = pair[1].trim_end_matches(',').parse().ok();
        match pair[0] {
            "found" => found = value,
            "resolved" => resolved = value,
            "remaining" => remaining = value,
            _ => {}
        }
    }
    Some(Totals {
        found: found?,
        resolved: resolved?,
        remaining: remaining?,
    })
}

fn bump_totals(lines: &mut [String], entry: &LedgerEntry) -> Result<()> {
    let idx = totals_index(lines).context("Ledger has no totals line")?;
    let mut totals = parse_totals(&lines[idx]).context("Ledger totals line is malformed")?;
    totals.found += entry.issues_found;
    totals.resolved += entry.issues_resolved;
    totals.remaining = totals.found.saturating_sub(totals.resolved);
    lines[idx] = format!(
        "{TOTALS_PREFIX} found {}, resolved {}, remaining {}",
        totals.found, totals.resolved, totals.remaining
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(reviewer: &str, found: u64, resolved: u64, status: &str) -> LedgerEntry {
        LedgerEntry {
            reviewer: reviewer.to_string(),
            issues_found: found,
            issues_resolved: resolved,
            status: status.to_string(),
        }
    }

    #[test]
    fn test_first_record_creates_document() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::new(dir.path());
        ledger.record(1, &entry("coderabbit", 3, 0, "has-issues")).unwrap();

        let rows = ledger.rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].round, 1);
        assert_eq!(rows[0].reviewer, "coderabbit");
        assert_eq!(rows[0].issues_found, 3);

        let totals = ledger.totals().unwrap();
        assert_eq!(totals, Totals { found: 3, resolved: 0, remaining: 3 });
    }

    #[test]
    fn test_repeated_record_is_idempotent() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::new(dir.path());
        let e = entry("coderabbit", 3, 1, "has-issues");
        ledger.record(1, &e).unwrap();
        ledger.record(1, &e).unwrap();
        ledger.record(1, &e).unwrap();

        let rows = ledger.rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(ledger.totals().unwrap(), Totals { found: 3, resolved: 1, remaining: 2 });

        let content = fs::read_to_string(ledger.path()).unwrap();
        let headings = content.matches("### Round 1 (coderabbit)").count();
        assert_eq!(headings, 1);
    }

    #[test]
    fn test_rounds_accumulate_totals() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::new(dir.path());
        ledger.record(1, &entry("coderabbit", 4, 0, "has-issues")).unwrap();
        ledger.record(2, &entry("coderabbit", 1, 4, "has-issues")).unwrap();
        ledger.record(3, &entry("coderabbit", 0, 1, "approved")).unwrap();

        assert_eq!(ledger.totals().unwrap(), Totals { found: 5, resolved: 5, remaining: 0 });
        assert_eq!(ledger.rows().unwrap().len(), 3);
    }

    #[test]
    fn test_same_round_different_reviewers_both_recorded() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::new(dir.path());
        ledger.record(1, &entry("coderabbit", 2, 0, "has-issues")).unwrap();
        ledger.record(1, &entry("gemini", 1, 0, "has-issues")).unwrap();

        assert_eq!(ledger.rows().unwrap().len(), 2);
        assert_eq!(ledger.totals().unwrap().found, 3);
    }

    #[test]
    fn test_rows_inserted_inside_table() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::new(dir.path());
        ledger.record(1, &entry("coderabbit", 2, 0, "has-issues")).unwrap();
        ledger.record(2, &entry("coderabbit", 0, 2, "approved")).unwrap();

        let content = fs::read_to_string(ledger.path()).unwrap();
        // Every table line must appear before the totals block.
        let totals_pos = content.find("**Totals:**").unwrap();
        for (pos, _) in content.match_indices("| 2 | coderabbit") {
            assert!(pos < totals_pos);
        }
    }

    #[test]
    fn test_missing_log_half_is_synthesized_without_touching_totals() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::new(dir.path());
        let e = entry("coderabbit", 3, 0, "has-issues");
        ledger.record(1, &e).unwrap();

        // Strip the log entry, keeping the table row and totals.
        let content = fs::read_to_string(ledger.path()).unwrap();
        let truncated: String = content
            .lines()
            .take_while(|l| !l.starts_with("### Round 1"))
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(ledger.path(), truncated).unwrap();

        ledger.record(1, &e).unwrap();
        let content = fs::read_to_string(ledger.path()).unwrap();
        assert!(content.contains("### Round 1 (coderabbit)"));
        assert_eq!(ledger.totals().unwrap(), Totals { found: 3, resolved: 0, remaining: 3 });
    }

    #[test]
    fn test_missing_row_half_is_synthesized_without_touching_totals() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::new(dir.path());
        let e = entry("coderabbit", 3, 0, "has-issues");
        ledger.record(1, &e).unwrap();

        // Strip the table row, keeping the log entry and totals.
        let content = fs::read_to_string(ledger.path()).unwrap();
        let without_row: String = content
            .lines()
            .filter(|l| !l.starts_with("| 1 | coderabbit"))
            .collect::<Vec<_>>()
            .join("\n");
        fs::write(ledger.path(), without_row).unwrap();

        ledger.record(1, &e).unwrap();
        assert_eq!(ledger.rows().unwrap().len(), 1);
        assert_eq!(ledger.totals().unwrap(), Totals { found: 3, resolved: 0, remaining: 3 });
    }

    #[test]
    fn test_parse_totals_line() {
        let totals = parse_totals("**Totals:** found 7, resolved 4, remaining 3").unwrap();
        assert_eq!(totals, Totals { found: 7, resolved: 4, remaining: 3 });
        assert!(parse_totals("**Totals:** found x").is_none());
    }
}
