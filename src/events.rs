//! Review events: the comments, inline comments, and formal reviews observed
//! on a pull request. Events are fetched fresh each poll, never mutated, only
//! aggregated and deduplicated by platform identifier.

use crate::bots::{BotSpec, is_bot_login};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// What kind of platform object the event came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A general conversation comment on the pull request.
    Comment,
    /// A comment attached to a diff line.
    InlineComment,
    /// A formal review with an approval state (APPROVED, CHANGES_REQUESTED, ...).
    Review { state: String },
}

impl EventKind {
    /// Tag used to namespace platform ids, which are only unique per endpoint.
    fn id_space(&self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::InlineComment => "inline",
            Self::Review { .. } => "review",
        }
    }
}

/// Who authored the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Human,
    Bot,
}

/// One observed comment/review from the hosting platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub id: u64,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub body: String,
    pub kind: EventKind,
    pub source: EventSource,
}

impl ReviewEvent {
    pub fn new(
        id: u64,
        author: impl Into<String>,
        created_at: DateTime<Utc>,
        body: impl Into<String>,
        kind: EventKind,
    ) -> Self {
        let author = author.into();
        let source = if is_bot_login(&author) {
            EventSource::Bot
        } else {
            EventSource::Human
        };
        Self {
            id,
            author,
            created_at,
            body: body.into(),
            kind,
            source,
        }
    }

    /// Dedup key: platform ids are only unique within their endpoint.
    fn dedup_key(&self) -> (&'static str, u64) {
        (self.kind.id_space(), self.id)
    }

    pub fn authored_by(&self, spec: &BotSpec) -> bool {
        spec.matches_login(&self.author)
    }
}

/// Drop duplicate events, keeping the first occurrence of each id.
pub fn dedup(events: Vec<ReviewEvent>) -> Vec<ReviewEvent> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|e| seen.insert(e.dedup_key()))
        .collect()
}

/// Keep only events created strictly after `cursor`.
pub fn after(events: Vec<ReviewEvent>, cursor: Option<DateTime<Utc>>) -> Vec<ReviewEvent> {
    match cursor {
        Some(cursor) => events
            .into_iter()
            .filter(|e| e.created_at > cursor)
            .collect(),
        None => events,
    }
}

/// Presentation/judging order: human events always sort before bot events
/// regardless of recency; humans oldest-first, bots newest-first.
pub fn sort_for_review(events: &mut [ReviewEvent]) {
    events.sort_by(|a, b| match (a.source, b.source) {
        (EventSource::Human, EventSource::Bot) => std::cmp::Ordering::Less,
        (EventSource::Bot, EventSource::Human) => std::cmp::Ordering::Greater,
        (EventSource::Human, EventSource::Human) => a.created_at.cmp(&b.created_at),
        (EventSource::Bot, EventSource::Bot) => b.created_at.cmp(&a.created_at),
    });
}

/// Newest event timestamp authored by `spec`, if any.
pub fn latest_by(events: &[ReviewEvent], spec: &BotSpec) -> Option<DateTime<Utc>> {
    events
        .iter()
        .filter(|e| e.authored_by(spec))
        .map(|e| e.created_at)
        .max()
}
