//! Reviewer bot registry.
//!
//! Maps the short reviewer names operators configure ("coderabbit") to the
//! platform identities those reviewers post under, the phrase that re-invokes
//! them, and whether they confirm receipt of a trigger with an eyes reaction.

use serde::{Deserialize, Serialize};

/// One configured reviewer identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotSpec {
    /// Canonical short name, as stored in the session record.
    pub name: String,
    /// Platform logins this reviewer posts under.
    pub logins: Vec<String>,
    /// Line to include in a trigger comment to re-invoke the reviewer.
    pub trigger_phrase: String,
    /// Whether the reviewer signals receipt of a trigger with an eyes
    /// reaction on the trigger comment, rather than scanning automatically.
    pub needs_ack: bool,
}

impl BotSpec {
    /// Look up a known reviewer by its short name.
    pub fn known(name: &str) -> Option<Self> {
        match name {
            "coderabbit" => Some(Self {
                name: "coderabbit".into(),
                logins: vec!["coderabbitai[bot]".into(), "coderabbitai".into()],
                trigger_phrase: "@coderabbitai review".into(),
                needs_ack: true,
            }),
            "copilot" => Some(Self {
                name: "copilot".into(),
                logins: vec![
                    "copilot-pull-request-reviewer[bot]".into(),
                    "Copilot".into(),
                ],
                trigger_phrase: "@copilot review".into(),
                needs_ack: false,
            }),
            "gemini" => Some(Self {
                name: "gemini".into(),
                logins: vec!["gemini-code-assist[bot]".into()],
                trigger_phrase: "/gemini review".into(),
                needs_ack: false,
            }),
            "cursor" => Some(Self {
                name: "cursor".into(),
                logins: vec!["cursor[bot]".into()],
                trigger_phrase: "@cursor review".into(),
                needs_ack: false,
            }),
            _ => None,
        }
    }

    /// Resolve a configured name to a spec, falling back to a custom
    /// reviewer that posts under `name` or `name[bot]` and needs no ack.
    pub fn resolve(name: &str) -> Self {
        Self::known(name).unwrap_or_else(|| Self {
            name: name.to_string(),
            logins: vec![format!("{name}[bot]"), name.to_string()],
            trigger_phrase: format!("@{name}"),
            needs_ack: false,
        })
    }

    /// Resolve a list of configured names.
    pub fn resolve_all(names: &[String]) -> Vec<Self> {
        names.iter().map(|n| Self::resolve(n)).collect()
    }

    /// Whether an event author login belongs to this reviewer.
    pub fn matches_login(&self, login: &str) -> bool {
        self.logins.iter().any(|l| l == login)
    }
}

/// Heuristic for classifying an arbitrary author login as a bot account.
pub fn is_bot_login(login: &str) -> bool {
    login.ends_with("[bot]")
        || ["coderabbit", "copilot", "gemini", "cursor"]
            .iter()
            .filter_map(|n| BotSpec::known(n))
            .any(|spec| spec.matches_login(login))
}
