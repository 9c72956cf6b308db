//! Trigger events.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified event kind that pipelines subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PushAnyBranch,
    PushToMain,
    PullRequest,
}

impl EventKind {
    /// Whether an event of this kind fires a trigger declared as `trigger`.
    ///
    /// A `push_any_branch` trigger fires for every push, including pushes
    /// to the main branch.
    pub fn satisfies(&self, trigger: EventKind) -> bool {
        match trigger {
            EventKind::PushAnyBranch => {
                matches!(self, EventKind::PushAnyBranch | EventKind::PushToMain)
            }
            other => *self == other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PushAnyBranch => "push_any_branch",
            EventKind::PushToMain => "push_to_main",
            EventKind::PullRequest => "pull_request",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RawEventKind {
    Push,
    PullRequest,
}

/// An unclassified event as received from the source host.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RawEvent {
    pub kind: RawEventKind,
    pub git_ref: String,
    pub repository: String,
    #[serde(default)]
    pub actor: String,
    #[serde(default)]
    pub sha: Option<String>,
}

impl RawEvent {
    pub fn push(git_ref: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            kind: RawEventKind::Push,
            git_ref: git_ref.into(),
            repository: repository.into(),
            actor: String::new(),
            sha: None,
        }
    }

    pub fn pull_request(git_ref: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            kind: RawEventKind::PullRequest,
            ..Self::push(git_ref, repository)
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.sha = Some(sha.into());
        self
    }
}

/// A classified event. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Event {
    pub kind: EventKind,
    pub git_ref: String,
    pub repository: String,
    pub actor: String,
    pub sha: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl Event {
    pub fn new(
        kind: EventKind,
        git_ref: impl Into<String>,
        repository: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            git_ref: git_ref.into(),
            repository: repository.into(),
            actor: actor.into(),
            sha: None,
            received_at: Utc::now(),
        }
    }

    /// Branch name for branch refs. Tag refs have none.
    pub fn branch(&self) -> Option<&str> {
        branch_of(&self.git_ref)
    }

    /// Key under which runs for the same ref supersede each other.
    pub fn ref_key(&self) -> (String, String) {
        (self.repository.clone(), self.git_ref.clone())
    }
}

/// `refs/heads/x` and bare `x` name branch `x`; `refs/tags/..` names none.
pub fn branch_of(git_ref: &str) -> Option<&str> {
    if let Some(branch) = git_ref.strip_prefix("refs/heads/") {
        Some(branch)
    } else if git_ref.starts_with("refs/") {
        None
    } else {
        Some(git_ref)
    }
}

pub fn is_tag_ref(git_ref: &str) -> bool {
    git_ref.starts_with("refs/tags/")
}
