//! Trigger resolution.
//!
//! Classifies a raw event, selects the pipelines it triggers and decides the
//! credential scope it is granted. Resolution is a pure function of the raw
//! event, the static [`TriggerPolicy`] and the pipeline definitions.

use relay_core::ids::{CredentialName, PipelineId};
use relay_core::pipeline::{PipelineDefinition, TriggerConfig};
use relay_core::secrets::{AccessLevel, GrantedScope};
use relay_core::trigger::{Event, EventKind, RawEvent, RawEventKind, branch_of, is_tag_ref};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

fn default_main_branch() -> String {
    "main".to_string()
}

/// Static mapping from events to privilege.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerPolicy {
    /// Release branch; pushes to it on the canonical repository may publish.
    #[serde(default = "default_main_branch")]
    pub main_branch: String,
    /// `owner/name` of the repository allowed to publish.
    pub canonical_repository: String,
    /// Credentials granted to every event.
    #[serde(default)]
    pub read_credentials: BTreeSet<CredentialName>,
    /// Credentials additionally granted to pushes to the main branch.
    #[serde(default)]
    pub publish_credentials: BTreeSet<CredentialName>,
}

/// Outcome of resolving one raw event.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub event: Event,
    /// Selected pipelines in definition order.
    pub pipelines: Vec<PipelineId>,
    pub scope: GrantedScope,
}

impl TriggerPolicy {
    pub fn new(canonical_repository: impl Into<String>) -> Self {
        Self {
            main_branch: default_main_branch(),
            canonical_repository: canonical_repository.into(),
            read_credentials: BTreeSet::new(),
            publish_credentials: BTreeSet::new(),
        }
    }

    pub fn with_read_credential(mut self, name: impl Into<CredentialName>) -> Self {
        self.read_credentials.insert(name.into());
        self
    }

    pub fn with_publish_credential(mut self, name: impl Into<CredentialName>) -> Self {
        self.publish_credentials.insert(name.into());
        self
    }

    /// Classify a raw event.
    pub fn classify(&self, raw: &RawEvent) -> EventKind {
        match raw.kind {
            RawEventKind::PullRequest => EventKind::PullRequest,
            RawEventKind::Push => {
                let canonical = raw
                    .repository
                    .eq_ignore_ascii_case(&self.canonical_repository);
                if canonical && branch_of(&raw.git_ref) == Some(self.main_branch.as_str()) {
                    EventKind::PushToMain
                } else {
                    EventKind::PushAnyBranch
                }
            }
        }
    }

    /// Credential scope for an event kind.
    pub fn scope_for(&self, kind: EventKind) -> GrantedScope {
        match kind {
            EventKind::PushToMain => GrantedScope::new(
                AccessLevel::Publish,
                self.read_credentials
                    .iter()
                    .chain(self.publish_credentials.iter())
                    .cloned(),
            ),
            EventKind::PushAnyBranch | EventKind::PullRequest => {
                GrantedScope::new(AccessLevel::Read, self.read_credentials.iter().cloned())
            }
        }
    }

    /// Resolve a raw event against the pipeline definitions.
    pub fn resolve<'a>(
        &self,
        raw: &RawEvent,
        pipelines: impl IntoIterator<Item = &'a PipelineDefinition>,
    ) -> Resolution {
        let kind = self.classify(raw);
        let mut event = Event::new(kind, &raw.git_ref, &raw.repository, &raw.actor);
        event.sha = raw.sha.clone();

        let selected = if is_tag_ref(&raw.git_ref) {
            Vec::new()
        } else {
            pipelines
                .into_iter()
                .filter(|p| pipeline_matches(p, &event))
                .map(|p| p.name.clone())
                .collect()
        };

        debug!(
            kind = %kind,
            git_ref = %raw.git_ref,
            repository = %raw.repository,
            pipelines = selected.len(),
            "Event resolved"
        );

        Resolution {
            scope: self.scope_for(kind),
            event,
            pipelines: selected,
        }
    }
}

fn pipeline_matches(pipeline: &PipelineDefinition, event: &Event) -> bool {
    if pipeline.on.is_empty() {
        // Default: trigger on push to any branch
        return trigger_matches(&TriggerConfig::new(EventKind::PushAnyBranch), event);
    }
    pipeline.on.iter().any(|t| trigger_matches(t, event))
}

fn trigger_matches(trigger: &TriggerConfig, event: &Event) -> bool {
    if !event.kind.satisfies(trigger.kind) {
        return false;
    }
    if trigger.branches.is_empty() {
        return true;
    }
    match event.branch() {
        Some(branch) => trigger.branches.iter().any(|p| glob_match(p, branch)),
        None => false,
    }
}

/// Branch glob: `*`/`**` match all, `prefix/*` one level, `prefix/**` any
/// depth, a single inner `*` matches any run of characters.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix("/**") {
        return text
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'));
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return text
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'));
    }
    if let Some((head, tail)) = pattern.split_once('*')
        && !tail.contains('*')
    {
        return text.len() >= head.len() + tail.len()
            && text.starts_with(head)
            && text.ends_with(tail);
    }
    pattern == text
}
