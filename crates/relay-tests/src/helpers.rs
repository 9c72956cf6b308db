//! Test harness wiring a dispatcher to fake actions.

use crate::fakes::FakeAction;
use crate::fixtures::PipelineFixture;
use relay_cache::MemoryCacheStore;
use relay_core::pipeline::{ActionKind, PipelineDefinition};
use relay_core::trigger::RawEvent;
use relay_runner::ActionRegistry;
use relay_scheduler::{
    DispatchOutcome, Dispatcher, ExecutorConfig, MemoryEventSink, PipelineCatalog,
    PipelineExecutor, TriggerPolicy,
};
use relay_secrets::{CredentialBroker, FileProvider};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::debug;

const ALL_KINDS: [ActionKind; 9] = [
    ActionKind::Checkout,
    ActionKind::Toolchain,
    ActionKind::CacheRestore,
    ActionKind::CacheSave,
    ActionKind::Lint,
    ActionKind::Test,
    ActionKind::Release,
    ActionKind::Publish,
    ActionKind::Run,
];

pub struct HarnessBuilder {
    definitions: Vec<PipelineDefinition>,
    policy: TriggerPolicy,
    secrets: HashMap<String, String>,
    actions: HashMap<ActionKind, Arc<FakeAction>>,
    max_parallel_jobs: Option<usize>,
}

impl HarnessBuilder {
    pub fn policy(mut self, policy: TriggerPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn secret(mut self, name: &str, value: &str) -> Self {
        self.secrets.insert(name.to_string(), value.to_string());
        self
    }

    /// Use `action` for its kind instead of the default succeeding fake.
    pub fn action(mut self, action: FakeAction) -> Self {
        self.actions.insert(action.kind(), Arc::new(action));
        self
    }

    pub fn max_parallel_jobs(mut self, limit: usize) -> Self {
        self.max_parallel_jobs = Some(limit);
        self
    }

    pub fn build(mut self) -> anyhow::Result<Harness> {
        let catalog = PipelineCatalog::from_definitions(self.definitions)?;
        let workspace = tempfile::tempdir()?;

        let mut registry = ActionRegistry::new();
        for kind in ALL_KINDS {
            let action = self
                .actions
                .entry(kind)
                .or_insert_with(|| Arc::new(FakeAction::new(kind)))
                .clone();
            registry.register(action);
        }

        let mut config = ExecutorConfig::new(workspace.path());
        config.max_parallel_jobs = self.max_parallel_jobs;

        let sink = Arc::new(MemoryEventSink::new());
        let cache = Arc::new(MemoryCacheStore::new());
        let broker = CredentialBroker::new(Arc::new(FileProvider::from_map(self.secrets)));
        let executor = PipelineExecutor::new(registry, broker, config)
            .with_cache(cache.clone())
            .with_sink(sink.clone());
        debug!(pipelines = catalog.len(), workspace = %workspace.path().display(), "Harness built");

        Ok(Harness {
            dispatcher: Arc::new(Dispatcher::new(Arc::new(catalog), self.policy, executor)),
            sink,
            cache,
            actions: self.actions,
            _workspace: workspace,
        })
    }
}

/// A dispatcher over fake actions, an in-memory cache and an in-memory sink.
pub struct Harness {
    pub dispatcher: Arc<Dispatcher>,
    pub sink: Arc<MemoryEventSink>,
    pub cache: Arc<MemoryCacheStore>,
    actions: HashMap<ActionKind, Arc<FakeAction>>,
    _workspace: TempDir,
}

impl Harness {
    /// Builder over `definitions` with the fixture policy and a
    /// `registry_token` secret.
    pub fn builder(definitions: Vec<PipelineDefinition>) -> HarnessBuilder {
        HarnessBuilder {
            definitions,
            policy: PipelineFixture::policy(),
            secrets: HashMap::from([
                ("registry_token".to_string(), "reg-secret-0042".to_string()),
                ("github_token".to_string(), "gh-secret-0042".to_string()),
            ]),
            actions: HashMap::new(),
            max_parallel_jobs: None,
        }
    }

    pub async fn dispatch(&self, event: RawEvent) -> DispatchOutcome {
        self.dispatcher.dispatch(event).await
    }

    /// The fake registered for `kind`.
    pub fn action(&self, kind: ActionKind) -> Arc<FakeAction> {
        match self.actions.get(&kind) {
            Some(action) => action.clone(),
            None => panic!("no fake registered for {kind}"),
        }
    }
}

/// Wait for a condition to become true, polling at `interval`.
pub async fn wait_for<F, Fut>(
    timeout: std::time::Duration,
    interval: std::time::Duration,
    mut condition: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}
