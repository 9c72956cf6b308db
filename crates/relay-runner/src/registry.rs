//! Action registry mapping action kinds to runners.

use crate::actions::{
    CacheRestoreAction, CacheSaveAction, CheckoutAction, LintAction, PublishAction,
    ReleaseAction, TestAction, ToolchainAction,
};
use crate::runner::StepRunner;
use crate::shell::ShellRunner;
use relay_core::pipeline::ActionKind;
use relay_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<ActionKind, Arc<dyn StepRunner>>,
}

impl ActionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in action.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CheckoutAction::new()));
        registry.register(Arc::new(ToolchainAction::new()));
        registry.register(Arc::new(CacheRestoreAction::new()));
        registry.register(Arc::new(CacheSaveAction::new()));
        registry.register(Arc::new(LintAction::new()));
        registry.register(Arc::new(TestAction::new()));
        registry.register(Arc::new(ReleaseAction::new()));
        registry.register(Arc::new(PublishAction::new()));
        registry.register(Arc::new(ShellRunner::default()));
        registry
    }

    /// Register a runner, replacing any runner for the same kind.
    pub fn register(&mut self, runner: Arc<dyn StepRunner>) -> &mut Self {
        debug!(action = %runner.kind(), "Registering action");
        self.actions.insert(runner.kind(), runner);
        self
    }

    pub fn get(&self, kind: ActionKind) -> Result<Arc<dyn StepRunner>> {
        self.actions
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::ActionNotFound(kind.to_string()))
    }

    pub fn contains(&self, kind: ActionKind) -> bool {
        self.actions.contains_key(&kind)
    }
}
