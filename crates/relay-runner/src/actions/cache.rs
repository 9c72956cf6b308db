//! Cache restore and save actions.
//!
//! Both actions take the same parameters so that a restore/save pair derives
//! the same key: either an explicit `key` (plus `restore_keys`), or `prefix`,
//! `partition` and `lock_files` from which the key is derived. `paths` lists
//! the workspace-relative paths to archive.

use crate::runner::{OutputLine, StepContext, StepResult, StepRunner};
use async_trait::async_trait;
use relay_cache::keys::key_for_files;
use relay_cache::{CacheKey, CacheStore, CompressionType, create_archive, extract_archive};
use relay_core::pipeline::ActionKind;
use relay_core::run::{OutputValue, Outputs};
use relay_core::{Error, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::info;

/// Resolve the cache key for a cache step.
pub fn cache_key(ctx: &StepContext) -> CacheKey {
    if let Some(key) = ctx.step.param_str("key") {
        return CacheKey {
            key: key.to_string(),
            restore_keys: ctx.step.param_list("restore_keys"),
        };
    }

    let prefix = ctx.step.param_str("prefix").unwrap_or("v0-rust");
    let partition = ctx
        .step
        .param_str("partition")
        .unwrap_or(ctx.job_id.as_str());
    let mut lock_files = ctx.step.param_list("lock_files");
    if lock_files.is_empty() {
        lock_files.push("Cargo.lock".to_string());
    }
    key_for_files(prefix, partition, &ctx.toolchain, &lock_files, &ctx.workspace)
}

fn store(ctx: &StepContext) -> Result<Arc<dyn CacheStore>> {
    ctx.cache
        .clone()
        .ok_or_else(|| Error::Cache("no cache store configured".to_string()))
}

/// Restores the best matching entry into the workspace.
///
/// Outputs `cache_hit` (exact key matched), `cache_key` and, on any hit,
/// `cache_matched_key`. A miss is a successful step.
#[derive(Default)]
pub struct CacheRestoreAction;

impl CacheRestoreAction {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepRunner for CacheRestoreAction {
    async fn execute(
        &self,
        ctx: &StepContext,
        _output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepResult> {
        let start = Instant::now();
        let store = store(ctx)?;
        let key = cache_key(ctx);

        let mut outputs = Outputs::new();
        outputs.insert("cache_key".to_string(), OutputValue::Text(key.key.clone()));

        match store.restore(&key.key, &key.restore_keys).await? {
            Some(restored) => {
                let workspace = ctx.workspace.clone();
                let payload = restored.entry.payload;
                let count = tokio::task::spawn_blocking(move || {
                    extract_archive(&payload, &workspace, CompressionType::Zstd)
                })
                .await
                .map_err(|e| Error::Internal(format!("Cache extract task failed: {}", e)))??;

                info!(
                    job = %ctx.job_id,
                    key = %key.key,
                    matched = %restored.entry.metadata.key,
                    entries = count,
                    "Cache restored"
                );
                outputs.insert("cache_hit".to_string(), OutputValue::Bool(restored.exact_match));
                outputs.insert(
                    "cache_matched_key".to_string(),
                    OutputValue::Text(restored.entry.metadata.key),
                );
            }
            None => {
                outputs.insert("cache_hit".to_string(), OutputValue::Bool(false));
            }
        }

        let mut result = StepResult::success(outputs);
        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    fn kind(&self) -> ActionKind {
        ActionKind::CacheRestore
    }
}

/// Archives `paths` and saves them under the resolved key.
///
/// Outputs `cache_key` and `cache_saved` (false when the stored payload was
/// already identical).
#[derive(Default)]
pub struct CacheSaveAction;

impl CacheSaveAction {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepRunner for CacheSaveAction {
    async fn execute(
        &self,
        ctx: &StepContext,
        _output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepResult> {
        let start = Instant::now();
        let store = store(ctx)?;
        let key = cache_key(ctx);

        let paths = ctx.step.param_list("paths");
        if paths.is_empty() {
            return Err(Error::InvalidInput(format!(
                "step '{}' has no 'paths' to cache",
                ctx.step.id
            )));
        }

        let workspace = ctx.workspace.clone();
        let payload = tokio::task::spawn_blocking(move || {
            create_archive(&paths, &workspace, CompressionType::Zstd)
        })
        .await
        .map_err(|e| Error::Internal(format!("Cache archive task failed: {}", e)))??;

        let ack = store.save(&key.key, payload).await?;

        let mut outputs = Outputs::new();
        outputs.insert("cache_key".to_string(), OutputValue::Text(ack.key));
        outputs.insert("cache_saved".to_string(), OutputValue::Bool(ack.written));

        let mut result = StepResult::success(outputs);
        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    fn kind(&self) -> ActionKind {
        ActionKind::CacheSave
    }
}
