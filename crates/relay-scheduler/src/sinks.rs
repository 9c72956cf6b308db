//! Event sinks for run lifecycle events.

use async_trait::async_trait;
use relay_core::Result;
use relay_core::events::RunEvent;
use relay_core::ports::EventSink;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Logs every lifecycle event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl TracingEventSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event: RunEvent) -> Result<()> {
        let subject = event.subject();
        match &event {
            RunEvent::RunStarted(p) => info!(
                subject = %subject,
                pipeline = %p.pipeline,
                event_kind = %p.event_kind,
                git_ref = %p.git_ref,
                jobs = p.job_count,
                "Run started"
            ),
            RunEvent::JobStarted(p) => info!(
                subject = %subject,
                job = %p.job_id,
                wave = p.wave,
                "Job started"
            ),
            RunEvent::StepFinished(p) => debug!(
                subject = %subject,
                job = %p.job_id,
                step = %p.step_id,
                status = %p.status,
                exit_code = ?p.exit_code,
                duration_ms = p.duration_ms,
                "Step finished"
            ),
            RunEvent::JobFinished(p) => info!(
                subject = %subject,
                job = %p.job_id,
                status = %p.status,
                duration_ms = p.duration_ms,
                "Job finished"
            ),
            RunEvent::RunFinished(p) => info!(
                subject = %subject,
                pipeline = %p.pipeline,
                status = %p.status,
                succeeded = p.jobs_succeeded,
                failed = p.jobs_failed,
                duration_ms = p.duration_ms,
                "Run finished"
            ),
        }
        Ok(())
    }
}

/// Keeps every published event in memory, in publish order.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: RwLock<Vec<RunEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<RunEvent> {
        self.events.read().await.clone()
    }

    /// Subjects of the recorded events.
    pub async fn subjects(&self) -> Vec<String> {
        self.events.read().await.iter().map(RunEvent::subject).collect()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn publish(&self, event: RunEvent) -> Result<()> {
        self.events.write().await.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use relay_core::events::JobStartedPayload;
    use relay_core::ids::{JobId, RunId};

    #[tokio::test]
    async fn test_memory_sink_records_in_order() {
        let sink = MemoryEventSink::new();
        let run_id = RunId::new();
        for job in ["lint", "test"] {
            sink.publish(RunEvent::JobStarted(JobStartedPayload {
                run_id,
                job_id: JobId::new(job),
                wave: 0,
                started_at: Utc::now(),
            }))
            .await
            .unwrap();
        }

        assert_eq!(sink.len().await, 2);
        let subjects = sink.subjects().await;
        assert_eq!(subjects[0], format!("run.{}.job.lint.started", run_id));
        assert_eq!(subjects[1], format!("run.{}.job.test.started", run_id));

        sink.clear().await;
        assert!(sink.is_empty().await);
    }
}
