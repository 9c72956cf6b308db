//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the core domain and external adapters.

use crate::Result;
use crate::events::RunEvent;
use async_trait::async_trait;

/// Receiver for run lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish an event. Sinks must not block the executor for long.
    async fn publish(&self, event: RunEvent) -> Result<()>;
}
