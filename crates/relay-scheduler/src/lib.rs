//! Job graph, trigger resolution and pipeline execution for Relay CI.

pub mod cancel;
pub mod catalog;
pub mod dag;
pub mod dispatcher;
pub mod executor;
pub mod report;
pub mod sinks;
pub mod triggers;
pub mod validate;

pub use cancel::{CancelHandle, CancelToken};
pub use catalog::{LoadedPipeline, PipelineCatalog};
pub use dag::JobGraph;
pub use dispatcher::{Admission, DispatchOutcome, Dispatcher};
pub use executor::{ExecutorConfig, PipelineExecutor, WorkspaceMode};
pub use report::{JobReport, PipelineReport, RunReport};
pub use sinks::{MemoryEventSink, TracingEventSink};
pub use triggers::{Resolution, TriggerPolicy};
