//! Integration test infrastructure for Relay CI.
//!
//! Provides pipeline fixtures, scriptable fake actions and a [`Harness`]
//! that wires a dispatcher to them with an in-memory cache and event sink.
//!
//! # Usage
//!
//! ```ignore
//! use relay_tests::{EventFixture, Harness, PipelineFixture};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let harness = Harness::builder(PipelineFixture::all()).build().unwrap();
//!     let outcome = harness.dispatch(EventFixture::push_to_main()).await;
//! }
//! ```

pub mod fakes;
pub mod fixtures;
pub mod helpers;

pub use fakes::{Behavior, FakeAction, Invocation};
pub use fixtures::{EventFixture, PipelineFixture};
pub use helpers::{Harness, HarnessBuilder, wait_for};

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,relay_scheduler=debug,relay_tests=debug")),
        )
        .with_test_writer()
        .try_init();
}
