//! Step actions and shell execution for Relay CI.
//!
//! Every step names an [`ActionKind`](relay_core::pipeline::ActionKind); the
//! [`ActionRegistry`] maps kinds to [`StepRunner`] implementations. The
//! built-in actions drive external tools (git, rustup, cargo) through the
//! shell and report pass/fail by exit status.

pub mod actions;
pub mod registry;
pub mod runner;
pub mod shell;

pub use registry::ActionRegistry;
pub use runner::{OutputLine, OutputStream, StepContext, StepResult, StepRunner};
pub use shell::{ShellRunner, parse_outputs};
