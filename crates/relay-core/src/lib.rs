//! Relay CI Core
//!
//! Core domain types, traits, and error handling for Relay CI.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used across all other crates: pipeline definitions, typed conditions,
//! run results, trigger events and credential scopes.

pub mod condition;
pub mod error;
pub mod events;
pub mod ids;
pub mod pipeline;
pub mod ports;
pub mod run;
pub mod secrets;
pub mod trigger;

pub use error::{ConfigError, Error, Result};
pub use ids::*;
