//! Credential providers and per-job credential scoping for Relay CI.

pub mod broker;
pub mod providers;

pub use broker::{CredentialBroker, JobCredentials, env_var_name};
pub use providers::{EnvProvider, FileProvider, SecretProvider};
