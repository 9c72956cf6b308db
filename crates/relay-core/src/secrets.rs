//! Secret and credential scope types.

use crate::ids::CredentialName;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Privilege level granted to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Read,
    Publish,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessLevel::Read => f.write_str("read"),
            AccessLevel::Publish => f.write_str("publish"),
        }
    }
}

/// Credentials an event is allowed to hand out to jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GrantedScope {
    pub level: AccessLevel,
    pub credentials: BTreeSet<CredentialName>,
}

impl GrantedScope {
    pub fn new(level: AccessLevel, credentials: impl IntoIterator<Item = CredentialName>) -> Self {
        Self {
            level,
            credentials: credentials.into_iter().collect(),
        }
    }

    /// A scope that grants nothing.
    pub fn empty() -> Self {
        Self::new(AccessLevel::Read, [])
    }

    pub fn allows(&self, credential: &str) -> bool {
        self.credentials.contains(credential)
    }
}

#[derive(Clone)]
pub struct SecretValue {
    pub value: String,
    pub masked: bool,
}

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            masked: true,
        }
    }

    pub fn unmasked(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            masked: false,
        }
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("value", &"***")
            .field("masked", &self.masked)
            .finish()
    }
}
