//! Per-job credential issuance.
//!
//! A job receives only the credentials it declares in `permissions`, and only
//! when the triggering event's [`GrantedScope`] covers them. Within the job,
//! each step sees only the credentials it lists itself.

use crate::providers::SecretProvider;
use relay_core::ids::CredentialName;
use relay_core::pipeline::{JobDefinition, StepDefinition};
use relay_core::secrets::{GrantedScope, SecretValue};
use relay_core::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Environment variable a credential is exposed as.
pub fn env_var_name(credential: &str) -> String {
    credential
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

pub struct CredentialBroker {
    provider: Arc<dyn SecretProvider>,
}

impl CredentialBroker {
    pub fn new(provider: Arc<dyn SecretProvider>) -> Self {
        Self { provider }
    }

    /// Check a job's declared credentials against the granted scope and the
    /// credentials its steps list or their actions consume against the job's
    /// permissions.
    pub fn authorize(job: &JobDefinition, scope: &GrantedScope) -> Result<()> {
        for permission in &job.permissions {
            if !scope.allows(permission.as_str()) {
                warn!(
                    job = %job.id,
                    credential = %permission,
                    level = %scope.level,
                    "Credential outside granted scope"
                );
                return Err(Error::PermissionDenied {
                    job: job.id.to_string(),
                    credential: permission.to_string(),
                });
            }
        }

        for step in &job.steps {
            let used = step
                .credentials
                .iter()
                .map(|c| c.as_str())
                .chain(step.required_credential());
            for credential in used {
                if !job.permissions.iter().any(|p| p.as_str() == credential) {
                    return Err(Error::PermissionDenied {
                        job: job.id.to_string(),
                        credential: credential.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Authorize and resolve every credential the job declares.
    pub async fn issue(&self, job: &JobDefinition, scope: &GrantedScope) -> Result<JobCredentials> {
        Self::authorize(job, scope)?;

        let mut values = BTreeMap::new();
        for permission in &job.permissions {
            let value = self.provider.get(permission.as_str()).await?;
            debug!(
                job = %job.id,
                credential = %permission,
                provider = %self.provider.name(),
                "Credential resolved"
            );
            values.insert(permission.clone(), value);
        }

        if !values.is_empty() {
            info!(job = %job.id, count = values.len(), "Credentials issued");
        }

        Ok(JobCredentials {
            job: job.id.to_string(),
            values,
        })
    }
}

/// Credentials resolved for one job. Dropped when the job finishes.
#[derive(Debug)]
pub struct JobCredentials {
    job: String,
    values: BTreeMap<CredentialName, SecretValue>,
}

impl JobCredentials {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Environment for one step: only the credentials it lists.
    pub fn for_step(&self, step: &StepDefinition) -> Result<HashMap<String, String>> {
        let mut env = HashMap::new();
        for credential in &step.credentials {
            let value = self
                .values
                .get(credential)
                .ok_or_else(|| Error::PermissionDenied {
                    job: self.job.clone(),
                    credential: credential.to_string(),
                })?;
            env.insert(env_var_name(credential.as_str()), value.value.clone());
        }
        Ok(env)
    }

    /// Replace every credential value in `input` with `***`.
    pub fn mask(&self, input: &str) -> String {
        let mut secrets: Vec<&str> = self
            .values
            .values()
            .filter(|v| v.masked && !v.value.is_empty())
            .map(|v| v.value.as_str())
            .collect();
        // Longest first so a secret containing another is masked whole.
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));

        let mut output = input.to_string();
        for secret in secrets {
            output = output.replace(secret, "***");
        }
        output
    }
}
