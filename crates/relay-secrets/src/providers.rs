//! Secret provider trait and implementations.

use async_trait::async_trait;
use relay_core::secrets::SecretValue;
use relay_core::{Error, Result};
use std::collections::HashMap;

/// Trait for secret providers.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Get a secret by credential name.
    async fn get(&self, name: &str) -> Result<SecretValue>;

    /// Check if a secret exists.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Environment variable secret provider.
///
/// Credential `registry_token` with prefix `RELAY_SECRET` is read from
/// `RELAY_SECRET_REGISTRY_TOKEN`.
pub struct EnvProvider {
    prefix: Option<String>,
}

impl EnvProvider {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    fn resolve_name(&self, name: &str) -> String {
        let name = name.to_ascii_uppercase();
        match &self.prefix {
            Some(p) => format!("{}_{}", p, name),
            None => name,
        }
    }
}

impl Default for EnvProvider {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl SecretProvider for EnvProvider {
    async fn get(&self, name: &str) -> Result<SecretValue> {
        let env_name = self.resolve_name(name);
        std::env::var(&env_name)
            .map(SecretValue::new)
            .map_err(|_| Error::SecretNotFound(name.to_string()))
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(std::env::var(self.resolve_name(name)).is_ok())
    }

    fn name(&self) -> &str {
        "env"
    }
}

/// Map-backed secret provider, loadable from a JSON object file.
pub struct FileProvider {
    secrets: HashMap<String, String>,
}

impl FileProvider {
    pub fn new() -> Self {
        Self {
            secrets: HashMap::new(),
        }
    }

    pub fn from_map(secrets: HashMap<String, String>) -> Self {
        Self { secrets }
    }

    pub async fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Internal(format!("Failed to read secrets file: {}", e)))?;

        let secrets: HashMap<String, String> = serde_json::from_str(&content)
            .map_err(|e| Error::Internal(format!("Failed to parse secrets: {}", e)))?;

        Ok(Self { secrets })
    }
}

impl Default for FileProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretProvider for FileProvider {
    async fn get(&self, name: &str) -> Result<SecretValue> {
        self.secrets
            .get(name)
            .map(|value| SecretValue::new(value.clone()))
            .ok_or_else(|| Error::SecretNotFound(name.to_string()))
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.secrets.contains_key(name))
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_env_provider_prefix() {
        // SAFETY: This test runs in isolation and doesn't rely on this env var elsewhere
        unsafe { std::env::set_var("RELAY_TEST_SECRET_API_KEY", "secret_value") };
        let provider = EnvProvider::new(Some("RELAY_TEST_SECRET".into()));

        let value = provider.get("api_key").await.unwrap();
        assert_eq!(value.value, "secret_value");

        assert!(provider.exists("api_key").await.unwrap());
        assert!(!provider.exists("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_provider_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(&path, r#"{"registry_token": "hunter2"}"#).unwrap();

        let provider = FileProvider::load_from_file(&path).await.unwrap();
        assert_eq!(provider.get("registry_token").await.unwrap().value, "hunter2");

        let err = provider.get("github_token").await.unwrap_err();
        assert!(matches!(err, Error::SecretNotFound(name) if name == "github_token"));
    }
}
