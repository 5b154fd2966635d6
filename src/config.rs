//! Service Configuration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::store::{CredentialStore, JsonFileStore, MemoryStore, StoreError};

/// Deployment environment; decides how much error detail callers see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    pub fn exposes_error_details(self) -> bool {
        matches!(self, Self::Development)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host embedded in validation URLs, e.g. `cards.example.org`.
    pub public_host: String,
    pub background_path: PathBuf,
    /// JSON file of credential records; issued identifiers are written back.
    pub credentials_path: Option<PathBuf>,
    /// Base URL of the photo object store; no photos are fetched when unset.
    pub photo_store_url: Option<String>,
    /// Operator bearer token. Operator routes are open when unset.
    pub auth_token: Option<String>,
    pub environment: Environment,
    pub fetch_timeout: Duration,
}

impl AppConfig {
    /// Local development defaults.
    pub fn development(public_host: impl Into<String>) -> Self {
        Self {
            public_host: public_host.into(),
            background_path: PathBuf::from("assets/background.png"),
            credentials_path: None,
            photo_store_url: None,
            auth_token: None,
            environment: Environment::Development,
            fetch_timeout: crate::service::DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// The record store the service runs against. Without a credentials
    /// file the store starts empty and nothing outlives the process.
    pub fn open_store(&self) -> Result<Arc<dyn CredentialStore>, StoreError> {
        match &self.credentials_path {
            Some(path) => Ok(Arc::new(JsonFileStore::open(path)?)),
            None => {
                tracing::warn!(
                    "no credentials file configured, starting with an empty in-memory store"
                );
                Ok(Arc::new(MemoryStore::new()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{Credential, CredentialId, CredentialStatus};

    #[test]
    fn test_only_development_exposes_details() {
        assert!(!Environment::Production.exposes_error_details());
        assert!(Environment::Development.exposes_error_details());
        assert_eq!(Environment::default(), Environment::Production);
    }

    #[test]
    fn test_open_store_seeds_from_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let records = vec![Credential::new("c1", "Ana Lima", CredentialStatus::AutoApproved)];
        std::fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();

        let mut config = AppConfig::development("cards.example.org");
        config.credentials_path = Some(path);
        let store = config.open_store().unwrap();
        let record = store.get(&CredentialId::new("c1")).unwrap().unwrap();
        assert_eq!(record.name, "Ana Lima");
    }

    #[test]
    fn test_open_store_without_file_is_empty() {
        let store = AppConfig::development("cards.example.org").open_store().unwrap();
        assert!(store.get(&CredentialId::new("c1")).unwrap().is_none());
    }

    #[test]
    fn test_open_store_missing_file_fails() {
        let mut config = AppConfig::development("cards.example.org");
        config.credentials_path = Some(PathBuf::from("/nonexistent/credentials.json"));
        assert!(config.open_store().is_err());
    }
}
