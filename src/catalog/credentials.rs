use crate::error::{OrchestratorError, OrchestratorResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Login material for a compute resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Token the credential was resolved from
    pub token: String,
    /// Login name on the compute resource
    pub username: String,
    /// Private key used by the SSH backend; agent or default keys when absent
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
}

impl Credential {
    pub fn new(token: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            username: username.into(),
            private_key_path: None,
        }
    }

    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }
}

/// Turns a credential token into login material
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve_token(
        &self,
        token: &str,
        gateway_id: &str,
        resource_id: &str,
    ) -> OrchestratorResult<Credential>;
}

/// Fixed token table
#[derive(Debug, Default)]
pub struct StaticCredentialResolver {
    credentials: RwLock<HashMap<String, Credential>>,
}

impl StaticCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(self, credential: Credential) -> Self {
        self.insert(credential);
        self
    }

    pub fn insert(&self, credential: Credential) {
        self.credentials
            .write()
            .insert(credential.token.clone(), credential);
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve_token(
        &self,
        token: &str,
        gateway_id: &str,
        resource_id: &str,
    ) -> OrchestratorResult<Credential> {
        self.credentials
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| OrchestratorError::Credential {
                token: token.to_string(),
                reason: format!("no credential for gateway {gateway_id} on {resource_id}"),
            })
    }
}
