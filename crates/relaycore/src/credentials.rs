use crate::CredentialError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Decrypted credential handed to a node for a single invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialData {
    pub id: String,
    pub name: String,
    pub credential_type: String,
    pub data: Map<String, Value>,
}

impl CredentialData {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// Source of decrypted credentials, keyed by owner and credential type
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_owner_and_type(
        &self,
        owner: &str,
        credential_type: &str,
    ) -> Result<Vec<CredentialData>, CredentialError>;
}
