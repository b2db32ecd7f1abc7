use async_trait::async_trait;
use relaycore::{CredentialData, CredentialError, CredentialStore};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Credentials held in memory, already decrypted, keyed by owner
#[derive(Default)]
pub struct InMemoryCredentialStore {
    by_owner: RwLock<HashMap<String, Vec<CredentialData>>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, owner: impl Into<String>, credential: CredentialData) {
        self.by_owner
            .write()
            .await
            .entry(owner.into())
            .or_default()
            .push(credential);
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_owner_and_type(
        &self,
        owner: &str,
        credential_type: &str,
    ) -> Result<Vec<CredentialData>, CredentialError> {
        let by_owner = self.by_owner.read().await;
        Ok(by_owner
            .get(owner)
            .map(|credentials| {
                credentials
                    .iter()
                    .filter(|c| c.credential_type == credential_type)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
