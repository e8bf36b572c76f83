//! Incoming share repository, scoped by `recipientUserID` on every mutating or reading
//! operation except [`IncomingShareRepo::get_by_provider_id`].

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone)]
pub struct IncomingShare {
    pub share_id: Uuid,
    pub provider_id: String,
    pub sender_host: String,
    pub webdav_id: String,
    pub shared_secret: String,
    pub permissions: Vec<String>,
    pub owner: String,
    pub sender: String,
    pub share_with: String,
    pub name: String,
    pub resource_type: String,
    pub share_type: String,
    pub recipient_user_id: String,
    pub recipient_display_name: String,
    pub status: ShareStatus,
    pub created_at: OffsetDateTime,
    pub must_exchange_token: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum IncomingShareRepoError {
    #[error("a share with the same (senderHost, providerID) already exists")]
    AlreadyExists { existing_share_id: Uuid },
    #[error("share not found")]
    NotFound,
}

#[async_trait]
pub trait IncomingShareRepo: Send + Sync {
    async fn create(&self, share: IncomingShare) -> Result<IncomingShare, IncomingShareRepoError>;
    async fn get_by_id(&self, recipient_user_id: &str, share_id: Uuid) -> Result<IncomingShare, IncomingShareRepoError>;
    async fn get_by_provider_id(&self, sender_host: &str, provider_id: &str) -> Option<IncomingShare>;
    async fn update(&self, recipient_user_id: &str, share: IncomingShare) -> Result<IncomingShare, IncomingShareRepoError>;
    async fn delete(&self, recipient_user_id: &str, share_id: Uuid) -> Result<(), IncomingShareRepoError>;
    async fn list_by_recipient_user_id(&self, recipient_user_id: &str) -> Vec<IncomingShare>;
}

#[derive(Default)]
pub struct InMemoryIncomingShareRepo {
    by_id: RwLock<HashMap<Uuid, IncomingShare>>,
    by_provider: RwLock<HashMap<(String, String), Uuid>>,
}

impl InMemoryIncomingShareRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl IncomingShareRepo for InMemoryIncomingShareRepo {
    async fn create(&self, mut share: IncomingShare) -> Result<IncomingShare, IncomingShareRepoError> {
        let provider_key = (share.sender_host.clone(), share.provider_id.clone());

        // Hold both locks for the duration of the check+insert so the unique-key invariant
        // (senderHost, providerID) is never violated by a racing Create.
        let mut by_provider = self.by_provider.write().unwrap();
        if let Some(existing_id) = by_provider.get(&provider_key) {
            return Err(IncomingShareRepoError::AlreadyExists {
                existing_share_id: *existing_id,
            });
        }

        if share.share_id == Uuid::nil() {
            share.share_id = Uuid::now_v7();
        }
        share.created_at = OffsetDateTime::now_utc();

        let mut by_id = self.by_id.write().unwrap();
        by_provider.insert(provider_key, share.share_id);
        by_id.insert(share.share_id, share.clone());
        Ok(share)
    }

    async fn get_by_id(&self, recipient_user_id: &str, share_id: Uuid) -> Result<IncomingShare, IncomingShareRepoError> {
        let by_id = self.by_id.read().unwrap();
        match by_id.get(&share_id) {
            Some(share) if share.recipient_user_id == recipient_user_id => Ok(share.clone()),
            _ => Err(IncomingShareRepoError::NotFound),
        }
    }

    async fn get_by_provider_id(&self, sender_host: &str, provider_id: &str) -> Option<IncomingShare> {
        let by_provider = self.by_provider.read().unwrap();
        let id = by_provider.get(&(sender_host.to_string(), provider_id.to_string()))?;
        self.by_id.read().unwrap().get(id).cloned()
    }

    async fn update(&self, recipient_user_id: &str, share: IncomingShare) -> Result<IncomingShare, IncomingShareRepoError> {
        let mut by_id = self.by_id.write().unwrap();
        match by_id.get(&share.share_id) {
            Some(existing) if existing.recipient_user_id == recipient_user_id => {
                by_id.insert(share.share_id, share.clone());
                Ok(share)
            }
            _ => Err(IncomingShareRepoError::NotFound),
        }
    }

    async fn delete(&self, recipient_user_id: &str, share_id: Uuid) -> Result<(), IncomingShareRepoError> {
        let mut by_id = self.by_id.write().unwrap();
        match by_id.get(&share_id) {
            Some(existing) if existing.recipient_user_id == recipient_user_id => {
                let removed = by_id.remove(&share_id).unwrap();
                drop(by_id);
                self.by_provider
                    .write()
                    .unwrap()
                    .remove(&(removed.sender_host, removed.provider_id));
                Ok(())
            }
            _ => Err(IncomingShareRepoError::NotFound),
        }
    }

    async fn list_by_recipient_user_id(&self, recipient_user_id: &str) -> Vec<IncomingShare> {
        self.by_id
            .read()
            .unwrap()
            .values()
            .filter(|s| s.recipient_user_id == recipient_user_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share(recipient: &str, provider_id: &str) -> IncomingShare {
        IncomingShare {
            share_id: Uuid::nil(),
            provider_id: provider_id.to_string(),
            sender_host: "sender.example.com".to_string(),
            webdav_id: "wd-1".to_string(),
            shared_secret: "s1".to_string(),
            permissions: vec!["read".to_string()],
            owner: "owner".to_string(),
            sender: "sender".to_string(),
            share_with: format!("{recipient}@localhost"),
            name: "doc".to_string(),
            resource_type: "file".to_string(),
            share_type: "user".to_string(),
            recipient_user_id: recipient.to_string(),
            recipient_display_name: recipient.to_string(),
            status: ShareStatus::Pending,
            created_at: OffsetDateTime::UNIX_EPOCH,
            must_exchange_token: false,
        }
    }

    #[tokio::test]
    async fn create_assigns_uuid_and_stamps_created_at() {
        let repo = InMemoryIncomingShareRepo::new();
        let created = repo.create(share("alice", "p1")).await.unwrap();
        assert_ne!(created.share_id, Uuid::nil());
        assert!(created.created_at > OffsetDateTime::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn duplicate_sender_provider_pair_is_already_exists() {
        let repo = InMemoryIncomingShareRepo::new();
        let first = repo.create(share("alice", "p1")).await.unwrap();
        let err = repo.create(share("alice", "p1")).await.unwrap_err();
        match err {
            IncomingShareRepoError::AlreadyExists { existing_share_id } => {
                assert_eq!(existing_share_id, first.share_id);
            }
            _ => panic!("expected AlreadyExists"),
        }
    }

    #[tokio::test]
    async fn cross_recipient_access_is_not_found_not_leaked() {
        let repo = InMemoryIncomingShareRepo::new();
        let created = repo.create(share("alice", "p1")).await.unwrap();

        assert!(matches!(
            repo.get_by_id("bob", created.share_id).await,
            Err(IncomingShareRepoError::NotFound)
        ));
        assert!(matches!(
            repo.delete("bob", created.share_id).await,
            Err(IncomingShareRepoError::NotFound)
        ));
        assert!(repo.list_by_recipient_user_id("bob").await.is_empty());
    }

    #[tokio::test]
    async fn get_by_provider_id_is_not_scoped_by_recipient() {
        let repo = InMemoryIncomingShareRepo::new();
        repo.create(share("alice", "p1")).await.unwrap();
        assert!(repo.get_by_provider_id("sender.example.com", "p1").await.is_some());
    }
}
