//! Outgoing share repository, indexed by id, providerID, webdavID, and
//! sharedSecret in lock-step with the primary store.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutgoingShareStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone)]
pub struct OutgoingShare {
    pub share_id: Uuid,
    pub provider_id: String,
    pub webdav_id: String,
    pub shared_secret: String,
    pub local_path: String,
    pub receiver_host: String,
    pub receiver_end_point: String,
    pub share_with: String,
    pub name: String,
    pub resource_type: String,
    pub permissions: Vec<String>,
    pub owner: String,
    pub sender: String,
    pub status: OutgoingShareStatus,
    pub sent_at: Option<OffsetDateTime>,
    pub error: Option<String>,
    pub must_exchange_token: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, thiserror::Error)]
pub enum OutgoingShareRepoError {
    #[error("outgoing share not found")]
    NotFound,
}

#[async_trait]
pub trait OutgoingShareRepo: Send + Sync {
    async fn create(&self, share: OutgoingShare) -> OutgoingShare;
    async fn update(&self, share: OutgoingShare) -> Result<OutgoingShare, OutgoingShareRepoError>;
    async fn list(&self) -> Vec<OutgoingShare>;
    async fn get_by_id(&self, share_id: Uuid) -> Option<OutgoingShare>;
    async fn get_by_provider_id(&self, provider_id: &str) -> Option<OutgoingShare>;
    async fn get_by_webdav_id(&self, webdav_id: &str) -> Option<OutgoingShare>;
    async fn get_by_shared_secret(&self, shared_secret: &str) -> Option<OutgoingShare>;
}

#[derive(Default)]
pub struct InMemoryOutgoingShareRepo {
    by_id: RwLock<HashMap<Uuid, OutgoingShare>>,
    by_provider_id: RwLock<HashMap<String, Uuid>>,
    by_webdav_id: RwLock<HashMap<String, Uuid>>,
    by_shared_secret: RwLock<HashMap<String, Uuid>>,
}

impl InMemoryOutgoingShareRepo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn reindex(&self, share: &OutgoingShare) {
        self.by_provider_id
            .write()
            .unwrap()
            .insert(share.provider_id.clone(), share.share_id);
        self.by_webdav_id
            .write()
            .unwrap()
            .insert(share.webdav_id.clone(), share.share_id);
        self.by_shared_secret
            .write()
            .unwrap()
            .insert(share.shared_secret.clone(), share.share_id);
    }
}

#[async_trait]
impl OutgoingShareRepo for InMemoryOutgoingShareRepo {
    async fn create(&self, mut share: OutgoingShare) -> OutgoingShare {
        if share.share_id == Uuid::nil() {
            share.share_id = Uuid::now_v7();
        }
        share.created_at = OffsetDateTime::now_utc();
        self.by_id.write().unwrap().insert(share.share_id, share.clone());
        self.reindex(&share);
        share
    }

    async fn update(&self, share: OutgoingShare) -> Result<OutgoingShare, OutgoingShareRepoError> {
        let mut by_id = self.by_id.write().unwrap();
        if !by_id.contains_key(&share.share_id) {
            return Err(OutgoingShareRepoError::NotFound);
        }
        by_id.insert(share.share_id, share.clone());
        drop(by_id);
        self.reindex(&share);
        Ok(share)
    }

    async fn list(&self) -> Vec<OutgoingShare> {
        self.by_id.read().unwrap().values().cloned().collect()
    }

    async fn get_by_id(&self, share_id: Uuid) -> Option<OutgoingShare> {
        self.by_id.read().unwrap().get(&share_id).cloned()
    }

    async fn get_by_provider_id(&self, provider_id: &str) -> Option<OutgoingShare> {
        let id = *self.by_provider_id.read().unwrap().get(provider_id)?;
        self.by_id.read().unwrap().get(&id).cloned()
    }

    async fn get_by_webdav_id(&self, webdav_id: &str) -> Option<OutgoingShare> {
        let id = *self.by_webdav_id.read().unwrap().get(webdav_id)?;
        self.by_id.read().unwrap().get(&id).cloned()
    }

    async fn get_by_shared_secret(&self, shared_secret: &str) -> Option<OutgoingShare> {
        let id = *self.by_shared_secret.read().unwrap().get(shared_secret)?;
        self.by_id.read().unwrap().get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share() -> OutgoingShare {
        OutgoingShare {
            share_id: Uuid::nil(),
            provider_id: "p1".to_string(),
            webdav_id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
            shared_secret: "secret1".to_string(),
            local_path: "/tmp/file".to_string(),
            receiver_host: "receiver.example.com".to_string(),
            receiver_end_point: "https://receiver.example.com/ocm".to_string(),
            share_with: "bob@receiver.example.com".to_string(),
            name: "doc".to_string(),
            resource_type: "file".to_string(),
            permissions: vec!["read".to_string()],
            owner: "alice".to_string(),
            sender: "alice@local".to_string(),
            status: OutgoingShareStatus::Pending,
            sent_at: None,
            error: None,
            must_exchange_token: false,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn create_assigns_id_and_indexes() {
        let repo = InMemoryOutgoingShareRepo::new();
        let created = repo.create(share()).await;
        assert_ne!(created.share_id, Uuid::nil());
        assert!(repo.get_by_provider_id("p1").await.is_some());
        assert!(repo.get_by_webdav_id(&created.webdav_id).await.is_some());
        assert!(repo.get_by_shared_secret("secret1").await.is_some());
    }

    #[tokio::test]
    async fn update_keeps_indexes_in_lock_step() {
        let repo = InMemoryOutgoingShareRepo::new();
        let mut created = repo.create(share()).await;
        created.status = OutgoingShareStatus::Sent;
        created.sent_at = Some(OffsetDateTime::now_utc());
        repo.update(created.clone()).await.unwrap();

        let fetched = repo.get_by_id(created.share_id).await.unwrap();
        assert_eq!(fetched.status, OutgoingShareStatus::Sent);
    }

    #[tokio::test]
    async fn update_of_unknown_share_is_not_found() {
        let repo = InMemoryOutgoingShareRepo::new();
        let err = repo.update(share()).await.unwrap_err();
        assert!(matches!(err, OutgoingShareRepoError::NotFound));
    }
}
