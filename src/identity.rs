//! Local user directory — an external collaborator the ingest pipeline consults for
//! recipient resolution. Modeled as a capability boundary; the in-memory
//! implementation here is test/demo scaffolding, not a production user store.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Option<LocalUser>;
    async fn find_by_username(&self, username: &str) -> Option<LocalUser>;
    async fn find_by_email(&self, email: &str) -> Option<LocalUser>;
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: HashMap<String, LocalUser>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: LocalUser) -> Self {
        self.users.insert(user.id.clone(), user);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_id(&self, id: &str) -> Option<LocalUser> {
        self.users.get(id).cloned()
    }

    async fn find_by_username(&self, username: &str) -> Option<LocalUser> {
        self.users.values().find(|u| u.username == username).cloned()
    }

    async fn find_by_email(&self, email: &str) -> Option<LocalUser> {
        self.users.values().find(|u| u.email == email).cloned()
    }
}
