//! Persistence ports
//!
//! The adapter reads and writes users and per-process context exclusively
//! through these traits. The in-memory implementations back the tests and
//! single-process deployments.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::context::ProcessContext;
use crate::user::User;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user {0} not found")]
    UserNotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find(&self, key: &str) -> StoreResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn find_by_workflow_id(&self, workflow_id: &str) -> StoreResult<Option<User>>;

    /// Insert or replace. Usernames are unique across users.
    async fn save(&self, user: &User) -> StoreResult<()>;
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Resources assigned directly plus those inherited through groups.
    async fn find_all_resource_keys(&self, key: &str) -> StoreResult<BTreeSet<String>>;
    async fn find_all_group_keys(&self, key: &str) -> StoreResult<BTreeSet<String>>;
}

/// Per-process variables that must survive between engine calls.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Context of `workflow_id`, or an empty one when nothing was saved.
    async fn load(&self, workflow_id: &str) -> StoreResult<ProcessContext>;
    async fn save(&self, context: &ProcessContext) -> StoreResult<()>;
    async fn remove(&self, workflow_id: &str) -> StoreResult<()>;
}

// ── MemoryUserStore ──

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, User>>,
    /// Group key to the resources it assigns to members.
    group_resources: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_group_resources<I, S>(&self, group: &str, resources: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_resources.write().await.insert(
            group.to_string(),
            resources.into_iter().map(Into::into).collect(),
        );
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find(&self, key: &str) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(key).cloned())
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.username.as_deref() == Some(username))
            .cloned())
    }

    async fn find_by_workflow_id(&self, workflow_id: &str) -> StoreResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.workflow_id.as_deref() == Some(workflow_id))
            .cloned())
    }

    async fn save(&self, user: &User) -> StoreResult<()> {
        let mut users = self.users.write().await;

        if let Some(username) = user.username.as_deref() {
            let taken = users
                .values()
                .any(|u| u.key != user.key && u.username.as_deref() == Some(username));
            if taken {
                return Err(StoreError::Conflict(format!(
                    "username {username} already in use"
                )));
            }
        }

        users.insert(user.key.clone(), user.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.users
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::UserNotFound(key.to_string()))
    }

    async fn find_all_resource_keys(&self, key: &str) -> StoreResult<BTreeSet<String>> {
        let users = self.users.read().await;
        let user = users
            .get(key)
            .ok_or_else(|| StoreError::UserNotFound(key.to_string()))?;
        let groups = self.group_resources.read().await;

        let mut resources: BTreeSet<String> = user.resources.iter().cloned().collect();
        for membership in &user.memberships {
            if let Some(inherited) = groups.get(&membership.group_key) {
                resources.extend(inherited.iter().cloned());
            }
        }
        Ok(resources)
    }

    async fn find_all_group_keys(&self, key: &str) -> StoreResult<BTreeSet<String>> {
        let users = self.users.read().await;
        let user = users
            .get(key)
            .ok_or_else(|| StoreError::UserNotFound(key.to_string()))?;
        Ok(user.memberships.iter().map(|m| m.group_key.clone()).collect())
    }
}

// ── MemoryContextStore ──

#[derive(Default)]
pub struct MemoryContextStore {
    inner: RwLock<HashMap<String, ProcessContext>>,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, workflow_id: &str) -> bool {
        self.inner.read().await.contains_key(workflow_id)
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn load(&self, workflow_id: &str) -> StoreResult<ProcessContext> {
        Ok(self
            .inner
            .read()
            .await
            .get(workflow_id)
            .cloned()
            .unwrap_or_else(|| ProcessContext::new(workflow_id)))
    }

    async fn save(&self, context: &ProcessContext) -> StoreResult<()> {
        self.inner
            .write()
            .await
            .insert(context.workflow_id.clone(), context.clone());
        Ok(())
    }

    async fn remove(&self, workflow_id: &str) -> StoreResult<()> {
        self.inner.write().await.remove(workflow_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idm_anyops::{MembershipTO, UserTO};

    fn make_user(username: &str) -> User {
        User::from_to(&UserTO::new(username).with_resource("ldap"), false)
    }

    #[tokio::test]
    async fn test_username_is_unique() {
        let store = MemoryUserStore::new();
        let first = make_user("rossini");
        store.save(&first).await.unwrap();

        // same user saved again is fine
        store.save(&first).await.unwrap();

        let second = make_user("rossini");
        assert!(matches!(
            store.save(&second).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_resources_include_group_resources() {
        let store = MemoryUserStore::new();
        store.set_group_resources("g1", ["db"]).await;

        let mut user = make_user("verdi");
        user.memberships.push(MembershipTO::new("g1"));
        store.save(&user).await.unwrap();

        let resources = store.find_all_resource_keys(&user.key).await.unwrap();
        assert_eq!(
            resources,
            BTreeSet::from(["db".to_string(), "ldap".to_string()])
        );
        let groups = store.find_all_group_keys(&user.key).await.unwrap();
        assert!(groups.contains("g1"));
    }

    #[tokio::test]
    async fn test_delete_missing_user() {
        let store = MemoryUserStore::new();
        assert!(matches!(
            store.delete("missing").await,
            Err(StoreError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_context_defaults_when_missing() {
        let store = MemoryContextStore::new();
        let ctx = store.load("wf-1").await.unwrap();
        assert_eq!(ctx.workflow_id, "wf-1");
        assert!(ctx.user_update.is_none());

        store.save(&ctx).await.unwrap();
        assert!(store.contains("wf-1").await);
        store.remove("wf-1").await.unwrap();
        assert!(!store.contains("wf-1").await);
    }
}
