//! In-process store for tests and throwaway deployments

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{CredentialStore, FruitStore};
use crate::auth::models::{
    LoginEvent, LoginLog, NewRefreshToken, NewUser, RefreshToken, User, UserRole,
};
use crate::error::{Error, Result};
use crate::fruits::{Fruit, FruitUpdate, NewFruit};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    refresh_tokens: Vec<RefreshToken>,
    login_logs: Vec<LoginLog>,
    fruits: BTreeMap<i64, Fruit>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_mut(&mut self, id: i64) -> Option<&mut User> {
        self.users.get_mut(&id)
    }
}

/// Store backed by `RwLock`-guarded maps. Clones share the same data.
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }

    /// Apply a direct edit to a stored user. Returns false if absent.
    pub async fn modify_user<F>(&self, id: i64, edit: F) -> bool
    where
        F: FnOnce(&mut User),
    {
        let mut tables = self.tables.write().await;
        match tables.user_mut(id) {
            Some(user) => {
                edit(user);
                true
            }
            None => false,
        }
    }

    /// Every refresh token row, for inspection
    pub async fn refresh_tokens(&self) -> Vec<RefreshToken> {
        self.tables.read().await.refresh_tokens.clone()
    }

    /// Audit rows in insertion order
    pub async fn login_logs(&self) -> Vec<LoginLog> {
        self.tables.read().await.login_logs.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        let by_email = tables.users.values().find(|u| u.email == email);
        Ok(by_email
            .or_else(|| tables.users.values().find(|u| u.username == username))
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(Error::Conflict("Email already registered".to_string()));
        }
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(Error::Conflict("Username already taken".to_string()));
        }

        let now = Utc::now();
        let id = tables.next_id();
        let record = User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            is_active: true,
            failed_login_attempts: 0,
            lockout_until: None,
            password_changed_at: None,
            last_login_at: None,
            last_login_ip: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(id, record.clone());
        Ok(record)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn record_failed_login(
        &self,
        user_id: i64,
        attempts: i32,
        lockout_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.modify_user(user_id, |user| {
            user.failed_login_attempts = attempts;
            user.lockout_until = lockout_until;
            user.updated_at = Utc::now();
        })
        .await;
        Ok(())
    }

    async fn record_successful_login(
        &self,
        user_id: i64,
        ip: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.modify_user(user_id, |user| {
            user.failed_login_attempts = 0;
            user.lockout_until = None;
            user.last_login_at = Some(at);
            user.last_login_ip = Some(ip.to_string());
            user.updated_at = at;
        })
        .await;
        Ok(())
    }

    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<()> {
        let found = self
            .modify_user(user_id, |user| {
                user.password_hash = password_hash.to_string();
                user.password_changed_at = Some(changed_at);
                user.updated_at = changed_at;
            })
            .await;
        if !found {
            return Err(Error::NotFound("User".to_string()));
        }
        Ok(())
    }

    async fn set_user_active(&self, user_id: i64, active: bool) -> Result<bool> {
        Ok(self
            .modify_user(user_id, |user| {
                user.is_active = active;
                user.updated_at = Utc::now();
            })
            .await)
    }

    async fn set_user_role(&self, user_id: i64, role: UserRole) -> Result<bool> {
        Ok(self
            .modify_user(user_id, |user| {
                user.role = role;
                user.updated_at = Utc::now();
            })
            .await)
    }

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> Result<RefreshToken> {
        let mut tables = self.tables.write().await;
        if tables.refresh_tokens.iter().any(|t| t.token == token.token) {
            return Err(Error::Conflict("Refresh token already exists".to_string()));
        }
        let record = RefreshToken {
            id: tables.next_id(),
            token: token.token,
            user_id: token.user_id,
            expires_at: token.expires_at,
            is_revoked: false,
            created_at: Utc::now(),
        };
        tables.refresh_tokens.push(record.clone());
        Ok(record)
    }

    async fn find_active_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>> {
        let tables = self.tables.read().await;
        Ok(tables
            .refresh_tokens
            .iter()
            .find(|t| t.token == token && t.is_usable(now))
            .cloned())
    }

    async fn revoke_refresh_token(&self, token: &str, user_id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let mut revoked = false;
        for row in tables
            .refresh_tokens
            .iter_mut()
            .filter(|t| t.token == token && t.user_id == user_id)
        {
            row.is_revoked = true;
            revoked = true;
        }
        Ok(revoked)
    }

    async fn insert_login_log(&self, event: LoginEvent) -> Result<()> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        tables.login_logs.push(LoginLog {
            id,
            user_id: event.user_id,
            email: event.email,
            ip_address: event.ip_address,
            user_agent: event.user_agent,
            success: event.success,
            reason: event.reason,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn recent_login_logs(&self, limit: i64) -> Result<Vec<LoginLog>> {
        let tables = self.tables.read().await;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(tables.login_logs.iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait]
impl FruitStore for MemoryStore {
    async fn list_fruits(&self, limit: i64, offset: i64) -> Result<Vec<Fruit>> {
        let tables = self.tables.read().await;
        let limit = usize::try_from(limit).unwrap_or(0);
        let offset = usize::try_from(offset).unwrap_or(0);
        Ok(tables
            .fruits
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_fruits(&self) -> Result<i64> {
        Ok(self.tables.read().await.fruits.len() as i64)
    }

    async fn get_fruit(&self, id: i64) -> Result<Option<Fruit>> {
        Ok(self.tables.read().await.fruits.get(&id).cloned())
    }

    async fn create_fruit(&self, fruit: NewFruit) -> Result<Fruit> {
        let mut tables = self.tables.write().await;
        if tables.fruits.values().any(|f| f.name == fruit.name) {
            return Err(Error::Conflict(format!(
                "Fruit '{}' already exists",
                fruit.name
            )));
        }
        let now = Utc::now();
        let id = tables.next_id();
        let record = Fruit {
            id,
            name: fruit.name,
            description: fruit.description,
            price: fruit.price,
            quantity: fruit.quantity,
            created_at: now,
            updated_at: now,
        };
        tables.fruits.insert(id, record.clone());
        Ok(record)
    }

    async fn update_fruit(&self, id: i64, update: FruitUpdate) -> Result<Option<Fruit>> {
        let mut tables = self.tables.write().await;
        if let Some(name) = &update.name {
            if tables.fruits.values().any(|f| &f.name == name && f.id != id) {
                return Err(Error::Conflict(format!("Fruit '{}' already exists", name)));
            }
        }

        let Some(fruit) = tables.fruits.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            fruit.name = name;
        }
        if let Some(description) = update.description {
            fruit.description = Some(description);
        }
        if let Some(price) = update.price {
            fruit.price = price;
        }
        if let Some(quantity) = update.quantity {
            fruit.quantity = quantity;
        }
        fruit.updated_at = Utc::now();
        Ok(Some(fruit.clone()))
    }

    async fn delete_fruit(&self, id: i64) -> Result<bool> {
        Ok(self.tables.write().await.fruits.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role: UserRole::User,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("alice", "alice@x.com")).await.unwrap();

        assert!(user.is_active);
        assert_eq!(user.failed_login_attempts, 0);
        let found = store.find_user_by_email("alice@x.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(store.find_user_by_email("ALICE@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uniqueness_enforced() {
        let store = MemoryStore::new();
        store.create_user(new_user("alice", "alice@x.com")).await.unwrap();

        let dup_email = store.create_user(new_user("other", "alice@x.com")).await;
        assert!(matches!(dup_email, Err(Error::Conflict(_))));

        let dup_name = store.create_user(new_user("alice", "other@x.com")).await;
        assert!(matches!(dup_name, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_email_match_preferred() {
        let store = MemoryStore::new();
        let alice = store.create_user(new_user("alice", "alice@x.com")).await.unwrap();
        let bob = store.create_user(new_user("bob", "bob@x.com")).await.unwrap();

        let found = store
            .find_user_by_email_or_username("bob@x.com", "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, bob.id);

        let found = store
            .find_user_by_email_or_username("nobody@x.com", "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, alice.id);
    }

    #[tokio::test]
    async fn test_refresh_token_revocation_is_owner_scoped() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_refresh_token(NewRefreshToken {
                token: "tok".to_string(),
                user_id: 1,
                expires_at: now + Duration::days(7),
            })
            .await
            .unwrap();

        assert!(!store.revoke_refresh_token("tok", 2).await.unwrap());
        assert!(store.find_active_refresh_token("tok", now).await.unwrap().is_some());

        assert!(store.revoke_refresh_token("tok", 1).await.unwrap());
        assert!(store.find_active_refresh_token("tok", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_refresh_token_not_found() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_refresh_token(NewRefreshToken {
                token: "old".to_string(),
                user_id: 1,
                expires_at: now - Duration::seconds(1),
            })
            .await
            .unwrap();
        assert!(store.find_active_refresh_token("old", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fruit_crud() {
        let store = MemoryStore::new();
        let apple = store
            .create_fruit(NewFruit {
                name: "Apple".to_string(),
                description: None,
                price: 1.0,
                quantity: 3,
            })
            .await
            .unwrap();

        let updated = store
            .update_fruit(
                apple.id,
                FruitUpdate {
                    quantity: Some(9),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.quantity, 9);
        assert_eq!(updated.name, "Apple");

        assert_eq!(store.count_fruits().await.unwrap(), 1);
        assert!(store.delete_fruit(apple.id).await.unwrap());
        assert!(store.get_fruit(apple.id).await.unwrap().is_none());
        assert!(store.update_fruit(apple.id, FruitUpdate::default()).await.unwrap().is_none());
    }
}
