//! Persistence contracts and their backends.
//!
//! The auth core only talks to [`CredentialStore`]; the fruit handlers only to
//! [`FruitStore`]. Each statement commits on its own, there are no
//! multi-statement transactions.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::auth::models::{
    LoginEvent, LoginLog, NewRefreshToken, NewUser, RefreshToken, User, UserRole,
};
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::fruits::{Fruit, FruitUpdate, NewFruit};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Exact match on email
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// First user whose email or username matches. Email matches win.
    async fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>>;

    /// Insert a user; duplicate email or username yields `Error::Conflict`
    async fn create_user(&self, user: NewUser) -> Result<User>;

    async fn list_users(&self) -> Result<Vec<User>>;

    /// Persist the failed-attempt counter and the lockout deadline
    async fn record_failed_login(
        &self,
        user_id: i64,
        attempts: i32,
        lockout_until: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Reset the counter, clear lockout, stamp last login
    async fn record_successful_login(&self, user_id: i64, ip: &str, at: DateTime<Utc>)
        -> Result<()>;

    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Returns false when the user does not exist
    async fn set_user_active(&self, user_id: i64, active: bool) -> Result<bool>;

    /// Returns false when the user does not exist
    async fn set_user_role(&self, user_id: i64, role: UserRole) -> Result<bool>;

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> Result<RefreshToken>;

    /// Token row that is unrevoked and unexpired at `now`
    async fn find_active_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>>;

    /// Revoke `token` only if it belongs to `user_id`. Returns whether a row changed.
    async fn revoke_refresh_token(&self, token: &str, user_id: i64) -> Result<bool>;

    async fn insert_login_log(&self, event: LoginEvent) -> Result<()>;

    /// Newest first
    async fn recent_login_logs(&self, limit: i64) -> Result<Vec<LoginLog>>;
}

#[async_trait]
pub trait FruitStore: Send + Sync {
    async fn list_fruits(&self, limit: i64, offset: i64) -> Result<Vec<Fruit>>;

    async fn count_fruits(&self) -> Result<i64>;

    async fn get_fruit(&self, id: i64) -> Result<Option<Fruit>>;

    /// Duplicate names yield `Error::Conflict`
    async fn create_fruit(&self, fruit: NewFruit) -> Result<Fruit>;

    async fn update_fruit(&self, id: i64, update: FruitUpdate) -> Result<Option<Fruit>>;

    async fn delete_fruit(&self, id: i64) -> Result<bool>;
}

/// The two store handles, usually backed by the same object
#[derive(Clone)]
pub struct Backend {
    pub credentials: Arc<dyn CredentialStore>,
    pub fruits: Arc<dyn FruitStore>,
}

impl Backend {
    /// Connect according to configuration
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        if config.in_memory {
            tracing::warn!("Using in-memory store; data will not survive a restart");
            return Ok(Self::memory());
        }

        let store = Arc::new(PgStore::connect(&config.url).await?);
        store.migrate().await?;
        Ok(Self {
            credentials: store.clone(),
            fruits: store,
        })
    }

    pub fn memory() -> Self {
        Self::from_memory(MemoryStore::new())
    }

    pub fn from_memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            credentials: store.clone(),
            fruits: store,
        }
    }
}
