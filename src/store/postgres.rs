//! PostgreSQL-backed store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Row};

use super::{CredentialStore, FruitStore};
use crate::auth::models::{
    LoginEvent, LoginLog, NewRefreshToken, NewUser, RefreshToken, User, UserRole,
};
use crate::error::{Error, Result};
use crate::fruits::{Fruit, FruitUpdate, NewFruit};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'user',
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    failed_login_attempts INTEGER NOT NULL DEFAULT 0 CHECK (failed_login_attempts >= 0),
    lockout_until TIMESTAMPTZ,
    password_changed_at TIMESTAMPTZ,
    last_login_at TIMESTAMPTZ,
    last_login_ip TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS refresh_tokens (
    id BIGSERIAL PRIMARY KEY,
    token TEXT NOT NULL UNIQUE,
    user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    expires_at TIMESTAMPTZ NOT NULL,
    is_revoked BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS refresh_tokens_user_id_idx ON refresh_tokens (user_id);

CREATE TABLE IF NOT EXISTS login_logs (
    id BIGSERIAL PRIMARY KEY,
    user_id BIGINT REFERENCES users(id) ON DELETE SET NULL,
    email TEXT NOT NULL,
    ip_address TEXT NOT NULL,
    user_agent TEXT NOT NULL,
    success BOOLEAN NOT NULL,
    reason TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS fruits (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    price DOUBLE PRECISION NOT NULL CHECK (price >= 0),
    quantity INTEGER NOT NULL DEFAULT 0 CHECK (quantity >= 0),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

const USER_COLUMNS: &str = "id, username, email, password_hash, role, is_active, \
    failed_login_attempts, lockout_until, password_changed_at, last_login_at, \
    last_login_ip, created_at, updated_at";

const REFRESH_COLUMNS: &str = "id, token, user_id, expires_at, is_revoked, created_at";

const FRUIT_COLUMNS: &str = "id, name, description, price, quantity, created_at, updated_at";

/// Store over a single multiplexed tokio-postgres connection
pub struct PgStore {
    client: Client,
}

impl PgStore {
    /// Connect and spawn the connection driver
    pub async fn connect(conn_string: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(conn_string, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Self { client })
    }

    /// Create tables if they do not exist yet
    pub async fn migrate(&self) -> Result<()> {
        self.client.batch_execute(SCHEMA).await?;
        tracing::info!("Database schema is up to date");
        Ok(())
    }
}

/// Translate unique-constraint violations into a conflict
fn conflict_or(err: tokio_postgres::Error, message: impl FnOnce() -> String) -> Error {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        Error::Conflict(message())
    } else {
        Error::Database(err)
    }
}

fn user_from_row(row: &Row) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: role
            .parse::<UserRole>()
            .map_err(|_| Error::Internal(format!("unknown role '{}' in users table", role)))?,
        is_active: row.try_get("is_active")?,
        failed_login_attempts: row.try_get("failed_login_attempts")?,
        lockout_until: row.try_get("lockout_until")?,
        password_changed_at: row.try_get("password_changed_at")?,
        last_login_at: row.try_get("last_login_at")?,
        last_login_ip: row.try_get("last_login_ip")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn refresh_token_from_row(row: &Row) -> Result<RefreshToken> {
    Ok(RefreshToken {
        id: row.try_get("id")?,
        token: row.try_get("token")?,
        user_id: row.try_get("user_id")?,
        expires_at: row.try_get("expires_at")?,
        is_revoked: row.try_get("is_revoked")?,
        created_at: row.try_get("created_at")?,
    })
}

fn login_log_from_row(row: &Row) -> Result<LoginLog> {
    Ok(LoginLog {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        email: row.try_get("email")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        success: row.try_get("success")?,
        reason: row.try_get("reason")?,
        created_at: row.try_get("created_at")?,
    })
}

fn fruit_from_row(row: &Row) -> Result<Fruit> {
    Ok(Fruit {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: row.try_get("price")?,
        quantity: row.try_get("quantity")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = self.client.query_opt(&query, &[&id]).await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        let row = self.client.query_opt(&query, &[&email]).await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>> {
        let query = format!(
            "SELECT {} FROM users WHERE email = $1 OR username = $2 \
             ORDER BY (email = $1) DESC LIMIT 1",
            USER_COLUMNS
        );
        let row = self.client.query_opt(&query, &[&email, &username]).await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let query = format!(
            "INSERT INTO users (username, email, password_hash, role) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            USER_COLUMNS
        );
        let role = user.role.to_string();
        let row = self
            .client
            .query_one(
                &query,
                &[&user.username, &user.email, &user.password_hash, &role],
            )
            .await
            .map_err(|e| conflict_or(e, || "Email or username already registered".to_string()))?;
        user_from_row(&row)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let query = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
        let rows = self.client.query(&query, &[]).await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn record_failed_login(
        &self,
        user_id: i64,
        attempts: i32,
        lockout_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.client
            .execute(
                "UPDATE users SET failed_login_attempts = $2, lockout_until = $3, \
                 updated_at = NOW() WHERE id = $1",
                &[&user_id, &attempts, &lockout_until],
            )
            .await?;
        Ok(())
    }

    async fn record_successful_login(
        &self,
        user_id: i64,
        ip: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.client
            .execute(
                "UPDATE users SET failed_login_attempts = 0, lockout_until = NULL, \
                 last_login_at = $2, last_login_ip = $3, updated_at = NOW() WHERE id = $1",
                &[&user_id, &at, &ip],
            )
            .await?;
        Ok(())
    }

    async fn update_password(
        &self,
        user_id: i64,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> Result<()> {
        let updated = self
            .client
            .execute(
                "UPDATE users SET password_hash = $2, password_changed_at = $3, \
                 updated_at = NOW() WHERE id = $1",
                &[&user_id, &password_hash, &changed_at],
            )
            .await?;
        if updated == 0 {
            return Err(Error::NotFound("User".to_string()));
        }
        Ok(())
    }

    async fn set_user_active(&self, user_id: i64, active: bool) -> Result<bool> {
        let updated = self
            .client
            .execute(
                "UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1",
                &[&user_id, &active],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn set_user_role(&self, user_id: i64, role: UserRole) -> Result<bool> {
        let role = role.to_string();
        let updated = self
            .client
            .execute(
                "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1",
                &[&user_id, &role],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn insert_refresh_token(&self, token: NewRefreshToken) -> Result<RefreshToken> {
        let query = format!(
            "INSERT INTO refresh_tokens (token, user_id, expires_at) \
             VALUES ($1, $2, $3) RETURNING {}",
            REFRESH_COLUMNS
        );
        let row = self
            .client
            .query_one(&query, &[&token.token, &token.user_id, &token.expires_at])
            .await
            .map_err(|e| conflict_or(e, || "Refresh token already exists".to_string()))?;
        refresh_token_from_row(&row)
    }

    async fn find_active_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>> {
        let query = format!(
            "SELECT {} FROM refresh_tokens \
             WHERE token = $1 AND is_revoked = FALSE AND expires_at > $2",
            REFRESH_COLUMNS
        );
        let row = self.client.query_opt(&query, &[&token, &now]).await?;
        row.as_ref().map(refresh_token_from_row).transpose()
    }

    async fn revoke_refresh_token(&self, token: &str, user_id: i64) -> Result<bool> {
        let updated = self
            .client
            .execute(
                "UPDATE refresh_tokens SET is_revoked = TRUE WHERE token = $1 AND user_id = $2",
                &[&token, &user_id],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn insert_login_log(&self, event: LoginEvent) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO login_logs (user_id, email, ip_address, user_agent, success, reason) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &event.user_id,
                    &event.email,
                    &event.ip_address,
                    &event.user_agent,
                    &event.success,
                    &event.reason,
                ],
            )
            .await?;
        Ok(())
    }

    async fn recent_login_logs(&self, limit: i64) -> Result<Vec<LoginLog>> {
        let rows = self
            .client
            .query(
                "SELECT id, user_id, email, ip_address, user_agent, success, reason, created_at \
                 FROM login_logs ORDER BY id DESC LIMIT $1",
                &[&limit],
            )
            .await?;
        rows.iter().map(login_log_from_row).collect()
    }
}

#[async_trait]
impl FruitStore for PgStore {
    async fn list_fruits(&self, limit: i64, offset: i64) -> Result<Vec<Fruit>> {
        let query = format!(
            "SELECT {} FROM fruits ORDER BY id LIMIT $1 OFFSET $2",
            FRUIT_COLUMNS
        );
        let rows = self.client.query(&query, &[&limit, &offset]).await?;
        rows.iter().map(fruit_from_row).collect()
    }

    async fn count_fruits(&self) -> Result<i64> {
        let row = self
            .client
            .query_one("SELECT COUNT(*) FROM fruits", &[])
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn get_fruit(&self, id: i64) -> Result<Option<Fruit>> {
        let query = format!("SELECT {} FROM fruits WHERE id = $1", FRUIT_COLUMNS);
        let row = self.client.query_opt(&query, &[&id]).await?;
        row.as_ref().map(fruit_from_row).transpose()
    }

    async fn create_fruit(&self, fruit: NewFruit) -> Result<Fruit> {
        let query = format!(
            "INSERT INTO fruits (name, description, price, quantity) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            FRUIT_COLUMNS
        );
        let row = self
            .client
            .query_one(
                &query,
                &[&fruit.name, &fruit.description, &fruit.price, &fruit.quantity],
            )
            .await
            .map_err(|e| conflict_or(e, || format!("Fruit '{}' already exists", fruit.name)))?;
        fruit_from_row(&row)
    }

    async fn update_fruit(&self, id: i64, update: FruitUpdate) -> Result<Option<Fruit>> {
        let query = format!(
            "UPDATE fruits SET name = COALESCE($2, name), \
             description = COALESCE($3, description), \
             price = COALESCE($4, price), \
             quantity = COALESCE($5, quantity), \
             updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            FRUIT_COLUMNS
        );
        let row = self
            .client
            .query_opt(
                &query,
                &[
                    &id,
                    &update.name,
                    &update.description,
                    &update.price,
                    &update.quantity,
                ],
            )
            .await
            .map_err(|e| {
                conflict_or(e, || {
                    format!(
                        "Fruit '{}' already exists",
                        update.name.clone().unwrap_or_default()
                    )
                })
            })?;
        row.as_ref().map(fruit_from_row).transpose()
    }

    async fn delete_fruit(&self, id: i64) -> Result<bool> {
        let deleted = self
            .client
            .execute("DELETE FROM fruits WHERE id = $1", &[&id])
            .await?;
        Ok(deleted > 0)
    }
}
